//! Small declarative helpers for the HTTP layer.

#[cfg(feature = "actix")]
#[doc(hidden)]
pub use actix_web as __actix_web;

/// Build a `routes` function suitable for `App::configure` from a list of
/// actix-web handlers declared with the routing attribute macros.
///
/// ```ignore
/// macros_utils::routes! {
///     route health_route,
///     route latest_route,
/// }
/// ```
#[cfg(feature = "actix")]
#[macro_export]
macro_rules! routes {
    ($(route $handler:ident),* $(,)?) => {
        pub fn routes(cfg: &mut $crate::__actix_web::web::ServiceConfig) {
            $( cfg.service($handler); )*
        }
    };
}
