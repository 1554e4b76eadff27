use actix_web::{HttpResponse, Responder, get, web};
use stwatch_service::WatcherHandle;

/// Health check route
/// No content: 200 while the watcher answers, 503 once it is gone.
#[get("/")]
pub async fn health_route(handle: web::Data<WatcherHandle>) -> impl Responder {
    match handle.snapshot().await {
        Ok(_) => HttpResponse::Ok(),
        Err(_) => HttpResponse::ServiceUnavailable(),
    }
}
