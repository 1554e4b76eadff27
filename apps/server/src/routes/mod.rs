mod health;
mod history;
mod latest;

use health::health_route;
use history::history_route;
use latest::latest_route;

macros_utils::routes! {
    route health_route,
    route latest_route,
    route history_route,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::{App, http::StatusCode, test, web};
    use stwatch_service::config::Config;
    use stwatch_service::database::{self, DatabaseImpl, HistoryStore};
    use stwatch_service::monitoring::ProbeExecutor;
    use stwatch_service::monitoring::checker::{FetchResponse, ProbeError, ReachabilityChecker, StatusFetcher};
    use stwatch_service::notify::Transports;
    use stwatch_service::registry::Registry;
    use stwatch_service::{Watcher, WatcherHandle};
    use tempfile::TempDir;
    use url::Url;

    struct Healthy;

    #[async_trait::async_trait]
    impl ReachabilityChecker for Healthy {
        async fn probe(&self, _host: &str) -> Result<(), ProbeError> {
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl StatusFetcher for Healthy {
        async fn fetch(&self, _url: &Url) -> Result<FetchResponse, ProbeError> {
            Ok(FetchResponse { status: 200, body: r#"{"status":{"isSetup":true}}"#.into() })
        }
    }

    async fn watcher() -> (WatcherHandle, TempDir) {
        let config = Config::parse(
            "[watcher]\ndbpath = \"unused\"\n[servers.prod]\nurl = \"https://st.example.org/cldr-apps\"\n",
        )
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let pool = database::open(dir.path().join("t.db").to_string_lossy().as_ref(), None).await.unwrap();
        let store: Arc<dyn HistoryStore> = Arc::new(DatabaseImpl::new_from_pool(pool));
        let executor = Arc::new(ProbeExecutor::with_checkers(
            Arc::new(Healthy),
            Arc::new(Healthy),
            Duration::from_secs(1),
        ));
        let registry = Arc::new(Registry::from_config(&config).unwrap());
        let (watcher, handle) = Watcher::with_parts(&config, registry, store, executor, Transports::standard());
        watcher.spawn();
        (handle, dir)
    }

    #[actix_web::test]
    async fn test_read_api() {
        let (handle, _dir) = watcher().await;
        handle.poll().await.unwrap();
        handle.settle().await.unwrap();

        let app = test::init_service(App::new().app_data(web::Data::new(handle.clone())).configure(super::routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let latest: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/latest").to_request()).await;
        assert!(latest["now"].as_i64().unwrap() > 0);
        assert_eq!(latest["servers"]["prod"]["host"], "st.example.org");
        assert_eq!(latest["servers"]["prod"]["latestStatus"]["statusCode"], 200);
        assert_eq!(latest["hosts"]["st.example.org"]["servers"]["prod"]["url"], "https://st.example.org/cldr-apps/");

        let history: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/history?server=prod").to_request())
                .await;
        assert_eq!(history["server"], "prod");
        assert_eq!(history["data"].as_array().unwrap().len(), 1);

        let missing = test::call_service(&app, test::TestRequest::get().uri("/history?server=nope").to_request()).await;
        assert_eq!(missing.status(), StatusCode::OK);
        let missing: serde_json::Value = test::read_body_json(missing).await;
        assert_eq!(missing["err"], "not found");
    }

    #[actix_web::test]
    async fn test_health_reports_stopped_watcher() {
        let (handle, _dir) = watcher().await;
        handle.shutdown().await.unwrap();
        tokio_yield().await;

        let app = test::init_service(App::new().app_data(web::Data::new(handle)).configure(super::routes)).await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    async fn tokio_yield() {
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
    }
}
