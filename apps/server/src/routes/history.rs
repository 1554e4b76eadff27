use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use stwatch_service::WatcherHandle;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    server: Option<String>,
}

/// Stored status records of one server, newest first.
/// An unknown server is answered with `err: "not found"`, not an error status.
#[get("/history")]
pub async fn history_route(
    handle: web::Data<WatcherHandle>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(handle.history(query.server.as_deref()).await?))
}
