use actix_web::{HttpResponse, get, web};
use stwatch_service::WatcherHandle;

use crate::error::AppError;

/// Everything the watcher knows right now, from memory
#[get("/latest")]
pub async fn latest_route(handle: web::Data<WatcherHandle>) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(handle.latest().await?))
}
