use actix_web::HttpResponse;

/// Liveness only; storage is not probed
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}
