// Route exports
pub mod matches;

use actix_web::web;

/// Mount the API under `/api/v1`
///
/// - `GET  /health`
/// - `POST /matches/filter`, `/matches/score`, `/matches/batch`, `/matches/rank`
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(matches::health_check))
            .service(web::scope("/matches").configure(matches::configure)),
    );
}
