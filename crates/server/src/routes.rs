//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mirror_routes = Router::new()
        .route(
            "/v1/providers/{hostname}/{namespace}/{type}/{action}",
            get(handlers::get_metadata),
        )
        .route(
            "/v1/providers/{hostname}/{namespace}/{type}/download/{archive}",
            get(handlers::download_archive),
        )
        .route("/v1/providers/sync", put(handlers::sync_metadata));

    let measure_routes = Router::new()
        .route("/readyz", get(handlers::readyz))
        .route("/livez", get(handlers::livez))
        .route("/debug/version", get(handlers::version));

    let mut router = Router::new().merge(mirror_routes).merge(measure_routes);

    if state.config.server.metrics_enabled {
        router = router.merge(Router::new().route("/metrics", get(handlers::metrics_handler)));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
