use crate::{config::Config, handlers::{status_json, status_text}, state::AppState};
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if origins.is_empty() {
        if config.is_production() {
            warn!("CORS_ORIGINS not set in production, status is readable from any origin");
        }
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

/// Create the relay routes. WebSocket upgrades are accepted on every path.
pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/status", get(status_json))
        .fallback(status_text)
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
