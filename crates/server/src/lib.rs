use axum::{Router, http::HeaderValue};
use deployment::Deployment;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

pub mod error;
pub mod extract;
pub mod routes;

pub type DeploymentImpl = local_deployment::LocalDeployment;

/// Full application: `/api` routes plus tracing and optional CORS layers
pub fn app(deployment: DeploymentImpl) -> Router {
    let cors = cors_layer(&deployment.config().cors_allowed_origins);
    let router = routes::router(deployment).layer(TraceLayer::new_for_http());
    match cors {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    )
}
