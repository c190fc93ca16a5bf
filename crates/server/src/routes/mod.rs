use axum::Router;

use crate::DeploymentImpl;

pub mod alerts;
pub mod analytics_settings;
pub mod categories;
pub mod changes;
pub mod coverage;
pub mod events;
pub mod health;
pub mod http_logs;
pub mod platforms;
pub mod versions;
pub mod volumes;

pub fn router(deployment: DeploymentImpl) -> Router {
    let base_routes = Router::new()
        .merge(health::router(&deployment))
        .merge(categories::router(&deployment))
        .merge(events::router(&deployment))
        .merge(versions::router(&deployment))
        .merge(platforms::router(&deployment))
        .merge(changes::router(&deployment))
        .merge(volumes::router(&deployment))
        .merge(alerts::router(&deployment))
        .merge(coverage::router(&deployment))
        .merge(analytics_settings::router(&deployment))
        .merge(http_logs::router(&deployment));

    Router::new()
        .nest("/api", base_routes)
        .with_state(deployment)
}
