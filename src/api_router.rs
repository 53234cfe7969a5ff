//! Combines the per-module routers into the service's unified API surface.

use axum::Router;
use std::sync::Arc;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::marketplace::configure())
        .merge(crate::messages::configure())
        .merge(crate::packages::configure())
        .merge(crate::tickets::configure())
        .merge(crate::payments::configure())
        .merge(crate::settings::configure())
}
