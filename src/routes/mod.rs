//! Route tables.
//!
//! Each submodule returns a stateful router; [`create_app_router`] merges
//! them and applies the poller auth layer.

pub mod api;
pub mod onprem;
pub mod voice;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::poller_auth_middleware;
use crate::state::AppState;

/// Full application router with state attached.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    let poller_routes = onprem::create_poller_router().layer(middleware::from_fn_with_state(
        state.clone(),
        poller_auth_middleware,
    ));

    api::create_api_router()
        .merge(voice::create_voice_router())
        .merge(poller_routes)
        .merge(onprem::create_onprem_status_router())
        .with_state(state)
}
