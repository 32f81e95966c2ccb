use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/lifecycle/installed", post(handlers::installed))
        .route("/api/lifecycle/startup", post(handlers::startup))
        .route(
            "/api/tabs/:id/page",
            post(handlers::connect_page).delete(handlers::disconnect_page),
        )
        .route("/api/tabs/:id/page/messages", get(handlers::page_messages))
        .route("/api/tabs/:id/messages", post(handlers::tab_message))
        .route("/api/tabs/:id/activated", post(handlers::tab_activated))
        .route("/api/tabs/:id/updated", post(handlers::tab_updated))
        .route("/api/tabs/:id", delete(handlers::tab_removed))
        .route("/api/messages", post(handlers::message))
        .route("/api/host/commands", get(handlers::host_commands))
        .route("/api/settings", get(handlers::settings))
        .route("/api/tracking", get(handlers::tracking))
        .with_state(state)
}
