// routes.rs
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::authority::Authority;
use crate::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub authority: Authority,
}

pub fn create_routes(authority: Authority) -> Router {
    let state = AppState { authority };
    Router::new()
        .route(
            "/api/poll",
            get(handlers::get_poll).post(handlers::create_poll),
        )
        .route("/api/poll/{id}", delete(handlers::remove_poll))
        .route("/api/poll/{id}/vote", post(handlers::vote))
        .route("/api/poll/{id}/unvote", post(handlers::unvote))
        .route(
            "/api/messages",
            get(handlers::get_messages).post(handlers::send_message),
        )
        .route("/api/subscribe", get(handlers::subscribe))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
