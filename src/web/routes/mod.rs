//! Contains all the routes that this application can handle.

mod api;

// re-export errors
pub use api::{subscribe::SubscribeError, users::UsersError};

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

/// All the routes of the server
pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .route("/subscribe", post(api::subscribe))
        .route("/users", get(api::users))
        .with_state(app_state)
}
