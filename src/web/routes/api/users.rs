use axum::{extract::State, Json};
use tracing::info;

use crate::{model::UserRecord, store::StoreError, web::WebResult, AppState};

#[derive(Debug, thiserror::Error)]
pub enum UsersError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[tracing::instrument(name = "Listing all subscribed users", skip(app_state))]
pub async fn users(State(app_state): State<AppState>) -> WebResult<Json<Vec<UserRecord>>> {
    let users = app_state
        .store
        .list_all()
        .await
        .map_err(UsersError::from)?;
    info!("Listed {} users", users.len());

    Ok(Json(users))
}
