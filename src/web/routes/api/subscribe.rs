use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::{error, info, Span};

use crate::{
    model::UserRecord,
    store::{InsertRowError, StoreError},
    web::{
        types::{DeserSubscription, PendingSubscription, SubscriptionError},
        WebResult,
    },
    AppState,
};

// ###################################
// ->   ERROR
// ###################################
#[derive(Debug, thiserror::Error)]
pub enum SubscribeError {
    #[error("request body rejected: {0}")]
    InvalidBody(String),
    #[error("invalid subscription: {0}")]
    Validation(#[from] SubscriptionError),
    #[error("store rejected the row: {0:?}")]
    InsertRejected(Vec<InsertRowError>),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

// ###################################
// ->   API
// ###################################
#[tracing::instrument(
    name = "Registering a new subscription",
    skip_all,
    fields(user_id = tracing::field::Empty)
)]
pub async fn subscribe(
    State(app_state): State<AppState>,
    payload: Result<Json<DeserSubscription>, JsonRejection>,
) -> WebResult<(StatusCode, Json<Value>)> {
    // Malformed bodies get the same `{"error": ...}` shape as the validation failures.
    let Json(subscription) =
        payload.map_err(|rejection| SubscribeError::InvalidBody(rejection.body_text()))?;
    register(&app_state, subscription).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User subscribed successfully!" })),
    ))
}

/// Validates the subscription in the documented order and appends it to the store.
/// The existence check runs between the required-fields check and the rest of the validation.
async fn register(
    app_state: &AppState,
    subscription: DeserSubscription,
) -> Result<(), SubscribeError> {
    let pending = PendingSubscription::try_from(subscription)?;
    Span::current().record("user_id", pending.user_id.as_str());

    // Fails closed: a store error here aborts the registration.
    if user_exists(app_state, &pending.user_id).await? {
        return Err(SubscriptionError::DuplicateUserId.into());
    }

    let record = UserRecord::try_from(pending)?;
    save_user(app_state, &record).await?;

    info!("New subscriber successfully added to the store.");
    Ok(())
}

async fn user_exists(app_state: &AppState, user_id: &str) -> Result<bool, SubscribeError> {
    let count = app_state.store.count_by_user_id(user_id).await?;
    Ok(count > 0)
}

/// Row errors reported by the store fail the request.
/// A `duplicate` row error comes from stores with a conditional insert that caught a
/// registration racing past the existence check.
async fn save_user(app_state: &AppState, record: &UserRecord) -> Result<(), SubscribeError> {
    let insert_errors = app_state.store.insert_record(record).await?;
    if insert_errors.is_empty() {
        return Ok(());
    }

    error!("Encountered errors while inserting rows: {insert_errors:?}");
    if insert_errors.iter().any(InsertRowError::is_duplicate) {
        return Err(SubscriptionError::DuplicateUserId.into());
    }
    Err(SubscribeError::InsertRejected(insert_errors))
}
