use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use strum_macros::AsRefStr;

use super::routes::{SubscribeError, UsersError};

pub type WebResult<T> = core::result::Result<T, Error>;

#[derive(Debug, AsRefStr, thiserror::Error)]
pub enum Error {
    #[error("subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),
    #[error("users error: {0}")]
    Users(#[from] UsersError),
}

impl Error {
    pub fn status_code_and_client_error(&self) -> (StatusCode, ClientError) {
        use ClientError::*;

        match self {
            Error::Subscribe(SubscribeError::Validation(reason)) => {
                (StatusCode::BAD_REQUEST, InvalidInput(reason.to_string()))
            }
            Error::Subscribe(SubscribeError::InvalidBody(reason)) => (
                StatusCode::BAD_REQUEST,
                InvalidInput(format!("Invalid request body: {reason}")),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, ServiceError),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        tracing::debug!("{:<12} - into_response(Error: {self:?})", "INTO_RESP");

        // Construct a response
        let mut res = StatusCode::INTERNAL_SERVER_ERROR.into_response();

        // Insert the Error into response so that it can be retrieved later.
        res.extensions_mut().insert(Arc::new(self));

        res
    }
}

/// What the client gets to see. Rendered as `{"error": <Display>}` by the response mapper.
#[derive(Debug, Clone, PartialEq, Eq, AsRefStr, derive_more::Display)]
pub enum ClientError {
    #[display("{_0}")]
    InvalidInput(String),
    #[display("Service Error!")]
    ServiceError,
}
