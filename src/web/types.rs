//! The request structs of the `web` module, their validation and tests for those.
//!
//! A subscription is validated in two steps so the existence check can sit between them:
//! `DeserSubscription` -> `PendingSubscription` (required fields present)
//! -> `UserRecord` (contact, notification methods, units).

use serde::Deserialize;
use serde_json::Value;

use crate::model::{NotificationMethod, PreferredUnits, UserRecord};

// ###################################
// ->   STRUCTS
// ###################################
/// Deserializable Subscription
/// A Subscription that can be Deserialized but can have missing or invalid fields.
/// Every field stays raw so that its type is checked during validation, in order.
#[derive(Debug, Default, Deserialize)]
pub struct DeserSubscription {
    pub user_id: Option<Value>,
    pub email_id: Option<Value>,
    pub phone_number: Option<Value>,
    pub location: Option<Value>,
    pub notification_method: Option<Value>,
    pub preferred_units: Option<Value>,
}

/// A Subscription with all the required fields present.
#[derive(Debug)]
pub struct PendingSubscription {
    pub user_id: String,
    pub email_id: Option<Value>,
    pub phone_number: Option<Value>,
    pub location: String,
    pub notification_method: Value,
    pub preferred_units: Option<Value>,
}

// ###################################
// ->   IMPLS
// ###################################
impl TryFrom<DeserSubscription> for PendingSubscription {
    type Error = SubscriptionError;

    fn try_from(deser: DeserSubscription) -> Result<Self, Self::Error> {
        let present = |v: Option<Value>| v.filter(|v| !v.is_null());
        let (Some(user_id), Some(location), Some(notification_method)) = (
            present(deser.user_id),
            present(deser.location),
            present(deser.notification_method),
        ) else {
            return Err(SubscriptionError::MissingRequiredFields);
        };

        Ok(PendingSubscription {
            user_id: required_string(user_id, "user_id")?,
            email_id: deser.email_id,
            phone_number: deser.phone_number,
            location: required_string(location, "location")?,
            notification_method,
            preferred_units: deser.preferred_units,
        })
    }
}

impl TryFrom<PendingSubscription> for UserRecord {
    type Error = SubscriptionError;

    fn try_from(pending: PendingSubscription) -> Result<Self, Self::Error> {
        let email_id = contact(pending.email_id, "email_id")?;
        let phone_number = contact(pending.phone_number, "phone_number")?;
        if email_id.is_none() && phone_number.is_none() {
            return Err(SubscriptionError::ContactMethodRequired);
        }

        Ok(UserRecord {
            user_id: pending.user_id,
            email_id,
            phone_number,
            location: pending.location,
            notification_method: parse_notification_methods(&pending.notification_method)?,
            preferred_units: parse_preferred_units(pending.preferred_units.as_ref())?,
        })
    }
}

fn required_string(value: Value, field: &'static str) -> Result<String, SubscriptionError> {
    match value {
        Value::String(value) => Ok(value),
        _ => Err(SubscriptionError::InvalidFieldType(field)),
    }
}

/// `null` and `""` count as absent. Numbers are kept in their JSON text form.
fn contact(value: Option<Value>, field: &'static str) -> Result<Option<String>, SubscriptionError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.is_empty() => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(SubscriptionError::InvalidFieldType(field)),
    }
}

/// Accepts a non-empty JSON array of `"email"` / `"SMS"`. Repeated values collapse into one.
fn parse_notification_methods(value: &Value) -> Result<Vec<NotificationMethod>, SubscriptionError> {
    let methods = value
        .as_array()
        .filter(|arr| !arr.is_empty())
        .ok_or(SubscriptionError::InvalidNotificationMethod)?;

    let mut parsed = Vec::with_capacity(methods.len());
    for method in methods {
        let method = method
            .as_str()
            .and_then(NotificationMethod::parse)
            .ok_or(SubscriptionError::InvalidNotificationMethod)?;
        if !parsed.contains(&method) {
            parsed.push(method);
        }
    }

    Ok(parsed)
}

fn parse_preferred_units(value: Option<&Value>) -> Result<PreferredUnits, SubscriptionError> {
    match value {
        None | Some(Value::Null) => Ok(PreferredUnits::default()),
        Some(units) => units
            .as_str()
            .and_then(PreferredUnits::parse)
            .ok_or(SubscriptionError::InvalidUnits),
    }
}

// ###################################
// ->   ERROR
// ###################################
/// The `Display` output of every variant is the reason sent back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Missing required fields")]
    MissingRequiredFields,
    #[error("Invalid {0}. Expected a string.")]
    InvalidFieldType(&'static str),
    #[error("User ID already exists. Please choose a different one.")]
    DuplicateUserId,
    #[error("Either email_id or phone number is required.")]
    ContactMethodRequired,
    #[error("Invalid notification method. Choose 'email' or 'SMS'.")]
    InvalidNotificationMethod,
    #[error("Invalid preferred_units. Choose 'Celsius' or 'Fahrenheit'.")]
    InvalidUnits,
}
