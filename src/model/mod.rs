//! The `UserRecord` persisted by every `UserStore` and the enums it is made of.

use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;

// ###################################
// ->   STRUCTS
// ###################################
/// One user's subscription preferences, as stored in the `user_input_table`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub email_id: Option<String>,
    pub phone_number: Option<String>,
    pub location: String,
    pub notification_method: Vec<NotificationMethod>,
    pub preferred_units: PreferredUnits,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
pub enum NotificationMethod {
    #[serde(rename = "email")]
    #[strum(serialize = "email")]
    Email,
    #[serde(rename = "SMS")]
    #[strum(serialize = "SMS")]
    Sms,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
pub enum PreferredUnits {
    #[default]
    Celsius,
    Fahrenheit,
}

// ###################################
// ->   IMPLs
// ###################################
impl NotificationMethod {
    /// Exact, case sensitive match on the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "SMS" => Some(Self::Sms),
            _ => None,
        }
    }
}

impl PreferredUnits {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Celsius" => Some(Self::Celsius),
            "Fahrenheit" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}
