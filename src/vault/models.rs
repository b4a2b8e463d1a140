//! User Context Domain Models
//!
//! Typed shape of the `UserContextV0` document served by vault-api. Consumers
//! on the MCP side treat the document as opaque JSON; these types only exist
//! to serve and validate it at the source.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Root of the context document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserContext {
    #[serde(default)]
    pub identity: Identity,

    #[serde(default)]
    pub prefs: Prefs,

    #[serde(default)]
    pub comms: Comms,

    /// File references; kept untyped
    #[serde(default)]
    pub files: Vec<Value>,

    #[serde(default)]
    pub policy: Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    /// IANA timezone name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Prefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Comms {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_provider: Option<String>,
    #[serde(default)]
    pub availability: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub allowed_apps: Vec<String>,
    #[serde(default)]
    pub share_levels: HashMap<String, Value>,
}

impl UserContext {
    /// The document served when no context file is configured.
    pub fn sample() -> Self {
        Self {
            identity: Identity {
                full_name: "Ben Shoemaker".into(),
                emails: vec!["ben@example.com".into()],
                timezone: Some("America/Los_Angeles".into()),
            },
            prefs: Prefs {
                tone: Some("concise".into()),
                units: Some("imperial".into()),
                date_format: Some("MM/dd/yyyy".into()),
            },
            comms: Comms {
                primary_email: Some("ben@example.com".into()),
                calendar_provider: Some("google".into()),
                availability: Vec::new(),
            },
            files: Vec::new(),
            policy: Policy {
                allowed_apps: vec!["codex-local".into()],
                share_levels: HashMap::new(),
            },
        }
    }
}
