//! Caller identity and client context attached to every audited operation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the person or system performing an operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Provider,
    Nurse,
    Staff,
    Billing,
    Patient,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Provider => "provider",
            Role::Nurse => "nurse",
            Role::Staff => "staff",
            Role::Billing => "billing",
            Role::Patient => "patient",
            Role::System => "system",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "provider" | "physician" | "doctor" => Ok(Role::Provider),
            "nurse" => Ok(Role::Nurse),
            "staff" => Ok(Role::Staff),
            "billing" => Ok(Role::Billing),
            "patient" => Ok(Role::Patient),
            "system" => Ok(Role::System),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

/// How the actor reached the system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    #[default]
    Web,
    Mobile,
    Api,
    Internal,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::Web => "web",
            AccessMethod::Mobile => "mobile",
            AccessMethod::Api => "api",
            AccessMethod::Internal => "internal",
        }
    }
}

/// Client-supplied request attributes.
///
/// None of these are trusted; they are recorded for forensic purposes only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ClientContext {
    /// Remote address as reported by the transport layer
    pub ip_address: Option<String>,

    /// Browser or client signature string
    pub user_agent: Option<String>,

    /// Preferred language (e.g. "en-US")
    pub accept_language: Option<String>,

    /// IANA timezone reported by the client
    pub timezone: Option<String>,

    /// Platform string reported by the client
    pub platform: Option<String>,

    /// Facility, department or "remote"
    pub access_location: Option<String>,

    /// Channel used to reach the portal
    pub access_method: Option<AccessMethod>,
}

/// The authenticated caller of a compliance operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub client: ClientContext,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            client: ClientContext::default(),
        }
    }

    pub fn with_client(mut self, client: ClientContext) -> Self {
        self.client = client;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
