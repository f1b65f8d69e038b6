use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Claim marking an identity as privileged (full health details, config).
pub const ADMIN_CLAIM: &str = "admin";

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Authenticated identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
            claims: HashMap::new(),
        }
    }

    /// Identity with the admin claim set.
    pub fn admin(user_id: impl Into<String>, method: impl Into<String>) -> Self {
        let mut claims = HashMap::new();
        claims.insert(ADMIN_CLAIM.to_string(), serde_json::Value::Bool(true));
        Self {
            user_id: user_id.into(),
            method: method.into(),
            claims,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.claims
            .get(ADMIN_CLAIM)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}
