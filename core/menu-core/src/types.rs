//! Core types shared by the menu pipeline and its host UI.
//!
//! Session types come from the auth collaborator and are read-only here.
//! `MenuSnapshot` is the observable surface external debug tooling reads, so
//! field names are part of the contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use menu_protocol::{ContextEcho, ContextType, MenuNode, NodeId};

// ═══════════════════════════════════════════════════════════════════════════════
// Session Types
// ═══════════════════════════════════════════════════════════════════════════════

/// The signed-in user as seen by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: String,
    #[serde(default, alias = "companyId")]
    pub company_id: Option<i64>,
    #[serde(default, alias = "establishmentId")]
    pub establishment_id: Option<i64>,
    #[serde(default, alias = "isSystemAdmin")]
    pub is_system_admin: bool,
    #[serde(default, alias = "contextTypeHint")]
    pub context_type_hint: Option<String>,
}

/// Auth collaborator state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthSnapshot {
    #[serde(default)]
    pub user: Option<UserSnapshot>,
    #[serde(default, alias = "isAuthenticated")]
    pub is_authenticated: bool,
    #[serde(default, alias = "authLoading")]
    pub auth_loading: bool,
}

impl AuthSnapshot {
    pub fn signed_in(user: UserSnapshot) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            auth_loading: false,
        }
    }

    pub fn loading() -> Self {
        Self {
            user: None,
            is_authenticated: false,
            auth_loading: true,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Operating scope derived from a [`UserSnapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "type")]
    pub kind: ContextType,
    pub id: Option<i64>,
}

impl Context {
    pub fn new(kind: ContextType, id: Option<i64>) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}", self.kind),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Observables
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the host UI and diagnostics read from the engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MenuSnapshot {
    pub loading: bool,
    pub error: Option<String>,
    pub menus: Vec<MenuNode>,
    pub is_root: bool,
    pub context: Option<Context>,
    pub last_fetch: Option<DateTime<Utc>>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub echoed_context: Option<ContextEcho>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_snapshot_accepts_camel_case() {
        let user: UserSnapshot = serde_json::from_value(serde_json::json!({
            "id": "7",
            "companyId": 42,
            "isSystemAdmin": false,
            "contextTypeHint": "patient",
        }))
        .expect("parse user");
        assert_eq!(user.company_id, Some(42));
        assert_eq!(user.establishment_id, None);
        assert_eq!(user.context_type_hint.as_deref(), Some("patient"));
    }

    #[test]
    fn context_serializes_with_type_field() {
        let value = serde_json::to_value(Context::new(ContextType::Company, Some(42))).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "company", "id": 42 }));
    }

    #[test]
    fn context_display() {
        assert_eq!(
            Context::new(ContextType::Company, Some(42)).to_string(),
            "company:42"
        );
        assert_eq!(Context::new(ContextType::System, None).to_string(), "system");
    }
}
