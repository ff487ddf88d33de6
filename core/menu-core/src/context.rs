//! Maps a user session to the context menu permissions are evaluated under.
//!
//! Resolution is a pure function of the snapshot: no clock, no I/O, no
//! caching. Callers recompute it whenever the session identity changes.

use crate::types::{Context, ContextType, UserSnapshot};

/// Resolves the operating context for `user`.
///
/// An explicit hint wins over the id-based fallback chain.
pub fn resolve_context(user: &UserSnapshot) -> Context {
    let hinted = user
        .context_type_hint
        .as_deref()
        .map(str::trim)
        .filter(|hint| !hint.is_empty())
        .map(context_type_from_hint);

    let kind = match hinted {
        Some(kind) => kind,
        None => fallback_context_type(user),
    };

    Context::new(kind, context_id_for(kind, user))
}

/// Fixed hint table. Anything unrecognized scopes to an establishment.
pub fn context_type_from_hint(hint: &str) -> ContextType {
    match hint.trim().to_ascii_lowercase().as_str() {
        "system" | "admin" => ContextType::System,
        "professional" => ContextType::Professional,
        "patient" => ContextType::Patient,
        "client" => ContextType::Client,
        _ => ContextType::Establishment,
    }
}

fn fallback_context_type(user: &UserSnapshot) -> ContextType {
    if user.company_id.is_some() {
        ContextType::Company
    } else if user.establishment_id.is_some() {
        ContextType::Establishment
    } else if user.is_system_admin {
        ContextType::System
    } else {
        ContextType::Establishment
    }
}

fn context_id_for(kind: ContextType, user: &UserSnapshot) -> Option<i64> {
    match kind {
        ContextType::System => None,
        ContextType::Company => user.company_id,
        ContextType::Establishment => user.establishment_id,
        ContextType::Professional | ContextType::Patient | ContextType::Client => {
            user.company_id.or(user.establishment_id)
        }
    }
}
