//! Wire types and validation for the menu query endpoint.
//!
//! This crate is shared by the menu client and anything that serves or fakes
//! the endpoint, so both sides agree on the schema. The client remains the
//! authority on validation: a response is only trusted once it has passed
//! [`parse_query_response`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024; // 4MB
pub const MAX_MENU_NODES: usize = 10_000;
pub const MAX_MENU_DEPTH: usize = 32;

/// Node identifiers are unique within a single tree.
pub type NodeId = i64;

/// Tenant/role scope under which menu permissions are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    System,
    Company,
    Establishment,
    Professional,
    Patient,
    Client,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Company => "company",
            Self::Establishment => "establishment",
            Self::Professional => "professional",
            Self::Patient => "patient",
            Self::Client => "client",
        }
    }

    /// Individual contexts act on behalf of a single person rather than an organization.
    pub fn is_individual(&self) -> bool {
        matches!(self, Self::Professional | Self::Patient | Self::Client)
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the permission-filtered menu tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default, alias = "sortOrder")]
    pub sort_order: i32,
    #[serde(default, alias = "badgeText", skip_serializing_if = "Option::is_none")]
    pub badge_text: Option<String>,
    #[serde(default, alias = "badgeColor", skip_serializing_if = "Option::is_none")]
    pub badge_color: Option<String>,
    #[serde(default)]
    pub children: Vec<MenuNode>,
}

/// Context as echoed back by the endpoint. Kept loose on purpose: it is only
/// used for diagnostics and must not fail an otherwise valid response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEcho {
    #[serde(rename = "type", default)]
    pub context_type: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuQueryRequest {
    pub user_id: String,
    pub context_type: ContextType,
    #[serde(default)]
    pub context_id: Option<i64>,
}

impl MenuQueryRequest {
    /// Query-string pairs, omitting `context_id` when the context has none.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("context_type", self.context_type.as_str().to_string())];
        if let Some(id) = self.context_id {
            pairs.push(("context_id", id.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuQueryResponse {
    pub menus: Vec<MenuNode>,
    #[serde(default)]
    pub user_permissions: Vec<String>,
    #[serde(default)]
    pub context: Option<ContextEcho>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub fn parse_query_response(value: Value) -> Result<MenuQueryResponse, ErrorInfo> {
    let Some(object) = value.as_object() else {
        return Err(ErrorInfo::new(
            "malformed_response",
            "response body is not a JSON object",
        ));
    };

    match object.get("menus") {
        Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(ErrorInfo::new(
                "malformed_response",
                "`menus` must be an array",
            ))
        }
        None => {
            return Err(ErrorInfo::new(
                "malformed_response",
                "response is missing the `menus` array",
            ))
        }
    }

    let response: MenuQueryResponse = serde_json::from_value(value).map_err(|err| {
        ErrorInfo::new(
            "invalid_menu_node",
            format!("menu payload is invalid: {}", err),
        )
    })?;
    validate_nodes(&response.menus)?;
    Ok(response)
}

/// Decodes a raw response body, refusing anything over `MAX_RESPONSE_BYTES`.
///
/// Every transport runs its body through here before `parse_query_response`.
pub fn decode_body(bytes: &[u8]) -> Result<Value, ErrorInfo> {
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(ErrorInfo::new(
            "response_too_large",
            format!("response exceeded {} bytes", MAX_RESPONSE_BYTES),
        ));
    }
    serde_json::from_slice(bytes).map_err(|err| {
        ErrorInfo::new(
            "malformed_response",
            format!("response is not valid JSON: {}", err),
        )
    })
}

/// Checks node count, nesting depth and id uniqueness without recursing.
fn validate_nodes(roots: &[MenuNode]) -> Result<(), ErrorInfo> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut stack: Vec<(&MenuNode, usize)> = roots.iter().map(|node| (node, 1)).collect();

    while let Some((node, depth)) = stack.pop() {
        if depth > MAX_MENU_DEPTH {
            return Err(ErrorInfo::new(
                "menu_too_deep",
                format!("menu nesting exceeds {} levels", MAX_MENU_DEPTH),
            ));
        }
        if !seen.insert(node.id) {
            return Err(ErrorInfo::new(
                "duplicate_node_id",
                format!("menu node id {} appears more than once", node.id),
            ));
        }
        if seen.len() > MAX_MENU_NODES {
            return Err(ErrorInfo::new(
                "menu_too_large",
                format!("menu exceeds {} nodes", MAX_MENU_NODES),
            ));
        }
        stack.extend(node.children.iter().map(|child| (child, depth + 1)));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: i64, children: Value) -> Value {
        json!({
            "id": id,
            "name": format!("Node {}", id),
            "slug": format!("node-{}", id),
            "path": format!("/node-{}", id),
            "icon": "circle",
            "level": 0,
            "sort_order": id,
            "children": children,
        })
    }

    #[test]
    fn parses_full_response() {
        let value = json!({
            "menus": [node(1, json!([node(2, json!([]))]))],
            "user_permissions": ["companies.view", "billing.view"],
            "context": { "type": "company", "id": 42 },
        });

        let response = parse_query_response(value).expect("valid response");
        assert_eq!(response.menus.len(), 1);
        assert_eq!(response.menus[0].children[0].id, 2);
        assert_eq!(response.user_permissions.len(), 2);
        assert_eq!(
            response.context,
            Some(ContextEcho {
                context_type: Some("company".to_string()),
                id: Some(42),
            })
        );
    }

    #[test]
    fn accepts_camel_case_node_fields() {
        let value = json!({
            "menus": [{
                "id": 7,
                "name": "Billing",
                "sortOrder": 3,
                "badgeText": "new",
                "badgeColor": "red",
            }],
        });

        let response = parse_query_response(value).expect("valid response");
        let billing = &response.menus[0];
        assert_eq!(billing.sort_order, 3);
        assert_eq!(billing.badge_text.as_deref(), Some("new"));
        assert!(billing.path.is_none());
        assert!(response.user_permissions.is_empty());
    }

    #[test]
    fn rejects_missing_menus() {
        let err = parse_query_response(json!({ "user_permissions": [] })).unwrap_err();
        assert_eq!(err.code, "malformed_response");
    }

    #[test]
    fn rejects_non_array_menus() {
        let err = parse_query_response(json!({ "menus": { "id": 1 } })).unwrap_err();
        assert_eq!(err.code, "malformed_response");
    }

    #[test]
    fn rejects_non_object_body() {
        let err = parse_query_response(json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.code, "malformed_response");
    }

    #[test]
    fn rejects_node_without_name() {
        let err = parse_query_response(json!({ "menus": [{ "id": 1 }] })).unwrap_err();
        assert_eq!(err.code, "invalid_menu_node");
    }

    #[test]
    fn rejects_duplicate_ids_across_levels() {
        let value = json!({ "menus": [node(1, json!([node(1, json!([]))]))] });
        let err = parse_query_response(value).unwrap_err();
        assert_eq!(err.code, "duplicate_node_id");
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut current = node(100, json!([]));
        for id in (0..MAX_MENU_DEPTH as i64).rev() {
            current = node(id, json!([current]));
        }
        let err = parse_query_response(json!({ "menus": [current] })).unwrap_err();
        assert_eq!(err.code, "menu_too_deep");
    }

    #[test]
    fn rejects_invalid_json_bytes() {
        let err = decode_body(b"<html>gateway</html>").unwrap_err();
        assert_eq!(err.code, "malformed_response");
    }

    #[test]
    fn rejects_oversized_body_before_parsing() {
        let body = vec![b' '; MAX_RESPONSE_BYTES + 1];
        let err = decode_body(&body).unwrap_err();
        assert_eq!(err.code, "response_too_large");
    }

    #[test]
    fn decoded_body_feeds_response_parser() {
        let value = decode_body(br#"{ "menus": [{ "id": 1, "name": "Home" }] }"#).unwrap();
        let response = parse_query_response(value).unwrap();
        assert_eq!(response.menus[0].name, "Home");
    }

    #[test]
    fn query_pairs_omit_missing_context_id() {
        let request = MenuQueryRequest {
            user_id: "7".to_string(),
            context_type: ContextType::System,
            context_id: None,
        };
        assert_eq!(
            request.query_pairs(),
            vec![("context_type", "system".to_string())]
        );

        let request = MenuQueryRequest {
            context_type: ContextType::Company,
            context_id: Some(42),
            ..request
        };
        assert_eq!(
            request.query_pairs(),
            vec![
                ("context_type", "company".to_string()),
                ("context_id", "42".to_string()),
            ]
        );
    }
}
