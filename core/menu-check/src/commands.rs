//! Subcommand bodies. Each returns the text to print on stdout.

use async_trait::async_trait;
use menu_core::{
    load_menu_config, resolve_context, AuthSnapshot, DeviceCapabilities, HttpMenuQuery,
    MenuConfig, MenuEngine, MenuError, MenuQuery, MenuRow, MenuSnapshot, MenuView, NodeId,
    SidebarModel, UserSnapshot,
};
use menu_protocol::{decode_body, MenuQueryRequest};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Serves a menu response recorded to disk.
#[derive(Debug, Clone)]
pub struct FileMenuQuery {
    path: PathBuf,
}

impl FileMenuQuery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MenuQuery for FileMenuQuery {
    async fn query(&self, request: &MenuQueryRequest) -> menu_core::Result<Value> {
        debug!(
            path = %self.path.display(),
            user_id = %request.user_id,
            context_type = %request.context_type,
            context_id = ?request.context_id,
            "Serving menu response from file"
        );
        // An unreadable recording stands in for an unreachable service.
        let bytes = fs_err::read(&self.path).map_err(|err| {
            MenuError::network(format!("Failed to read menu response: {}", err))
        })?;
        Ok(decode_body(&bytes)?)
    }
}

/// Reads an auth snapshot. A bare user object counts as signed in.
pub fn read_session(path: &Path) -> Result<AuthSnapshot, String> {
    let content = fs_err::read_to_string(path).map_err(|err| err.to_string())?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|err| format!("Session file is not valid JSON: {}", err))?;

    if value.get("id").is_some() {
        let user: UserSnapshot = serde_json::from_value(value)
            .map_err(|err| format!("Invalid user in session file: {}", err))?;
        return Ok(AuthSnapshot::signed_in(user));
    }
    serde_json::from_value(value).map_err(|err| format!("Invalid session file: {}", err))
}

#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    user_id: &'a str,
    context: menu_core::Context,
    is_root: bool,
}

pub fn resolve(session: &Path) -> Result<String, String> {
    let auth = read_session(session)?;
    let user = auth
        .user
        .as_ref()
        .filter(|_| auth.is_authenticated)
        .ok_or_else(|| String::from(MenuError::Unauthenticated))?;

    let report = ResolveReport {
        user_id: &user.id,
        context: resolve_context(user),
        is_root: user.is_system_admin,
    };
    serde_json::to_string_pretty(&report).map_err(|err| err.to_string())
}

#[derive(Debug, Serialize)]
struct RenderReport {
    snapshot: MenuSnapshot,
    view: MenuView,
    active_trail: Vec<NodeId>,
    rows: Vec<MenuRow>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub location: Option<String>,
    pub config: Option<PathBuf>,
    pub touch: bool,
    pub collapsed: bool,
    pub json: bool,
}

pub async fn render(session: &Path, response: &Path, options: RenderOptions) -> Result<String, String> {
    let auth = read_session(session)?;
    let mut config = load_menu_config(options.config.clone())?;
    // Offline replay: nothing to settle.
    config.settle_delay_ms = 0;

    let engine = MenuEngine::new(config, Arc::new(FileMenuQuery::new(response)));
    let snapshot = engine.sync(&auth).await;
    info!(menus = snapshot.menus.len(), error = ?snapshot.error, "Menu rendered from file");

    let capabilities = DeviceCapabilities {
        touch_start: options.touch,
        ..DeviceCapabilities::default()
    };
    let mut sidebar = SidebarModel::new(capabilities, engine.config(), engine.clock());
    if let Some(tree) = engine.tree() {
        sidebar.replace_tree(tree);
    }
    sidebar.set_sidebar_collapsed(options.collapsed);
    if let Some(location) = &options.location {
        sidebar.navigate(location.as_str());
    }

    let report = RenderReport {
        view: engine.view(),
        active_trail: sidebar.active_trail(),
        rows: sidebar.rows(),
        snapshot,
    };

    if options.json {
        serde_json::to_string_pretty(&report).map_err(|err| err.to_string())
    } else {
        Ok(format_report(&report, sidebar.location()))
    }
}

pub async fn fetch(
    session: &Path,
    base_url: Option<String>,
    token: Option<String>,
    config: Option<PathBuf>,
) -> Result<String, String> {
    let auth = read_session(session)?;
    let mut config: MenuConfig = load_menu_config(config)?;
    if let Some(base_url) = base_url {
        config.endpoint.base_url = base_url;
    }

    let mut query = HttpMenuQuery::new(&config.endpoint)?;
    if let Some(token) = token {
        query = query.with_token(token);
    }

    let engine = MenuEngine::new(config, Arc::new(query));
    let snapshot = engine.sync(&auth).await;
    serde_json::to_string_pretty(&snapshot).map_err(|err| err.to_string())
}

fn format_report(report: &RenderReport, location: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Location: {}", location);
    match &report.snapshot.context {
        Some(context) => {
            let _ = writeln!(out, "Context:  {}", context);
        }
        None => {
            let _ = writeln!(out, "Context:  (none)");
        }
    }
    if let Some(notice) = report.view.notice() {
        let _ = writeln!(out, "{}: {} [{}]", notice.title, notice.message, notice.retry_label);
    }
    if let Some(error) = &report.snapshot.error {
        let _ = writeln!(out, "Error:    {}", error);
    }
    let _ = writeln!(out);
    out.push_str(&format_rows(&report.rows));
    out
}

/// One line per row: indent, expander, active marker, name, path.
pub fn format_rows(rows: &[MenuRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let expander = match (row.has_children, row.expanded) {
            (true, true) => '▾',
            (true, false) => '▸',
            (false, _) => ' ',
        };
        let active = if row.active { '●' } else { ' ' };
        let _ = write!(
            out,
            "{}{} {} {}",
            "  ".repeat(row.depth),
            expander,
            active,
            row.name
        );
        if let Some(path) = &row.path {
            let _ = write!(out, "  {}", path);
        }
        if let Some(badge) = &row.badge_text {
            let _ = write!(out, "  [{}]", badge);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_json(dir: &TempDir, name: &str, value: Value) -> PathBuf {
        let path = dir.path().join(name);
        fs_err::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    fn response() -> Value {
        json!({
            "menus": [
                { "id": 1, "name": "Dashboard", "path": "/dashboard", "sort_order": 0 },
                {
                    "id": 2, "name": "Billing", "path": "/billing", "sort_order": 1,
                    "children": [
                        { "id": 21, "name": "Invoices", "path": "/billing/invoices", "badge_text": "3" }
                    ]
                }
            ],
            "user_permissions": ["billing.view"]
        })
    }

    #[tokio::test]
    async fn missing_recording_is_network_failure_and_keeps_tree() {
        let dir = TempDir::new().unwrap();
        let menu = write_json(&dir, "menu.json", response());
        let config = MenuConfig {
            settle_delay_ms: 0,
            ..MenuConfig::default()
        };
        let engine = MenuEngine::new(config, Arc::new(FileMenuQuery::new(&menu)));
        let auth = AuthSnapshot::signed_in(UserSnapshot {
            id: "7".to_string(),
            company_id: Some(42),
            establishment_id: None,
            is_system_admin: false,
            context_type_hint: None,
        });

        engine.sync(&auth).await;
        assert_eq!(engine.snapshot().menus.len(), 2);

        fs_err::remove_file(&menu).unwrap();
        let snapshot = engine.refresh().await;
        assert!(matches!(
            engine.last_error(),
            Some(MenuError::NetworkFailure { .. })
        ));
        assert_eq!(snapshot.menus.len(), 2);
        assert!(matches!(engine.view(), MenuView::Ready { banner: Some(_) }));
    }

    #[tokio::test]
    async fn invalid_recording_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("menu.json");
        fs_err::write(&path, "<html>gateway</html>").unwrap();

        let request = MenuQueryRequest {
            user_id: "7".to_string(),
            context_type: menu_core::ContextType::Company,
            context_id: Some(42),
        };
        let err = FileMenuQuery::new(&path).query(&request).await.unwrap_err();
        assert!(matches!(err, MenuError::MalformedResponse { .. }));
    }

    #[test]
    fn read_session_accepts_bare_user() {
        let dir = TempDir::new().unwrap();
        let path = write_json(&dir, "user.json", json!({ "id": "7", "companyId": 42 }));
        let auth = read_session(&path).unwrap();
        assert!(auth.is_authenticated);
        assert_eq!(auth.user.unwrap().company_id, Some(42));
    }

    #[test]
    fn resolve_reports_context() {
        let dir = TempDir::new().unwrap();
        let path = write_json(&dir, "user.json", json!({ "id": "7", "company_id": 42 }));
        let output: Value = serde_json::from_str(&resolve(&path).unwrap()).unwrap();
        assert_eq!(output["context"], json!({ "type": "company", "id": 42 }));
        assert_eq!(output["is_root"], json!(false));
    }

    #[test]
    fn resolve_rejects_signed_out_session() {
        let dir = TempDir::new().unwrap();
        let path = write_json(&dir, "auth.json", json!({ "is_authenticated": false }));
        let err = resolve(&path).unwrap_err();
        assert!(err.contains("not authenticated"));
    }

    #[tokio::test]
    async fn render_marks_active_and_expanded_rows() {
        let dir = TempDir::new().unwrap();
        let session = write_json(&dir, "user.json", json!({ "id": "7", "company_id": 42 }));
        let menu = write_json(&dir, "menu.json", response());
        let config = dir.path().join("missing.toml");

        let output = render(
            &session,
            &menu,
            RenderOptions {
                location: Some("/billing/invoices".to_string()),
                config: Some(config),
                ..RenderOptions::default()
            },
        )
        .await
        .unwrap();

        assert!(output.contains("Context:  company:42"));
        assert!(output.contains("▾   Billing  /billing"));
        assert!(output.contains("    ● Invoices  /billing/invoices  [3]"));
    }

    #[tokio::test]
    async fn render_json_reports_degraded_view() {
        let dir = TempDir::new().unwrap();
        let session = write_json(&dir, "user.json", json!({ "id": "7" }));
        let menu = write_json(&dir, "menu.json", json!({ "items": [] }));

        let output = render(
            &session,
            &menu,
            RenderOptions {
                config: Some(dir.path().join("missing.toml")),
                json: true,
                ..RenderOptions::default()
            },
        )
        .await
        .unwrap();

        let report: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["view"]["kind"], json!("degraded"));
        assert_eq!(report["rows"], json!([]));
        assert!(report["snapshot"]["error"].is_string());
    }
}
