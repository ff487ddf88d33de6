//! Requests and validates the permission-filtered menu for a (user, context).
//!
//! The endpoint itself is an external collaborator behind [`MenuQuery`].
//! Whatever it returns is untrusted until it passes
//! [`menu_protocol::parse_query_response`] and tree construction; failures
//! surface as `MalformedResponse`, never as a panic.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use menu_protocol::{decode_body, parse_query_response, MenuQueryRequest};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::MenuPayload;
use crate::config::EndpointConfig;
use crate::error::{MenuError, Result};
use crate::tree::MenuTree;
use crate::types::Context;

/// The outbound menu-query operation.
///
/// Implementors return the raw JSON body; shape validation happens in
/// [`MenuFetcher`] so every transport gets the same checks.
#[async_trait]
pub trait MenuQuery: Send + Sync {
    async fn query(&self, request: &MenuQueryRequest) -> Result<Value>;
}

#[derive(Clone)]
pub struct MenuFetcher {
    query: Arc<dyn MenuQuery>,
}

impl std::fmt::Debug for MenuFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuFetcher").finish_non_exhaustive()
    }
}

impl MenuFetcher {
    pub fn new(query: Arc<dyn MenuQuery>) -> Self {
        Self { query }
    }

    pub async fn fetch(&self, user_id: &str, context: Context) -> Result<MenuPayload> {
        let request = MenuQueryRequest {
            user_id: user_id.to_string(),
            context_type: context.kind,
            context_id: context.id,
        };
        debug!(user_id, context = %context, "Fetching menu");

        let body = self.query.query(&request).await.map_err(|err| {
            warn!(error = %err, user_id, context = %context, "Menu query failed");
            err
        })?;

        let response = parse_query_response(body).map_err(|info| {
            warn!(code = %info.code, error = %info.message, context = %context, "Menu response rejected");
            MenuError::from(info)
        })?;

        if let Some(echo) = &response.context {
            let echoed_type = echo.context_type.as_deref();
            if echoed_type.is_some_and(|kind| kind != context.kind.as_str()) || echo.id != context.id {
                warn!(
                    requested = %context,
                    echoed_type = ?echoed_type,
                    echoed_id = ?echo.id,
                    "Menu endpoint echoed a different context"
                );
            }
        }

        let tree = MenuTree::new(response.menus)?;
        info!(
            user_id,
            context = %context,
            nodes = tree.len(),
            top_level = tree.root_count(),
            permissions = response.user_permissions.len(),
            "Menu fetched"
        );

        Ok(MenuPayload {
            tree: Arc::new(tree),
            permissions: response.user_permissions,
            echoed_context: response.context,
        })
    }

    /// Owned, `'static` variant suitable for sharing between joined callers.
    pub fn fetch_owned(&self, user_id: String, context: Context) -> BoxFuture<'static, Result<MenuPayload>> {
        let fetcher = self.clone();
        async move { fetcher.fetch(&user_id, context).await }.boxed()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Settle gate
// ═══════════════════════════════════════════════════════════════════════════════

/// Holds back the first fetch after auth and context become ready.
///
/// Several consumers typically mount within a few hundred milliseconds of each
/// other. The first caller opens a window of `delay`; every caller inside the
/// window waits for it to close. Once closed, the gate never waits again.
#[derive(Debug)]
pub struct SettleGate {
    delay: std::time::Duration,
    deadline: Mutex<Option<Instant>>,
}

impl SettleGate {
    pub fn new(delay: std::time::Duration) -> Self {
        Self {
            delay,
            deadline: Mutex::new(None),
        }
    }

    pub async fn wait(&self) {
        let deadline = self.open_window();
        if Instant::now() < deadline {
            debug!(delay_ms = self.delay.as_millis() as u64, "Waiting for menu settle window");
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// The window's closing time, starting it on first use.
    fn open_window(&self) -> Instant {
        let mut deadline = self
            .deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *deadline.get_or_insert_with(|| Instant::now() + self.delay)
    }

    pub fn has_started(&self) -> bool {
        self.deadline
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTTP transport
// ═══════════════════════════════════════════════════════════════════════════════

/// `GET {base_url}/menus/user/{user_id}?context_type=..&context_id=..`
#[derive(Debug, Clone)]
pub struct HttpMenuQuery {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMenuQuery {
    pub fn new(endpoint: &EndpointConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .map_err(|err| MenuError::network(format!("Failed to build HTTP client: {}", err)))?;
        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, user_id: &str) -> String {
        format!("{}/menus/user/{}", self.base_url, user_id)
    }
}

#[async_trait]
impl MenuQuery for HttpMenuQuery {
    async fn query(&self, request: &MenuQueryRequest) -> Result<Value> {
        if request.user_id.is_empty() || request.user_id.contains(|c| matches!(c, '/' | '?' | '#')) {
            return Err(MenuError::internal(format!(
                "user id {:?} cannot be used in a request path",
                request.user_id
            )));
        }

        let mut builder = self
            .client
            .get(self.url(&request.user_id))
            .query(&request.query_pairs());
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| MenuError::network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MenuError::network(format!(
                "menu endpoint returned {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| MenuError::network(format!("Failed to read menu response: {}", err)))?;
        Ok(decode_body(&body)?)
    }
}
