//! MenuEngine - session-to-menu orchestration.
//!
//! Flow for every auth change: resolve the context, consult the cache, and on
//! a miss run one (possibly shared) fetch. The result is published to the
//! observables only if no newer request has started since.
//!
//! - **Async**: the only suspension points are the shared fetch and the
//!   first-fetch settle window. Internal locks are never held across them.
//! - **Ordered**: every `sync`/`refresh` takes a monotonically increasing
//!   token. A fetch that resolves after a newer token was issued is discarded
//!   without touching the cache or the observables.
//! - **Contained**: a panic anywhere in the pipeline is caught here, logged,
//!   and turned into an `InternalFault` with an empty menu.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use menu_core::{AuthSnapshot, HttpMenuQuery, MenuConfig, MenuEngine};
//!
//! let config = menu_core::load_menu_config(None)?;
//! let query = HttpMenuQuery::new(&config.endpoint)?;
//! let engine = MenuEngine::new(config, Arc::new(query));
//! let snapshot = engine.sync(&auth).await;
//! ```

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::cache::{CachedMenu, MenuCache, MenuPayload};
use crate::clock::{Clock, SystemClock};
use crate::config::MenuConfig;
use crate::context::resolve_context;
use crate::degraded::{menu_view, MenuView};
use crate::error::{MenuError, Result};
use crate::fetcher::{MenuFetcher, MenuQuery, SettleGate};
use crate::tree::MenuTree;
use crate::types::{AuthSnapshot, Context, ContextEcho, MenuSnapshot, UserSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    user_id: String,
    context: Context,
    is_root: bool,
}

impl Session {
    fn for_user(user: &UserSnapshot) -> Self {
        Self {
            user_id: user.id.clone(),
            context: resolve_context(user),
            is_root: user.is_system_admin,
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    latest_request: u64,
    session: Option<Session>,
    loading: bool,
    error: Option<MenuError>,
    tree: Option<Arc<MenuTree>>,
    last_fetch: Option<DateTime<Utc>>,
    permissions: Vec<String>,
    echoed_context: Option<ContextEcho>,
}

impl EngineState {
    /// Switches to `session`, dropping everything that belonged to another key.
    fn enter_session(&mut self, session: Session) {
        if self.session.as_ref() == Some(&session) {
            return;
        }
        if let Some(previous) = &self.session {
            info!(from = %previous.context, to = %session.context, user_id = %session.user_id, "Menu context changed");
        }
        self.session = Some(session);
        self.error = None;
        self.tree = None;
        self.last_fetch = None;
        self.permissions.clear();
        self.echoed_context = None;
    }

    fn publish(&mut self, cached: CachedMenu) {
        self.loading = false;
        self.error = None;
        self.tree = Some(cached.payload.tree);
        self.last_fetch = Some(cached.fetched_at);
        self.permissions = cached.payload.permissions;
        self.echoed_context = cached.payload.echoed_context;
    }

    fn sign_out(&mut self) {
        self.session = None;
        self.loading = false;
        self.error = Some(MenuError::Unauthenticated);
        self.tree = None;
        self.last_fetch = None;
        self.permissions.clear();
        self.echoed_context = None;
    }

    fn fail(&mut self, err: MenuError) {
        self.loading = false;
        if !err.is_fetch_failure() {
            self.tree = None;
        }
        self.error = Some(err);
    }
}

/// The orchestrator a host UI drives with auth changes and visibility events.
pub struct MenuEngine {
    config: MenuConfig,
    clock: Arc<dyn Clock>,
    cache: Arc<MenuCache>,
    fetcher: MenuFetcher,
    settle: SettleGate,
    state: Mutex<EngineState>,
}

impl std::fmt::Debug for MenuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuEngine")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl MenuEngine {
    pub fn new(config: MenuConfig, query: Arc<dyn MenuQuery>) -> Self {
        Self::with_clock(config, query, Arc::new(SystemClock))
    }

    /// Used by tests to drive TTL expiry without waiting.
    pub fn with_clock(config: MenuConfig, query: Arc<dyn MenuQuery>, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(MenuCache::new(config.cache_ttl(), clock.clone()));
        Self {
            settle: SettleGate::new(config.settle_delay()),
            fetcher: MenuFetcher::new(query),
            cache,
            clock,
            config,
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn config(&self) -> &MenuConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<MenuCache> {
        &self.cache
    }

    /// The clock the cache runs on; toggle controllers should share it.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Inputs
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reacts to the current auth state and returns the resulting observables.
    pub async fn sync(&self, auth: &AuthSnapshot) -> MenuSnapshot {
        let token = self.begin_request();
        self.contained(token, self.sync_session(auth, token)).await;
        self.snapshot()
    }

    /// Manual refresh. Ignores freshness and skips the settle window.
    pub async fn refresh(&self) -> MenuSnapshot {
        let token = self.begin_request();
        self.contained(token, self.refresh_session(token)).await;
        self.snapshot()
    }

    /// Host page visibility changed. Returns true if a refresh was issued.
    ///
    /// A cached entry older than the TTL triggers one, and the stale tree
    /// stays visible while it runs. A session left with no tree by a failed
    /// fetch retries on every return to the page.
    pub async fn on_visibility_change(&self, visible: bool) -> bool {
        if !visible {
            return false;
        }
        let Some((session, degraded)) = self.visibility_state() else {
            return false;
        };

        if self.cache.needs_refresh(&session.context, &session.user_id) {
            info!(
                context = %session.context,
                user_id = %session.user_id,
                ttl_secs = self.cache.ttl().num_seconds(),
                "Cached menu expired while hidden; refreshing"
            );
        } else if degraded && !self.cache.is_in_flight(&session.context, &session.user_id) {
            info!(
                context = %session.context,
                user_id = %session.user_id,
                "Menu unavailable; retrying on visibility"
            );
        } else {
            return false;
        }

        self.refresh().await;
        true
    }

    /// Drops cached trees; the next `sync` refetches. The visible tree stays.
    pub fn invalidate(&self, context: Option<&Context>, user_id: Option<&str>) -> usize {
        self.cache.invalidate(context, user_id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Observables
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> MenuSnapshot {
        let state = self.lock_state();
        MenuSnapshot {
            loading: state.loading,
            error: state.error.as_ref().map(|err| err.to_string()),
            menus: state
                .tree
                .as_ref()
                .map(|tree| tree.menus().to_vec())
                .unwrap_or_default(),
            is_root: state.session.as_ref().is_some_and(|s| s.is_root),
            context: state.session.as_ref().map(|s| s.context),
            last_fetch: state.last_fetch,
            permissions: state.permissions.clone(),
            echoed_context: state.echoed_context.clone(),
        }
    }

    pub fn tree(&self) -> Option<Arc<MenuTree>> {
        self.lock_state().tree.clone()
    }

    pub fn context(&self) -> Option<Context> {
        self.lock_state().session.as_ref().map(|s| s.context)
    }

    pub fn last_error(&self) -> Option<MenuError> {
        self.lock_state().error.clone()
    }

    pub fn view(&self) -> MenuView {
        let state = self.lock_state();
        menu_view(state.loading, state.tree.as_deref(), state.error.as_ref())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Pipeline
    // ─────────────────────────────────────────────────────────────────────────────

    async fn sync_session(&self, auth: &AuthSnapshot, token: u64) {
        if auth.auth_loading {
            debug!("Auth still loading; menu fetch deferred");
            self.update(token, |state| {
                state.loading = true;
                state.error = None;
            });
            return;
        }

        let user = match (&auth.user, auth.is_authenticated) {
            (Some(user), true) => user,
            _ => {
                let signed_out = self.update(token, |state| {
                    let had_session = state.session.is_some();
                    state.sign_out();
                    had_session
                });
                if signed_out == Some(true) {
                    let cleared = self.cache.invalidate(None, None);
                    info!(cleared, "Signed out; menu cache cleared");
                }
                return;
            }
        };

        let session = Session::for_user(user);
        let fresh = self.cache.get(&session.context, &session.user_id);
        let fallback = match fresh {
            Some(_) => None,
            None => self.cache.get_any(&session.context, &session.user_id),
        };
        let hit = fresh.is_some();

        let entered = self.update(token, |state| {
            state.enter_session(session.clone());
            if let Some(cached) = fresh {
                debug!(context = %session.context, "Menu cache hit");
                state.publish(cached);
                return;
            }
            if state.tree.is_none() {
                if let Some(stale) = fallback {
                    state.tree = Some(stale.payload.tree);
                    state.last_fetch = Some(stale.fetched_at);
                    state.permissions = stale.payload.permissions;
                    state.echoed_context = stale.payload.echoed_context;
                }
            }
            state.loading = true;
        });
        if entered.is_none() || hit {
            return;
        }

        self.settle.wait().await;
        if !self.is_latest(token) {
            debug!(token, "Superseded during settle window; skipping fetch");
            return;
        }
        self.fetch(&session, token).await;
    }

    async fn refresh_session(&self, token: u64) {
        let session = self
            .update(token, |state| {
                state.loading = state.session.is_some();
                state.session.clone()
            })
            .flatten();
        match session {
            Some(session) => self.fetch(&session, token).await,
            None => debug!("Refresh requested without a session"),
        }
    }

    async fn fetch(&self, session: &Session, token: u64) {
        let flight = self.cache.join_or_start(&session.context, &session.user_id, || {
            guard_fetch(
                self.fetcher
                    .fetch_owned(session.user_id.clone(), session.context),
            )
        });
        let result = flight.future.await;
        self.cache
            .finish_flight(&session.context, &session.user_id, flight.id);
        self.complete(session, token, result);
    }

    fn complete(&self, session: &Session, token: u64, result: Result<MenuPayload>) {
        let mut state = self.lock_state();
        if state.latest_request != token {
            debug!(
                token,
                latest = state.latest_request,
                context = %session.context,
                "Discarding stale menu fetch"
            );
            return;
        }

        match result {
            Ok(payload) => {
                let fetched_at = self
                    .cache
                    .set(&session.context, &session.user_id, payload.clone());
                state.publish(CachedMenu {
                    payload,
                    fetched_at,
                });
            }
            Err(err) => {
                warn!(
                    error = %err,
                    context = %session.context,
                    keeping_tree = state.tree.is_some() && err.is_fetch_failure(),
                    "Menu fetch failed"
                );
                state.fail(err);
            }
        }
    }

    async fn contained<F>(&self, token: u64, work: F)
    where
        F: Future<Output = ()>,
    {
        if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
            let message = panic_message(panic.as_ref());
            error!(error = %message, "Menu pipeline panicked");
            self.update(token, |state| {
                state.fail(MenuError::internal(message));
                state.tree = None;
            });
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // State helpers
    // ─────────────────────────────────────────────────────────────────────────────

    fn begin_request(&self) -> u64 {
        let mut state = self.lock_state();
        state.latest_request += 1;
        state.latest_request
    }

    fn current_session(&self) -> Option<Session> {
        self.lock_state().session.clone()
    }

    /// Current session, and whether a failed fetch left it without a tree.
    fn visibility_state(&self) -> Option<(Session, bool)> {
        let state = self.lock_state();
        let session = state.session.clone()?;
        let degraded =
            state.tree.is_none() && state.error.as_ref().is_some_and(MenuError::is_fetch_failure);
        Some((session, degraded))
    }

    fn is_latest(&self, token: u64) -> bool {
        self.lock_state().latest_request == token
    }

    /// Applies `f` only if `token` is still the latest request.
    fn update<R>(&self, token: u64, f: impl FnOnce(&mut EngineState) -> R) -> Option<R> {
        let mut state = self.lock_state();
        if state.latest_request != token {
            return None;
        }
        Some(f(&mut state))
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a panicking fetch from poisoning the shared future every joiner awaits.
fn guard_fetch(fetch: BoxFuture<'static, Result<MenuPayload>>) -> BoxFuture<'static, Result<MenuPayload>> {
    AssertUnwindSafe(fetch)
        .catch_unwind()
        .map(|outcome| {
            outcome.unwrap_or_else(|panic| Err(MenuError::internal(panic_message(panic.as_ref()))))
        })
        .boxed()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
