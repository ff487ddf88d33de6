//! # menu-core
//!
//! Core library for the admin navigation menu: resolves the operating context
//! from the signed-in user, fetches the permission-filtered menu tree, caches
//! it per (context, user), and models the sidebar the host UI draws.
//!
//! ## Design Principles
//!
//! - **Async at the edges only**: fetching and the first-fetch settle window
//!   suspend; everything else (context, tree, toggles) is synchronous and pure.
//! - **Latest request wins**: a response for a superseded request is dropped,
//!   never rendered.
//! - **Graceful degradation**: a failed refresh keeps the last tree on screen;
//!   with nothing to show, the sidebar gets a labeled retry state, never a
//!   blank region.
//! - **Injected time**: cache freshness and toggle cooldowns read a [`Clock`],
//!   so tests move time explicitly.
//! - **Session-local**: neither the cache nor expansion state is persisted.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use menu_core::{AuthSnapshot, HttpMenuQuery, MenuEngine, SidebarModel};
//!
//! let config = menu_core::load_menu_config(None)?;
//! let query = HttpMenuQuery::new(&config.endpoint)?;
//! let engine = MenuEngine::new(config.clone(), Arc::new(query));
//!
//! engine.sync(&auth).await;
//! let mut sidebar = SidebarModel::new(capabilities, &config, engine.clock());
//! if let Some(tree) = engine.tree() {
//!     sidebar.replace_tree(tree);
//! }
//! let rows = sidebar.rows();
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod degraded;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod fetcher;
pub mod sidebar;
pub mod toggle;
pub mod tree;
pub mod types;

pub use cache::{CacheKey, CachedMenu, MenuCache, MenuPayload};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use context::{context_type_from_hint, resolve_context};
pub use degraded::{menu_view, MenuView, Notice};
pub use engine::MenuEngine;
pub use error::{MenuError, Result};
pub use expansion::ExpansionState;
pub use fetcher::{HttpMenuQuery, MenuFetcher, MenuQuery, SettleGate};
pub use sidebar::SidebarModel;
pub use toggle::{
    DeviceCapabilities, DeviceClass, ToggleController, ToggleOutcome, ToggleSource, ToggleState,
    ToggleStrategy,
};
pub use tree::{normalize_location, MenuRow, MenuTree, TreeNode};
pub use types::*;
