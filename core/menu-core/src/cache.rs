//! Session-scoped menu cache keyed by (context, user).
//!
//! Entries are fresh while `now - fetched_at < ttl`. Freshness is evaluated
//! against the injected [`Clock`], never the wall clock directly.
//!
//! The cache also owns the single-flight bookkeeping: while a fetch for a
//! key is in flight, every other request for that key joins the same shared
//! future instead of starting its own.
//!
//! Locking: one mutex over the entry map, held only for short map
//! operations and never across an await.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::clock::Clock;
use crate::error::Result;
use crate::tree::MenuTree;
use crate::types::{Context, ContextEcho};

/// A validated fetch result, as stored in the cache.
#[derive(Debug, Clone)]
pub struct MenuPayload {
    pub tree: Arc<MenuTree>,
    pub permissions: Vec<String>,
    pub echoed_context: Option<ContextEcho>,
}

pub type SharedFetch = Shared<BoxFuture<'static, Result<MenuPayload>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub context: Context,
    pub user_id: String,
}

impl CacheKey {
    pub fn new(context: Context, user_id: &str) -> Self {
        Self {
            context,
            user_id: user_id.to_string(),
        }
    }
}

/// A cached tree together with when it was fetched.
#[derive(Debug, Clone)]
pub struct CachedMenu {
    pub payload: MenuPayload,
    pub fetched_at: DateTime<Utc>,
}

/// Handle on an in-flight fetch. `joined` is true when another caller started it.
pub struct Flight {
    pub id: u64,
    pub future: SharedFetch,
    pub joined: bool,
}

struct InFlight {
    id: u64,
    future: SharedFetch,
}

#[derive(Default)]
struct CacheEntry {
    cached: Option<CachedMenu>,
    in_flight: Option<InFlight>,
}

pub struct MenuCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    next_flight: AtomicU64,
}

impl std::fmt::Debug for MenuCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.len())
            .finish()
    }
}

impl MenuCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
            next_flight: AtomicU64::new(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh entry only.
    pub fn get(&self, context: &Context, user_id: &str) -> Option<CachedMenu> {
        let now = self.clock.now();
        let entries = self.lock_entries();
        entries
            .get(&CacheKey::new(*context, user_id))
            .and_then(|entry| entry.cached.as_ref())
            .filter(|cached| now - cached.fetched_at < self.ttl)
            .cloned()
    }

    /// Last stored entry regardless of age.
    pub fn get_any(&self, context: &Context, user_id: &str) -> Option<CachedMenu> {
        self.lock_entries()
            .get(&CacheKey::new(*context, user_id))
            .and_then(|entry| entry.cached.clone())
    }

    pub fn age(&self, context: &Context, user_id: &str) -> Option<Duration> {
        let now = self.clock.now();
        self.lock_entries()
            .get(&CacheKey::new(*context, user_id))
            .and_then(|entry| entry.cached.as_ref())
            .map(|cached| now - cached.fetched_at)
    }

    /// An entry exists, is older than the TTL, and nothing is refreshing it yet.
    pub fn needs_refresh(&self, context: &Context, user_id: &str) -> bool {
        let now = self.clock.now();
        self.lock_entries()
            .get(&CacheKey::new(*context, user_id))
            .is_some_and(|entry| {
                entry.in_flight.is_none()
                    && entry
                        .cached
                        .as_ref()
                        .is_some_and(|cached| now - cached.fetched_at > self.ttl)
            })
    }

    /// Stores `payload` and returns the `fetched_at` stamp it was given.
    pub fn set(&self, context: &Context, user_id: &str, payload: MenuPayload) -> DateTime<Utc> {
        let fetched_at = self.clock.now();
        let mut entries = self.lock_entries();
        let entry = entries.entry(CacheKey::new(*context, user_id)).or_default();
        entry.cached = Some(CachedMenu {
            payload,
            fetched_at,
        });
        fetched_at
    }

    /// Drops cached trees matching the filters; `None` matches anything.
    /// In-flight markers survive so coalescing keeps working.
    pub fn invalidate(&self, context: Option<&Context>, user_id: Option<&str>) -> usize {
        let mut entries = self.lock_entries();
        let mut cleared = 0;
        entries.retain(|key, entry| {
            let matches = context.map_or(true, |c| key.context == *c)
                && user_id.map_or(true, |u| key.user_id == u);
            if !matches {
                return true;
            }
            if entry.cached.take().is_some() {
                cleared += 1;
            }
            entry.in_flight.is_some()
        });
        debug!(cleared, "Menu cache invalidated");
        cleared
    }

    /// Joins the in-flight fetch for the key, or starts one with `start`.
    pub fn join_or_start<F>(&self, context: &Context, user_id: &str, start: F) -> Flight
    where
        F: FnOnce() -> BoxFuture<'static, Result<MenuPayload>>,
    {
        let mut entries = self.lock_entries();
        let entry = entries.entry(CacheKey::new(*context, user_id)).or_default();

        if let Some(in_flight) = &entry.in_flight {
            debug!(context = %context, user_id, flight = in_flight.id, "Joining in-flight menu fetch");
            return Flight {
                id: in_flight.id,
                future: in_flight.future.clone(),
                joined: true,
            };
        }

        let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let future = start().shared();
        entry.in_flight = Some(InFlight {
            id,
            future: future.clone(),
        });
        Flight {
            id,
            future,
            joined: false,
        }
    }

    /// Clears the in-flight marker if it still belongs to `flight_id`.
    pub fn finish_flight(&self, context: &Context, user_id: &str, flight_id: u64) {
        let mut entries = self.lock_entries();
        let key = CacheKey::new(*context, user_id);
        let Some(entry) = entries.get_mut(&key) else {
            return;
        };
        if entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.id == flight_id)
        {
            entry.in_flight = None;
        }
        if entry.cached.is_none() && entry.in_flight.is_none() {
            entries.remove(&key);
        }
    }

    pub fn is_in_flight(&self, context: &Context, user_id: &str) -> bool {
        self.lock_entries()
            .get(&CacheKey::new(*context, user_id))
            .is_some_and(|entry| entry.in_flight.is_some())
    }

    /// Number of keys holding a cached tree.
    pub fn len(&self) -> usize {
        self.lock_entries()
            .values()
            .filter(|entry| entry.cached.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        // Recover from poisoning - a panicked writer leaves at worst a stale entry
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::MenuError;
    use crate::tree::test_support::leaf;
    use crate::types::ContextType;
    use std::sync::atomic::AtomicUsize;

    fn payload(ids: &[i64]) -> MenuPayload {
        let nodes = ids
            .iter()
            .map(|&id| leaf(id, &format!("/item-{}", id), id as i32))
            .collect();
        MenuPayload {
            tree: Arc::new(MenuTree::new(nodes).unwrap()),
            permissions: vec!["menu.view".to_string()],
            echoed_context: None,
        }
    }

    fn cache() -> (MenuCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MenuCache::new(Duration::minutes(5), clock.clone()), clock)
    }

    fn company(id: i64) -> Context {
        Context::new(ContextType::Company, Some(id))
    }

    #[test]
    fn fresh_entry_is_returned_until_ttl() {
        let (cache, clock) = cache();
        cache.set(&company(42), "7", payload(&[1, 2]));

        clock.advance(Duration::minutes(4));
        let first = cache.get(&company(42), "7").expect("fresh");
        let second = cache.get(&company(42), "7").expect("still fresh");
        assert!(Arc::ptr_eq(&first.payload.tree, &second.payload.tree));
        assert_eq!(first.fetched_at, second.fetched_at);

        clock.advance(Duration::minutes(1));
        assert!(cache.get(&company(42), "7").is_none());
        assert!(cache.get_any(&company(42), "7").is_some());
    }

    #[test]
    fn keys_include_user_and_context() {
        let (cache, _clock) = cache();
        cache.set(&company(42), "7", payload(&[1]));

        assert!(cache.get(&company(43), "7").is_none());
        assert!(cache.get(&company(42), "8").is_none());
        assert!(cache
            .get(&Context::new(ContextType::Establishment, Some(42)), "7")
            .is_none());
    }

    #[test]
    fn invalidate_filters() {
        let (cache, _clock) = cache();
        cache.set(&company(1), "7", payload(&[1]));
        cache.set(&company(2), "7", payload(&[1]));
        cache.set(&company(1), "8", payload(&[1]));

        assert_eq!(cache.invalidate(Some(&company(1)), Some("7")), 1);
        assert!(cache.get(&company(1), "7").is_none());
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate(None, Some("7")), 1);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.invalidate(None, None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn needs_refresh_only_after_ttl() {
        let (cache, clock) = cache();
        assert!(!cache.needs_refresh(&company(1), "7"));

        cache.set(&company(1), "7", payload(&[1]));
        clock.advance(Duration::minutes(5));
        assert!(!cache.needs_refresh(&company(1), "7"));

        clock.advance(Duration::seconds(1));
        assert!(cache.needs_refresh(&company(1), "7"));
        assert_eq!(
            cache.age(&company(1), "7"),
            Some(Duration::minutes(5) + Duration::seconds(1))
        );
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_fetch() {
        let (cache, _clock) = cache();
        let starts = Arc::new(AtomicUsize::new(0));

        let start = || {
            let starts = starts.clone();
            move || {
                starts.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, MenuError>(payload(&[1, 2, 3])) }.boxed()
            }
        };

        let first = cache.join_or_start(&company(1), "7", start());
        let second = cache.join_or_start(&company(1), "7", start());
        assert!(!first.joined);
        assert!(second.joined);
        assert_eq!(first.id, second.id);
        assert!(cache.is_in_flight(&company(1), "7"));

        let (a, b) = futures::join!(first.future, second.future);
        assert!(Arc::ptr_eq(&a.unwrap().tree, &b.unwrap().tree));
        assert_eq!(starts.load(Ordering::SeqCst), 1);

        cache.finish_flight(&company(1), "7", first.id);
        assert!(!cache.is_in_flight(&company(1), "7"));

        let third = cache.join_or_start(&company(1), "7", start());
        assert!(!third.joined);
        assert_ne!(third.id, first.id);
        let _ = third.future.await;
        assert_eq!(starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn finish_ignores_foreign_flight_ids() {
        let (cache, _clock) = cache();
        let flight =
            cache.join_or_start(&company(1), "7", || async { Ok(payload(&[1])) }.boxed());

        cache.finish_flight(&company(1), "7", flight.id + 100);
        assert!(cache.is_in_flight(&company(1), "7"));

        cache.finish_flight(&company(1), "7", flight.id);
        assert!(!cache.is_in_flight(&company(1), "7"));
    }

    #[test]
    fn invalidate_keeps_in_flight_marker() {
        let (cache, _clock) = cache();
        cache.set(&company(1), "7", payload(&[1]));
        let _flight =
            cache.join_or_start(&company(1), "7", || async { Ok(payload(&[2])) }.boxed());

        cache.invalidate(None, None);
        assert!(cache.get_any(&company(1), "7").is_none());
        assert!(cache.is_in_flight(&company(1), "7"));
    }
}
