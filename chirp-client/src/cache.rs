//! The query cache: one entry per (procedure, input) pair.
//!
//! Every entry is published through a [`watch`] channel. Subscribing hands out a
//! receiver, so the number of observers of an entry is its receiver count and
//! unmounting a view is simply dropping its receiver.
//!
//! Fetching is driven from outside the cache. Whenever an entry needs data the
//! cache hands out a [`FetchTicket`]; the holder performs the request and passes
//! the result back to [`QueryCache::complete`]. Only one ticket per entry is
//! outstanding at any time.

use chirp_common::{error::RpcError, procedure::QueryKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap, btree_map},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryStatus {
    Idle,
    Loading,
    Error,
    Success,
}

impl QueryStatus {
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, QueryStatus::Success | QueryStatus::Error)
    }
}

/// The state of one cached query as observers see it.
///
/// `data` survives a refetch and a failed refetch, so a view may keep showing it
/// while `status` says otherwise.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CacheEntry<T> {
    pub key: QueryKey,
    pub data: Option<T>,
    pub status: QueryStatus,
    pub error: Option<RpcError>,
    /// When the entry last settled. `None` until it has.
    pub updated_at: Option<OffsetDateTime>,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn idle(key: QueryKey) -> Self {
        Self {
            key,
            data: None,
            status: QueryStatus::Idle,
            error: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn success(key: QueryKey, data: T) -> Self {
        Self {
            key,
            data: Some(data),
            status: QueryStatus::Success,
            error: None,
            updated_at: Some(OffsetDateTime::now_utc()),
        }
    }

    #[must_use]
    pub fn failure(key: QueryKey, error: RpcError) -> Self {
        Self {
            key,
            data: None,
            status: QueryStatus::Error,
            error: Some(error),
            updated_at: Some(OffsetDateTime::now_utc()),
        }
    }
}

impl CacheEntry<Value> {
    /// Decodes the cached JSON into the procedure's output type.
    ///
    /// Data that does not decode turns the entry into an error entry.
    #[must_use]
    pub fn decode<T: DeserializeOwned>(&self) -> CacheEntry<T> {
        match self.data.clone().map(serde_json::from_value).transpose() {
            Ok(data) => CacheEntry {
                key: self.key.clone(),
                data,
                status: self.status,
                error: self.error.clone(),
                updated_at: self.updated_at,
            },
            Err(err) => {
                warn!(key = %self.key, error = %err, "Cached data did not decode");
                CacheEntry::failure(
                    self.key.clone(),
                    RpcError::unknown(format!("Could not decode response: {err}")),
                )
            }
        }
    }
}

/// Permission to fetch one entry. Hand it back through [`QueryCache::complete`].
#[derive(Debug)]
#[must_use]
pub struct FetchTicket {
    key: QueryKey,
    generation: u64,
}

impl FetchTicket {
    #[must_use]
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

#[derive(Debug)]
struct Slot {
    state: watch::Sender<CacheEntry<Value>>,
    // Bumped by invalidation; results fetched under an older generation are stale.
    generation: u64,
    in_flight: bool,
    stale: bool,
    invalidated_at: Option<OffsetDateTime>,
}

impl Slot {
    fn new(entry: CacheEntry<Value>) -> Self {
        Self {
            state: watch::channel(entry).0,
            generation: 0,
            in_flight: false,
            stale: false,
            invalidated_at: None,
        }
    }

    fn is_observed(&self) -> bool {
        self.state.receiver_count() > 0
    }

    fn start_fetch(&mut self, key: &QueryKey) -> FetchTicket {
        self.in_flight = true;
        self.state.send_if_modified(|entry| {
            let modified = entry.status != QueryStatus::Loading;
            entry.status = QueryStatus::Loading;
            modified
        });

        FetchTicket {
            key: key.clone(),
            generation: self.generation,
        }
    }
}

/// The client side store of query results. Create one per session and share it.
#[derive(Debug, Default)]
pub struct QueryCache {
    slots: Mutex<HashMap<QueryKey, Slot>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<QueryKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an observer to `key`, creating the entry if needed.
    ///
    /// Returns a ticket if the entry has to be fetched now: it never had data or was
    /// invalidated, and no fetch for it is running.
    pub fn subscribe(
        &self,
        key: &QueryKey,
    ) -> (watch::Receiver<CacheEntry<Value>>, Option<FetchTicket>) {
        let mut slots = self.slots();
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(CacheEntry::idle(key.clone())));

        let receiver = slot.state.subscribe();
        let idle = slot.state.borrow().status == QueryStatus::Idle;
        let ticket = (!slot.in_flight && (idle || slot.stale)).then(|| slot.start_fetch(key));

        debug!(%key, fetching = ticket.is_some(), "Subscribed to query");
        (receiver, ticket)
    }

    /// Applies the result of a fetch.
    ///
    /// Results that were overtaken by an invalidation, or that arrive when nobody
    /// observes the entry any more, are discarded without touching the entry. If
    /// the entry still needs fresh data a follow up ticket is returned.
    pub fn complete(
        &self,
        ticket: FetchTicket,
        result: Result<Value, RpcError>,
    ) -> Option<FetchTicket> {
        let mut slots = self.slots();
        let Some(slot) = slots.get_mut(&ticket.key) else {
            debug!(key = %ticket.key, "Dropping result for evicted query");
            return None;
        };
        slot.in_flight = false;

        if ticket.generation != slot.generation {
            if slot.stale && slot.is_observed() {
                debug!(key = %ticket.key, "Result was invalidated in flight, fetching again");
                return Some(slot.start_fetch(&ticket.key));
            }
            debug!(key = %ticket.key, "Discarding superseded result");
            return None;
        }

        if !slot.is_observed() {
            debug!(key = %ticket.key, "Discarding result nobody observes");
            slot.stale = true;
            return None;
        }

        slot.stale = false;
        slot.state.send_modify(|entry| {
            entry.updated_at = Some(OffsetDateTime::now_utc());
            match result {
                Ok(data) => {
                    entry.data = Some(data);
                    entry.error = None;
                    entry.status = QueryStatus::Success;
                }
                Err(error) => {
                    debug!(key = %ticket.key, %error, "Query failed");
                    entry.error = Some(error);
                    entry.status = QueryStatus::Error;
                }
            }
        });
        None
    }

    /// Marks every entry of `procedure` (only the one with `input`, if given) stale.
    ///
    /// Observed entries switch to loading before this returns; the returned tickets
    /// are the fetches that have to start now. Observed entries with a fetch already
    /// running get a new one once the running fetch returns.
    pub fn invalidate(&self, procedure: &str, input: Option<&Value>) -> Vec<FetchTicket> {
        let mut slots = self.slots();
        let mut matched = 0_usize;
        let mut tickets = Vec::new();

        for (key, slot) in slots
            .iter_mut()
            .filter(|(key, _)| key.matches(procedure, input))
        {
            matched += 1;
            slot.generation += 1;
            slot.stale = true;
            slot.invalidated_at = Some(OffsetDateTime::now_utc());

            if slot.is_observed() && !slot.in_flight {
                tickets.push(slot.start_fetch(key));
            }
        }

        debug!(procedure, matched, refetching = tickets.len(), "Invalidated queries");
        tickets
    }

    /// Stores a settled entry as fresh data.
    ///
    /// An entry is only replaced by a seed that settled after both the entry and its
    /// last invalidation. A refetch started by an invalidation is never cancelled.
    pub fn seed(&self, entry: CacheEntry<Value>) {
        if !entry.status.is_settled() {
            warn!(key = %entry.key, status = ?entry.status, "Refusing to seed an unsettled entry");
            return;
        }

        let mut slots = self.slots();
        if let Some(slot) = slots.get_mut(&entry.key) {
            if slot.stale && slot.in_flight {
                debug!(key = %entry.key, "Query is refetching after an invalidation, ignoring seed");
                return;
            }
            let current = slot.state.borrow().updated_at;
            if !settled_after(entry.updated_at, current)
                || !settled_after(entry.updated_at, slot.invalidated_at)
            {
                debug!(key = %entry.key, "Ignoring seeded data older than the cached entry");
                return;
            }

            if slot.in_flight {
                slot.generation += 1;
            }
            slot.stale = false;
            slot.state.send_replace(entry);
        } else {
            slots.insert(entry.key.clone(), Slot::new(entry));
        }
    }

    #[must_use]
    pub fn entry(&self, key: &QueryKey) -> Option<CacheEntry<Value>> {
        self.slots().get(key).map(|slot| slot.state.borrow().clone())
    }

    #[must_use]
    pub fn observer_count(&self, key: &QueryKey) -> usize {
        self.slots()
            .get(key)
            .map_or(0, |slot| slot.state.receiver_count())
    }

    /// All settled entries. Loading and idle entries are left out.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.slots()
            .values()
            .map(|slot| slot.state.borrow().clone())
            .filter(|entry| entry.status.is_settled())
            .collect()
    }

    pub fn restore(&self, snapshot: CacheSnapshot) {
        for entry in snapshot.into_entries() {
            self.seed(entry);
        }
    }

    /// Drops entries nobody observes and nobody is fetching. Returns how many went.
    pub fn evict_unobserved(&self) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, slot| slot.is_observed() || slot.in_flight);

        before - slots.len()
    }
}

fn settled_after(seeded: Option<OffsetDateTime>, other: Option<OffsetDateTime>) -> bool {
    match (seeded, other) {
        (_, None) => true,
        (Some(seeded), Some(other)) => seeded > other,
        (None, Some(_)) => false,
    }
}

/// A point in time copy of the settled entries of a [`QueryCache`].
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct CacheSnapshot {
    entries: BTreeMap<QueryKey, CacheEntry<Value>>,
}

impl CacheSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: CacheEntry<Value>) -> Option<CacheEntry<Value>> {
        self.entries.insert(entry.key.clone(), entry)
    }

    #[must_use]
    pub fn get(&self, key: &QueryKey) -> Option<&CacheEntry<Value>> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry<Value>> {
        self.entries.values()
    }

    pub fn into_entries(self) -> btree_map::IntoValues<QueryKey, CacheEntry<Value>> {
        self.entries.into_values()
    }
}

impl FromIterator<CacheEntry<Value>> for CacheSnapshot {
    fn from_iter<I: IntoIterator<Item = CacheEntry<Value>>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}
