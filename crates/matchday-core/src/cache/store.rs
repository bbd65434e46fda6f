use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::resource::{
    FixturesResource, NewsResource, Resource, ResourceKind, ResultsResource, StandingsResource,
};
use crate::api::{FetchError, FetchResponse, Fetcher};
use crate::config::Config;
use crate::models::{FixtureList, LeagueTable, NewsFeed, ResultList};
use crate::transport::{InboundFrame, ListenerHandle, MessageKind, Session};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Bypass the TTL and any in-flight request.
    pub force: bool,
}

impl FetchOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// How an `ensure_fresh` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Entry was within its TTL; no request made.
    Hit,
    /// The response body was committed.
    Updated,
    /// Server confirmed the cached data; only the fetch time moved.
    NotModified,
    /// The response arrived after a newer write and was discarded.
    Superseded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to refresh {kind} '{key}': {source}")]
pub struct ResourceError {
    pub kind: ResourceKind,
    pub key: String,
    #[source]
    pub source: FetchError,
}

type SharedFetch = Shared<BoxFuture<'static, Result<FetchOutcome, ResourceError>>>;

struct InFlight {
    seq: u64,
    fetch: SharedFetch,
}

struct Slot<T> {
    entry: CacheEntry<T>,
    in_flight: Option<InFlight>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entry: CacheEntry::default(),
            in_flight: None,
        }
    }
}

struct Slots<T> {
    next_seq: u64,
    slots: HashMap<String, Slot<T>>,
}

enum Plan {
    Hit,
    Join(SharedFetch),
    Start(SharedFetch),
}

enum Fetched<T> {
    NotModified,
    Fresh { data: T, validator: Option<String> },
}

/// Entries of one resource kind, keyed by resource key.
pub struct ResourceCache<R: Resource> {
    fetcher: Arc<dyn Fetcher>,
    ttl: Duration,
    conditional: bool,
    state: Mutex<Slots<R::Data>>,
    _resource: PhantomData<fn() -> R>,
}

impl<R: Resource> ResourceCache<R> {
    pub fn new(fetcher: Arc<dyn Fetcher>, ttl: Duration, conditional: bool) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            ttl,
            conditional,
            state: Mutex::new(Slots {
                next_seq: 0,
                slots: HashMap::new(),
            }),
            _resource: PhantomData,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slots<R::Data>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Make sure `key` holds data no older than the TTL.
    ///
    /// Concurrent callers for the same key share one request and its
    /// outcome. The request runs to completion even if every caller stops
    /// waiting.
    pub async fn ensure_fresh(
        self: &Arc<Self>,
        key: &str,
        opts: FetchOptions,
    ) -> Result<FetchOutcome, ResourceError> {
        let plan = {
            let mut st = self.lock();
            let Slots { next_seq, slots } = &mut *st;
            let slot = slots.entry(key.to_string()).or_default();

            let joined = if opts.force {
                None
            } else {
                slot.in_flight.as_ref().map(|f| f.fetch.clone())
            };

            if let Some(fetch) = joined {
                debug!(kind = R::KIND.as_str(), key, "Joining in-flight fetch");
                Plan::Join(fetch)
            } else if !opts.force && slot.entry.is_fresh(Instant::now(), self.ttl) {
                Plan::Hit
            } else {
                *next_seq += 1;
                let seq = *next_seq;
                let validator = if self.conditional {
                    slot.entry.validator.clone()
                } else {
                    None
                };
                let fetch = Arc::clone(self)
                    .run_fetch(key.to_string(), seq, validator)
                    .boxed()
                    .shared();
                slot.in_flight = Some(InFlight {
                    seq,
                    fetch: fetch.clone(),
                });
                Plan::Start(fetch)
            }
        };

        match plan {
            Plan::Hit => Ok(FetchOutcome::Hit),
            Plan::Join(fetch) => fetch.await,
            Plan::Start(fetch) => {
                tokio::spawn(fetch.clone());
                fetch.await
            }
        }
    }

    async fn run_fetch(
        self: Arc<Self>,
        key: String,
        seq: u64,
        validator: Option<String>,
    ) -> Result<FetchOutcome, ResourceError> {
        debug!(kind = R::KIND.as_str(), key = %key, seq, conditional = validator.is_some(), "Fetching");
        let result = match self.fetch_once(&key, validator.as_deref()).await {
            Ok(Fetched::NotModified) if !self.has_data(&key) => {
                debug!(kind = R::KIND.as_str(), key = %key, "Not modified without cached data, retrying");
                match self.fetch_once(&key, None).await {
                    Ok(Fetched::NotModified) => Err(FetchError::InvalidResponse(
                        "Not modified for an unconditional request".to_string(),
                    )),
                    other => other,
                }
            }
            other => other,
        };
        self.settle(&key, seq, result)
    }

    async fn fetch_once(
        &self,
        key: &str,
        validator: Option<&str>,
    ) -> Result<Fetched<R::Data>, FetchError> {
        match self.fetcher.fetch(&R::path(key), validator).await? {
            FetchResponse::NotModified => Ok(Fetched::NotModified),
            FetchResponse::Modified { data, validator } => {
                let data: R::Data = serde_json::from_value(data).map_err(|e| {
                    FetchError::InvalidResponse(format!("Malformed {} body: {}", R::KIND, e))
                })?;
                if !R::validate(&data) {
                    return Err(FetchError::InvalidResponse(format!(
                        "Invalid {} body",
                        R::KIND
                    )));
                }
                Ok(Fetched::Fresh { data, validator })
            }
        }
    }

    fn has_data(&self, key: &str) -> bool {
        self.lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.entry.has_data())
    }

    /// Apply a finished request to the entry and release its in-flight slot.
    fn settle(
        &self,
        key: &str,
        seq: u64,
        result: Result<Fetched<R::Data>, FetchError>,
    ) -> Result<FetchOutcome, ResourceError> {
        let mut st = self.lock();
        let slot = st.slots.entry(key.to_string()).or_default();
        if slot.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
            slot.in_flight = None;
        }

        match result {
            Err(source) => {
                warn!(kind = R::KIND.as_str(), key, error = %source, "Fetch failed, keeping cached entry");
                Err(ResourceError {
                    kind: R::KIND,
                    key: key.to_string(),
                    source,
                })
            }
            Ok(Fetched::NotModified) => {
                slot.entry.fetched_at = Some(Instant::now());
                debug!(kind = R::KIND.as_str(), key, "Not modified");
                Ok(FetchOutcome::NotModified)
            }
            Ok(Fetched::Fresh { data, validator }) => {
                slot.entry.fetched_at = Some(Instant::now());
                if slot.entry.write_seq > seq {
                    debug!(
                        kind = R::KIND.as_str(),
                        key,
                        seq,
                        newer = slot.entry.write_seq,
                        "Discarding response older than the cached write"
                    );
                    return Ok(FetchOutcome::Superseded);
                }
                slot.entry.data = Some(data);
                slot.entry.validator = validator;
                slot.entry.updated_at = Some(Utc::now());
                slot.entry.write_seq = seq;
                Ok(FetchOutcome::Updated)
            }
        }
    }

    /// Overwrite the entry with pushed data.
    pub fn apply_replace(&self, payload: &Value, topic: Option<&str>) -> anyhow::Result<()> {
        let key = R::push_key(payload, topic)
            .with_context(|| format!("{} push without a key", R::KIND))?;
        let data = R::push_data(payload)
            .with_context(|| format!("Malformed {} push for '{}'", R::KIND, key))?;

        let mut st = self.lock();
        st.next_seq += 1;
        let seq = st.next_seq;
        let slot = st.slots.entry(key.clone()).or_default();
        slot.entry.data = Some(data);
        // The pushed data no longer matches any server version we know.
        slot.entry.validator = None;
        slot.entry.fetched_at = Some(Instant::now());
        slot.entry.updated_at = Some(Utc::now());
        slot.entry.write_seq = seq;
        debug!(kind = R::KIND.as_str(), key = %key, seq, "Applied pushed replacement");
        Ok(())
    }

    /// Drop one item from the entry's collection, if present.
    pub fn apply_remove(&self, payload: &Value, topic: Option<&str>) -> anyhow::Result<()> {
        let key = R::push_key(payload, topic)
            .with_context(|| format!("{} removal without a key", R::KIND))?;
        let id = R::push_item_id(payload)
            .with_context(|| format!("{} removal for '{}' without an item id", R::KIND, key))?;

        let mut st = self.lock();
        let Slots { next_seq, slots } = &mut *st;
        let Some(slot) = slots.get_mut(&key) else {
            debug!(kind = R::KIND.as_str(), key = %key, "Removal for an uncached entry");
            return Ok(());
        };
        let Some(data) = slot.entry.data.as_mut() else {
            return Ok(());
        };
        if R::remove_item(data, &id) {
            *next_seq += 1;
            slot.entry.write_seq = *next_seq;
            slot.entry.updated_at = Some(Utc::now());
            debug!(kind = R::KIND.as_str(), key = %key, id = %id, "Removed pushed item");
        } else {
            debug!(kind = R::KIND.as_str(), key = %key, id = %id, "Removal for an unknown item");
        }
        Ok(())
    }

    /// Route a push frame for this kind. Frames for other kinds are ignored.
    pub fn apply_realtime_patch(&self, frame: &InboundFrame) -> anyhow::Result<()> {
        let topic = frame.topic.as_deref();
        match &frame.kind {
            MessageKind::Replace(kind) if *kind == R::KIND => self.apply_replace(&frame.payload, topic),
            MessageKind::Remove(kind) if *kind == R::KIND => self.apply_remove(&frame.payload, topic),
            _ => Ok(()),
        }
    }

    /// Register this cache's push handlers on the session.
    pub fn attach(self: &Arc<Self>, session: &Session) -> Vec<ListenerHandle> {
        [MessageKind::Replace(R::KIND), MessageKind::Remove(R::KIND)]
            .into_iter()
            .map(|kind| {
                let cache = Arc::clone(self);
                session.on(kind, move |frame| cache.apply_realtime_patch(frame))
            })
            .collect()
    }

    /// Snapshot of the entry, if it holds data.
    pub fn get_cached(&self, key: &str) -> Option<CacheEntry<R::Data>> {
        self.lock()
            .slots
            .get(key)
            .filter(|slot| slot.entry.has_data())
            .map(|slot| slot.entry.clone())
    }

    pub fn is_stale(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .slots
            .get(key)
            .map_or(true, |slot| !slot.entry.is_fresh(now, self.ttl))
    }

    /// Whether any entry holding data is past its TTL.
    pub fn any_stale(&self) -> bool {
        let now = Instant::now();
        self.lock()
            .slots
            .values()
            .any(|slot| slot.entry.has_data() && !slot.entry.is_fresh(now, self.ttl))
    }

    pub fn age_display(&self, key: &str) -> Option<String> {
        self.lock()
            .slots
            .get(key)
            .filter(|slot| slot.entry.has_data())
            .map(|slot| slot.entry.age_display())
    }
}

// ============================================================================
// Store facade
// ============================================================================

/// A cached entry of any kind.
#[derive(Debug, Clone)]
pub enum CachedResource {
    News(CacheEntry<NewsFeed>),
    Standings(CacheEntry<LeagueTable>),
    Fixtures(CacheEntry<FixtureList>),
    Results(CacheEntry<ResultList>),
}

impl CachedResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            CachedResource::News(_) => ResourceKind::News,
            CachedResource::Standings(_) => ResourceKind::Standings,
            CachedResource::Fixtures(_) => ResourceKind::Fixtures,
            CachedResource::Results(_) => ResourceKind::Results,
        }
    }

    pub fn validator(&self) -> Option<&str> {
        match self {
            CachedResource::News(e) => e.validator.as_deref(),
            CachedResource::Standings(e) => e.validator.as_deref(),
            CachedResource::Fixtures(e) => e.validator.as_deref(),
            CachedResource::Results(e) => e.validator.as_deref(),
        }
    }

    pub fn age_display(&self) -> String {
        match self {
            CachedResource::News(e) => e.age_display(),
            CachedResource::Standings(e) => e.age_display(),
            CachedResource::Fixtures(e) => e.age_display(),
            CachedResource::Results(e) => e.age_display(),
        }
    }
}

/// Age of each season resource, for a "last updated" line.
#[derive(Debug, Clone, Default)]
pub struct CacheAges {
    pub news: Option<String>,
    pub standings: Option<String>,
    pub fixtures: Option<String>,
    pub results: Option<String>,
}

impl CacheAges {
    pub fn standings_age(&self) -> String {
        self.standings.clone().unwrap_or_else(|| "never".to_string())
    }

    pub fn last_updated(&self) -> String {
        [&self.standings, &self.results, &self.fixtures, &self.news]
            .into_iter()
            .flatten()
            .next()
            .cloned()
            .unwrap_or_else(|| "never".to_string())
    }
}

/// One cache per resource kind, fed by REST fetches and session pushes.
pub struct CacheStore {
    session: Session,
    news: Arc<ResourceCache<NewsResource>>,
    standings: Arc<ResourceCache<StandingsResource>>,
    fixtures: Arc<ResourceCache<FixturesResource>>,
    results: Arc<ResourceCache<ResultsResource>>,
    listeners: Vec<ListenerHandle>,
}

impl CacheStore {
    pub fn new(config: &Config, fetcher: Arc<dyn Fetcher>, session: Session) -> Self {
        let conditional = config.api.validators_enabled();
        if config.api.conditional_requests && !conditional {
            debug!("API origin differs from page origin, conditional requests disabled");
        }
        let ttl = |kind| config.cache.ttl_for(kind);

        let news = ResourceCache::new(Arc::clone(&fetcher), ttl(ResourceKind::News), conditional);
        let standings =
            ResourceCache::new(Arc::clone(&fetcher), ttl(ResourceKind::Standings), conditional);
        let fixtures =
            ResourceCache::new(Arc::clone(&fetcher), ttl(ResourceKind::Fixtures), conditional);
        let results = ResourceCache::new(fetcher, ttl(ResourceKind::Results), conditional);

        let mut listeners = news.attach(&session);
        listeners.extend(standings.attach(&session));
        listeners.extend(fixtures.attach(&session));
        listeners.extend(results.attach(&session));

        Self {
            session,
            news,
            standings,
            fixtures,
            results,
            listeners,
        }
    }

    pub async fn ensure_fresh(
        &self,
        kind: ResourceKind,
        key: &str,
        opts: FetchOptions,
    ) -> Result<FetchOutcome, ResourceError> {
        match kind {
            ResourceKind::News => self.news.ensure_fresh(key, opts).await,
            ResourceKind::Standings => self.standings.ensure_fresh(key, opts).await,
            ResourceKind::Fixtures => self.fixtures.ensure_fresh(key, opts).await,
            ResourceKind::Results => self.results.ensure_fresh(key, opts).await,
        }
    }

    pub fn get_cached(&self, kind: ResourceKind, key: &str) -> Option<CachedResource> {
        match kind {
            ResourceKind::News => self.news.get_cached(key).map(CachedResource::News),
            ResourceKind::Standings => self.standings.get_cached(key).map(CachedResource::Standings),
            ResourceKind::Fixtures => self.fixtures.get_cached(key).map(CachedResource::Fixtures),
            ResourceKind::Results => self.results.get_cached(key).map(CachedResource::Results),
        }
    }

    pub fn news(&self) -> &Arc<ResourceCache<NewsResource>> {
        &self.news
    }

    pub fn standings(&self) -> &Arc<ResourceCache<StandingsResource>> {
        &self.standings
    }

    pub fn fixtures(&self) -> &Arc<ResourceCache<FixturesResource>> {
        &self.fixtures
    }

    pub fn results(&self) -> &Arc<ResourceCache<ResultsResource>> {
        &self.results
    }

    fn topic(kind: ResourceKind, key: &str) -> String {
        match kind {
            ResourceKind::News => NewsResource::topic(key),
            ResourceKind::Standings => StandingsResource::topic(key),
            ResourceKind::Fixtures => FixturesResource::topic(key),
            ResourceKind::Results => ResultsResource::topic(key),
        }
    }

    /// Ask the session for live updates to one resource.
    pub fn watch(&self, kind: ResourceKind, key: &str) {
        self.session.subscribe(&Self::topic(kind, key));
    }

    pub fn unwatch(&self, kind: ResourceKind, key: &str) {
        self.session.unsubscribe(&Self::topic(kind, key));
    }

    pub fn is_stale(&self, kind: ResourceKind, key: &str) -> bool {
        match kind {
            ResourceKind::News => self.news.is_stale(key),
            ResourceKind::Standings => self.standings.is_stale(key),
            ResourceKind::Fixtures => self.fixtures.is_stale(key),
            ResourceKind::Results => self.results.is_stale(key),
        }
    }

    /// Check if any cached entry is past its TTL
    pub fn any_stale(&self) -> bool {
        self.news.any_stale()
            || self.standings.any_stale()
            || self.fixtures.any_stale()
            || self.results.any_stale()
    }

    pub fn ages(&self, season: &str) -> CacheAges {
        CacheAges {
            news: self.news.age_display(NewsResource::DEFAULT_FEED),
            standings: self.standings.age_display(season),
            fixtures: self.fixtures.age_display(season),
            results: self.results.age_display(season),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        for handle in self.listeners.drain(..) {
            handle.unregister();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
