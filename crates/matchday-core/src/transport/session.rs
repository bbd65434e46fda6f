//! Transport session: the one push socket the process keeps open.
//!
//! The session owns connection lifecycle (`Closed -> Connecting -> Open`),
//! auth gating, the heartbeat, reconnect backoff, and the desired-topic
//! set that is replayed on every successful open. It is constructed once
//! by the composition root and shared by cheap clone.
//!
//! All socket events, timer firings and caller operations mutate one
//! `State` behind a mutex that is never held across an await or while
//! listeners run.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::TransportConfig;

use super::dispatcher::{Dispatcher, ListenerHandle};
use super::frames::{ClientFrame, InboundFrame, MessageKind};
use super::socket::{Connector, SocketEvents, SocketHandle};
use super::topics::TopicRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Point-in-time view of the session for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub has_token: bool,
    pub auth_rejected: bool,
    pub reconnect_attempt: u32,
    pub reconnect_pending: bool,
    pub last_inbound_at: Option<Instant>,
    pub topics: Vec<String>,
}

/// Delay before reconnect attempt `attempt` (1-based):
/// `min(base * 2^(attempt-1), max)`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(max)
}

struct State {
    token: Option<String>,
    connection: ConnectionState,
    socket: Option<Box<dyn SocketHandle>>,
    /// Bumped whenever a socket is opened or abandoned; events carrying an
    /// older generation are ignored.
    generation: u64,
    last_inbound_at: Option<Instant>,
    reconnect_attempt: u32,
    auth_rejected: bool,
    manual_close: bool,
    reconnect_timer: Option<JoinHandle<()>>,
    heartbeat_timer: Option<JoinHandle<()>>,
    topics: TopicRegistry,
}

pub(crate) struct SessionInner {
    config: TransportConfig,
    endpoint: Url,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    state: Mutex<State>,
    this: Weak<SessionInner>,
}

/// Cheap-clone handle to the process-wide push session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(config: &TransportConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint_url)
            .with_context(|| format!("Invalid socket endpoint: {}", config.endpoint_url))?;

        let inner = Arc::new_cyclic(|this| SessionInner {
            config: config.clone(),
            endpoint,
            connector,
            dispatcher: Dispatcher::new(),
            state: Mutex::new(State {
                token: None,
                connection: ConnectionState::Closed,
                socket: None,
                generation: 0,
                last_inbound_at: None,
                reconnect_attempt: 0,
                auth_rejected: false,
                manual_close: false,
                reconnect_timer: None,
                heartbeat_timer: None,
                topics: TopicRegistry::new(),
            }),
            this: this.clone(),
        });

        Ok(Self { inner })
    }

    /// Open the socket if allowed. A non-empty `token` different from the
    /// stored one replaces it and clears a previous auth rejection.
    pub fn connect(&self, token: Option<&str>) {
        let mut st = self.inner.lock();
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            if st.token.as_deref() != Some(token) {
                st.token = Some(token.to_string());
                st.auth_rejected = false;
            }
        }
        st.manual_close = false;
        self.inner.connect_locked(&mut st);
    }

    /// Close the socket and stay closed until the next explicit connect.
    pub fn disconnect(&self) {
        let mut st = self.inner.lock();
        self.inner.disconnect_locked(&mut st);
    }

    /// React to the external login flow changing the token.
    pub fn set_token(&self, token: Option<&str>) {
        let mut st = self.inner.lock();
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            st.token = None;
            self.inner.disconnect_locked(&mut st);
            return;
        };
        if st.token.as_deref() == Some(token) {
            return;
        }

        debug!("Auth token changed");
        st.token = Some(token.to_string());
        st.auth_rejected = false;
        st.manual_close = false;
        st.reconnect_attempt = 0;
        cancel(&mut st.reconnect_timer);
        if st.connection != ConnectionState::Closed {
            // The live socket was authenticated with the old token.
            self.inner.teardown(&mut st, true);
        }
        self.inner.connect_locked(&mut st);
    }

    /// Declare interest in `topic`. Works before authentication; the topic
    /// is sent once a socket opens.
    pub fn subscribe(&self, topic: &str) {
        let mut st = self.inner.lock();
        if !st.topics.insert(topic) {
            return;
        }
        if !self.inner.can_connect(&st) {
            debug!(topic, "Subscription recorded until the session can connect");
            return;
        }
        match st.connection {
            ConnectionState::Open => {
                self.inner.send_frame(&st, &ClientFrame::Subscribe { topic: topic.to_string() });
            }
            ConnectionState::Connecting => {}
            ConnectionState::Closed => {
                // A pending reconnect will replay the topic when it opens.
                if st.reconnect_timer.is_none() {
                    st.manual_close = false;
                    self.inner.connect_locked(&mut st);
                }
            }
        }
    }

    pub fn unsubscribe(&self, topic: &str) {
        let mut st = self.inner.lock();
        if !st.topics.remove(topic) {
            return;
        }
        if st.connection == ConnectionState::Open {
            self.inner.send_frame(&st, &ClientFrame::Unsubscribe { topic: topic.to_string() });
        }
    }

    /// Register a listener for inbound frames of `kind`.
    pub fn on<F>(&self, kind: MessageKind, handler: F) -> ListenerHandle
    where
        F: Fn(&InboundFrame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler)
    }

    pub fn off(&self, handle: &ListenerHandle) -> bool {
        self.inner.dispatcher.off(handle)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().connection
    }

    pub fn desired_topics(&self) -> Vec<String> {
        self.inner.lock().topics.iter().map(str::to_string).collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.lock();
        SessionSnapshot {
            state: st.connection,
            has_token: st.token.is_some(),
            auth_rejected: st.auth_rejected,
            reconnect_attempt: st.reconnect_attempt,
            reconnect_pending: st.reconnect_timer.is_some(),
            last_inbound_at: st.last_inbound_at,
            topics: st.topics.iter().map(str::to_string).collect(),
        }
    }
}

fn cancel(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn can_connect(&self, st: &State) -> bool {
        if st.auth_rejected {
            return false;
        }
        !self.config.require_auth || st.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    fn connect_locked(&self, st: &mut State) {
        if !self.can_connect(st) {
            debug!(auth_rejected = st.auth_rejected, "Connect skipped, session cannot authenticate");
            return;
        }
        if st.connection != ConnectionState::Closed {
            return;
        }
        self.open_socket(st);
    }

    fn open_socket(&self, st: &mut State) {
        cancel(&mut st.reconnect_timer);
        st.generation += 1;

        let mut url = self.endpoint.clone();
        if let Some(ref token) = st.token {
            url.query_pairs_mut().append_pair("token", token);
        }

        info!(generation = st.generation, attempt = st.reconnect_attempt, "Connecting push socket");
        let events = SocketEvents::new(st.generation, self.this.clone());
        st.connection = ConnectionState::Connecting;
        st.socket = Some(self.connector.open(url, events));
    }

    fn disconnect_locked(&self, st: &mut State) {
        st.manual_close = true;
        cancel(&mut st.reconnect_timer);
        if st.connection != ConnectionState::Closed {
            info!("Push socket closed by client");
        }
        self.teardown(st, true);
    }

    /// Drop the current socket and heartbeat and abandon its generation.
    fn teardown(&self, st: &mut State, close_socket: bool) {
        cancel(&mut st.heartbeat_timer);
        if let Some(socket) = st.socket.take() {
            if close_socket {
                socket.close();
            }
        }
        st.generation += 1;
        st.connection = ConnectionState::Closed;
    }

    fn send_frame(&self, st: &State, frame: &ClientFrame) {
        let Some(ref socket) = st.socket else {
            return;
        };
        match frame.encode() {
            Ok(text) => socket.send(text),
            Err(e) => warn!(error = %e, "Failed to encode client frame"),
        }
    }

    fn schedule_reconnect(&self, st: &mut State) {
        if st.manual_close {
            return;
        }
        if !self.can_connect(st) {
            debug!("Reconnect skipped, session cannot authenticate");
            return;
        }
        if st.reconnect_timer.is_some() {
            return;
        }

        st.reconnect_attempt += 1;
        let delay = backoff_delay(
            st.reconnect_attempt,
            self.config.reconnect_base(),
            self.config.reconnect_max(),
        );
        debug!(attempt = st.reconnect_attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        let session = self.this.clone();
        st.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = session.upgrade() {
                session.fire_reconnect();
            }
        }));
    }

    fn fire_reconnect(&self) {
        let mut st = self.lock();
        // Detach rather than abort: this runs on the timer task itself.
        st.reconnect_timer = None;
        if st.manual_close {
            return;
        }
        self.connect_locked(&mut st);
    }

    fn start_heartbeat(&self, st: &mut State) {
        cancel(&mut st.heartbeat_timer);
        let generation = st.generation;
        let period = self.config.heartbeat_interval();
        let session = self.this.clone();

        st.heartbeat_timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if !session.heartbeat_tick(generation) {
                    break;
                }
            }
        }));
    }

    /// One heartbeat. Returns false when the heartbeat should stop.
    fn heartbeat_tick(&self, generation: u64) -> bool {
        let mut st = self.lock();
        if generation != st.generation || st.connection != ConnectionState::Open {
            return false;
        }

        let silent_for = st
            .last_inbound_at
            .map(|at| at.elapsed())
            .unwrap_or(Duration::MAX);
        if silent_for > self.config.stale_after() {
            warn!(silent_ms = silent_for.as_millis() as u64, "Push socket stale, forcing reconnect");
            // Detach: this runs on the heartbeat task itself.
            st.heartbeat_timer = None;
            self.teardown(&mut st, true);
            self.schedule_reconnect(&mut st);
            return false;
        }

        self.send_frame(&st, &ClientFrame::Ping { ts: Utc::now().timestamp_millis() });
        true
    }

    pub(crate) fn handle_open(&self, generation: u64) {
        let mut st = self.lock();
        if generation != st.generation || st.connection != ConnectionState::Connecting {
            return;
        }

        st.connection = ConnectionState::Open;
        st.reconnect_attempt = 0;
        cancel(&mut st.reconnect_timer);
        st.last_inbound_at = Some(Instant::now());
        self.start_heartbeat(&mut st);

        info!(generation, topics = st.topics.len(), "Push socket open");
        let topics: Vec<String> = st.topics.iter().map(str::to_string).collect();
        for topic in topics {
            self.send_frame(&st, &ClientFrame::Subscribe { topic });
        }
    }

    pub(crate) fn handle_message(&self, generation: u64, text: &str) {
        {
            let mut st = self.lock();
            if generation != st.generation {
                return;
            }
            st.last_inbound_at = Some(Instant::now());
        }

        // Listeners run without the session lock held.
        match InboundFrame::parse(text) {
            Some(frame) => {
                self.dispatcher.dispatch(&frame);
            }
            None => debug!(len = text.len(), "Dropping malformed frame"),
        }
    }

    pub(crate) fn handle_close(&self, generation: u64, code: Option<u16>) {
        let mut st = self.lock();
        if generation != st.generation {
            return;
        }

        self.teardown(&mut st, false);
        if st.manual_close {
            return;
        }
        if code == Some(self.config.auth_reject_code) {
            warn!(code = ?code, "Push server rejected the auth token");
            st.auth_rejected = true;
            cancel(&mut st.reconnect_timer);
            return;
        }
        info!(code = ?code, "Push socket closed");
        self.schedule_reconnect(&mut st);
    }

    pub(crate) fn handle_error(&self, generation: u64) {
        let mut st = self.lock();
        if generation != st.generation || st.manual_close {
            return;
        }
        debug!(generation, "Push socket error");
        self.schedule_reconnect(&mut st);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn session_with(connector: &FakeConnector) -> Session {
        Session::new(&TransportConfig::default(), Arc::new(connector.clone()))
            .expect("Failed to build session")
    }

    fn subscribe_frame(topic: &str) -> serde_json::Value {
        serde_json::json!({"action": "subscribe", "topic": topic})
    }

    #[test]
    fn test_backoff_delay_sequence() {
        let base = Duration::from_millis(1000);
        let max = Duration::from_millis(15_000);
        let delays: Vec<u128> = (1..=5).map(|n| backoff_delay(n, base, max).as_millis()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 15000]);
        assert_eq!(backoff_delay(40, base, max), max);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = TransportConfig {
            endpoint_url: "not a url".to_string(),
            ..TransportConfig::default()
        };
        assert!(Session::new(&config, Arc::new(FakeConnector::default())).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_token_is_noop() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.connect(None);
        assert_eq!(session.state(), ConnectionState::Closed);
        assert_eq!(connector.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_auth_requirement() {
        let connector = FakeConnector::default();
        let config = TransportConfig {
            require_auth: false,
            ..TransportConfig::default()
        };
        let session = Session::new(&config, Arc::new(connector.clone())).unwrap();

        session.connect(None);
        assert_eq!(connector.opened(), 1);
        assert_eq!(connector.socket(0).url.query(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_token_opens_exactly_one_socket() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        session.set_token(Some("abc"));
        session.connect(None);
        session.connect(Some("abc"));

        assert_eq!(connector.opened(), 1);
        assert_eq!(session.state(), ConnectionState::Connecting);
        let url = connector.socket(0).url;
        assert_eq!(url.query(), Some("token=abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_is_url_encoded() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.connect(Some("a b&c"));
        assert_eq!(connector.socket(0).url.query(), Some("token=a+b%26c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_rejection_blocks_same_token() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();
        socket.events.closed(Some(4001));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Closed);
        assert!(snapshot.auth_rejected);
        assert!(!snapshot.reconnect_pending);

        session.connect(None);
        session.connect(Some("abc"));
        session.subscribe("news");
        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.opened(), 1);

        session.set_token(Some("xyz"));
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.socket(1).url.query(), Some("token=xyz"));
        assert!(!session.snapshot().auth_rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_new_token_clears_rejection() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.connect(Some("abc"));
        connector.socket(0).events.closed(Some(4001));
        session.connect(Some("def"));
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_topics_replayed_once_in_order_on_open() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        session.subscribe("standings:2024");
        session.subscribe("news");
        let socket = connector.socket(0);
        assert!(socket.frames().is_empty());

        socket.events.opened();
        session.subscribe("standings:2024");
        assert_eq!(
            socket.frames(),
            vec![subscribe_frame("standings:2024"), subscribe_frame("news")]
        );

        session.subscribe("fixtures:2024");
        assert_eq!(socket.frames().last(), Some(&subscribe_frame("fixtures:2024")));
        assert_eq!(socket.frames().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_before_auth_records_interest() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.subscribe("news");
        assert_eq!(connector.opened(), 0);
        assert_eq!(session.desired_topics(), vec!["news".to_string()]);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();
        assert_eq!(socket.frames(), vec![subscribe_frame("news")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_triggers_connect() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        session.disconnect();
        assert_eq!(connector.opened(), 1);

        session.subscribe("news");
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_sends_frame_when_open() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        session.subscribe("news");
        let socket = connector.socket(0);
        socket.events.opened();

        session.unsubscribe("news");
        session.unsubscribe("news");
        assert_eq!(
            socket.frames().last(),
            Some(&serde_json::json!({"action": "unsubscribe", "topic": "news"}))
        );
        assert_eq!(socket.frames().len(), 2);
        assert!(session.desired_topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_after_drop_replays_topics() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        session.subscribe("news");
        connector.socket(0).events.opened();
        connector.socket(0).events.closed(Some(1006));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Closed);
        assert_eq!(snapshot.reconnect_attempt, 1);
        assert!(snapshot.reconnect_pending);

        sleep(Duration::from_millis(999)).await;
        assert_eq!(connector.opened(), 1);
        sleep(Duration::from_millis(2)).await;
        assert_eq!(connector.opened(), 2);

        let socket = connector.socket(1);
        socket.events.opened();
        assert_eq!(socket.frames(), vec![subscribe_frame("news")]);
        assert_eq!(session.snapshot().reconnect_attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_delays_grow() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        // Connect fails three times in a row without ever opening.
        for (n, delay_ms) in [(1usize, 1000u64), (2, 2000), (3, 4000)] {
            connector.socket(n - 1).events.errored();
            connector.socket(n - 1).events.closed(None);
            assert_eq!(session.snapshot().reconnect_attempt, n as u32);

            sleep(Duration::from_millis(delay_ms - 1)).await;
            assert_eq!(connector.opened(), n);
            sleep(Duration::from_millis(2)).await;
            assert_eq!(connector.opened(), n + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_reconnect_pending() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();
        socket.events.errored();
        socket.events.errored();
        socket.events.closed(Some(1011));
        assert_eq!(session.snapshot().reconnect_attempt, 1);

        sleep(Duration::from_secs(20)).await;
        assert_eq!(connector.opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_then_detects_stale_socket() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();

        sleep(Duration::from_millis(25_001)).await;
        assert_eq!(socket.frames().len(), 1);
        assert_eq!(socket.frames()[0]["action"], "ping");
        assert!(socket.frames()[0]["ts"].is_i64());

        sleep(Duration::from_millis(25_000)).await;
        assert_eq!(socket.frames().len(), 2);
        assert!(!socket.is_closed());

        // 75s of silence exceeds the 60s threshold.
        sleep(Duration::from_millis(25_000)).await;
        assert!(socket.is_closed());
        assert_eq!(session.state(), ConnectionState::Closed);

        sleep(Duration::from_millis(1_000)).await;
        assert_eq!(connector.opened(), 2);

        // The abandoned socket's late close event changes nothing.
        socket.events.closed(Some(1006));
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_frames_keep_socket_alive() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();

        sleep(Duration::from_millis(50_001)).await;
        socket.events.message(r#"{"type": "pong"}"#);
        sleep(Duration::from_millis(25_000)).await;

        assert!(!socket.is_closed());
        assert_eq!(session.state(), ConnectionState::Open);
        assert_eq!(socket.frames().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_suppresses_reconnect() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();

        session.disconnect();
        assert!(socket.is_closed());
        assert_eq!(session.state(), ConnectionState::Closed);

        socket.events.closed(Some(1000));
        sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.opened(), 1);
        assert!(socket.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        connector.socket(0).events.closed(None);
        assert!(session.snapshot().reconnect_pending);

        session.disconnect();
        assert!(!session.snapshot().reconnect_pending);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_token_none_disconnects() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();

        session.set_token(None);
        assert!(socket.is_closed());
        assert!(!session.snapshot().has_token);

        session.subscribe("news");
        session.connect(None);
        assert_eq!(connector.opened(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_change_replaces_live_socket() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);

        session.set_token(Some("abc"));
        let first = connector.socket(0);
        first.events.opened();

        session.set_token(Some("xyz"));
        assert!(first.is_closed());
        assert_eq!(connector.opened(), 2);
        assert_eq!(connector.socket(1).url.query(), Some("token=xyz"));

        first.events.closed(Some(1000));
        assert!(!session.snapshot().reconnect_pending);
        assert_eq!(session.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_dispatched_and_malformed_dropped() {
        let connector = FakeConnector::default();
        let session = session_with(&connector);
        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        session.on(MessageKind::Message, move |frame| {
            assert_eq!(frame.payload, serde_json::json!(1));
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        session.set_token(Some("abc"));
        let socket = connector.socket(0);
        socket.events.opened();
        socket.events.message("garbage");
        socket.events.message("[1, 2]");
        socket.events.message(r#"{"payload": 1}"#);

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), ConnectionState::Open);
    }
}
