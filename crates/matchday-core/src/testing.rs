//! Test doubles for the socket and REST seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use url::Url;

use crate::api::{FetchError, FetchResponse, Fetcher};
use crate::transport::{Connector, SocketEvents, SocketHandle};

/// One socket opened through [`FakeConnector`].
#[derive(Clone)]
pub(crate) struct FakeSocket {
    pub url: Url,
    pub events: SocketEvents,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl FakeSocket {
    /// Frames sent so far, decoded.
    pub fn frames(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).expect("client sent invalid JSON"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl SocketHandle for FakeHandle {
    fn send(&self, text: String) {
        self.sent.lock().unwrap().push(text);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Records every socket the session opens; tests drive their events.
#[derive(Clone, Default)]
pub(crate) struct FakeConnector {
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl FakeConnector {
    pub fn opened(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn socket(&self, index: usize) -> FakeSocket {
        self.sockets.lock().unwrap()[index].clone()
    }
}

impl Connector for FakeConnector {
    fn open(&self, url: Url, events: SocketEvents) -> Box<dyn SocketHandle> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.sockets.lock().unwrap().push(FakeSocket {
            url,
            events,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        Box::new(FakeHandle { sent, closed })
    }
}

/// A request seen by [`FakeFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeenRequest {
    pub path: String,
    pub validator: Option<String>,
}

enum Scripted {
    Ready(Result<FetchResponse, FetchError>),
    Gated(oneshot::Receiver<Result<FetchResponse, FetchError>>),
}

/// Answers requests from a queue of scripted responses, in order.
#[derive(Clone, Default)]
pub(crate) struct FakeFetcher {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn respond(&self, response: Result<FetchResponse, FetchError>) {
        self.script.lock().unwrap().push_back(Scripted::Ready(response));
    }

    pub fn respond_data(&self, data: Value, validator: Option<&str>) {
        self.respond(Ok(FetchResponse::Modified {
            data,
            validator: validator.map(str::to_string),
        }));
    }

    /// Queue a response the test completes later through the returned sender.
    pub fn respond_later(&self) -> oneshot::Sender<Result<FetchResponse, FetchError>> {
        let (tx, rx) = oneshot::channel();
        self.script.lock().unwrap().push_back(Scripted::Gated(rx));
        tx
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, path: &str, validator: Option<&str>) -> Result<FetchResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(SeenRequest {
            path: path.to_string(),
            validator: validator.map(str::to_string),
        });
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(response)) => response,
            Some(Scripted::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(FetchError::NetworkError("gate dropped".to_string()))),
            None => Err(FetchError::NetworkError("no scripted response".to_string())),
        }
    }
}
