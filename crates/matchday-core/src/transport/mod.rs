//! Push transport: one socket session multiplexing many topics.
//!
//! - `frames`: the JSON wire codec for client and server frames
//! - `dispatcher`: routes inbound frames to listeners by message kind
//! - `topics`: the desired-topic set replayed on every (re)connect
//! - `socket`: the `Connector` seam and its tokio-tungstenite implementation
//! - `session`: connection lifecycle, auth gating, heartbeat, reconnect

pub mod dispatcher;
pub mod frames;
pub mod session;
pub mod socket;
pub mod topics;

pub use dispatcher::{Dispatcher, ListenerHandle};
pub use frames::{ClientFrame, InboundFrame, MessageKind};
pub use session::{backoff_delay, ConnectionState, Session, SessionSnapshot};
pub use socket::{Connector, SocketEvents, SocketHandle, WsConnector};
pub use topics::TopicRegistry;
