//! Client side: one resilient relay link, the message log, and the facade
//! a renderer drives.

pub mod controller;
pub mod lifecycle;
pub mod session;
pub mod transport;

pub use controller::{
    ConnectionController, ConnectionState, ControllerOptions, Identity, InboundFrame, SendError,
};
pub use lifecycle::{ComposeError, DeliveryState, LogEntry, MessageLog, Outbound};
pub use session::{ChatClient, ClientUpdate};
pub use transport::{Connector, InProcessConnector, Link, TransportError, TransportEvent, WsConnector};
