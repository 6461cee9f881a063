// localpush-api: Wire codec and transports for persistent relay connections (WS, WSS, TCP+TLS)

pub mod error;
pub mod tcp;
pub mod tls;
pub mod transport;
pub mod websocket;
pub mod wire;

pub use error::Error;
pub use transport::{Connector, Endpoint, Link, NetworkConnector, Scheme, TlsMode};
pub use wire::{Frame, NotificationFrame, RegisterFrame};
