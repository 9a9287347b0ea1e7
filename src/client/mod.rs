pub mod session;
pub mod transport;

pub use session::{ClientConfig, ClientEvent, ConnectionState, DraftClient};
pub use transport::{Connector, TcpConnector, TcpTransport, Transport};
