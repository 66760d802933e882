//! Network sync: wire protocol, transports and the channel client

pub mod protocol;
pub mod sync;
pub mod transport;

pub use sync::{ChannelEvent, MatchAssignment, NetworkSync};
pub use transport::{ChannelError, Connector, Transport, WsConnector};
