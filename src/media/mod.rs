pub mod messages;
pub mod transport;

pub use messages::{InboundEvent, InboundMedia, InboundMessage, OutboundMedia, StartMetadata};
pub use transport::{ChannelTransport, Outbound, OutboundQueue, Transport};
