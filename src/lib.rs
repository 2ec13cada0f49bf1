pub mod audio;
pub mod config;
pub mod http;
pub mod media;
pub mod session;

pub use audio::{Frame, FrameSource, PcmLocator, PcmSource};
pub use config::Config;
pub use http::{create_router, AppState};
pub use media::{ChannelTransport, InboundMessage, OutboundMedia, Transport};
pub use session::{CallSession, Pacer, PacerOutcome, SessionConfig, SessionState, SessionStats};
