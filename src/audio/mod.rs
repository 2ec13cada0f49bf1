pub mod codec;
pub mod file;
pub mod frames;

pub use file::{PcmLocator, PcmSource};
pub use frames::{Frame, FrameSource, Frames};
