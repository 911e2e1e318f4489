pub mod capability;
pub mod config;
pub mod rtsp;
pub mod transport;

pub use capability::{Capabilities, DisplayModes, PlatformMode, ResolutionGroup};
pub use config::SinkConfig;
pub use rtsp::{CodecError, Headers, Message, Method, Request, Response};
pub use transport::{Protocol, TransportDescriptor, TransportError};
