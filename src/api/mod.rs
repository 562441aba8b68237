pub mod client;
mod error;
pub mod logging;
pub mod mock_client;
pub mod stream;

pub use client::{ApiClient, AskRequest, ByteStream, StreamSource};
pub use error::TransportError;
pub use stream::{decode_frames, open_frames, FrameStream, StreamParser};
