//! castline - live MP3 ingest relay.
//!
//! A single producer pushes `audio/mpeg` chunks; the session buffers them,
//! rotates the buffer to `broadcast_<timestamp>.mp3` files on a fixed
//! interval or at end of stream, and fans each chunk out to websocket
//! listeners as it arrives.

pub mod error;
pub mod listeners;
pub mod naming;
pub mod persist;
pub mod policy;
pub mod session;
pub mod telemetry;
pub mod web;

pub use error::RelayError;
pub use persist::FilePersister;
pub use session::{SessionHandle, SessionOptions};
