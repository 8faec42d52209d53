//! Stream session: the accumulation buffer, its lifecycle, and rotation.
//!
//! Lifecycle is explicit (`start` → `ingest`* → `end`) with time-driven
//! rotation while streaming. With `auto_start`, `ingest` on an inactive
//! session starts one instead of failing.

mod actor;
mod handle;
mod types;

pub use handle::{check_content_type, SessionHandle};
pub use types::{
    EndReceipt, IngestReceipt, Segment, SessionOptions, SessionStatus, StartReceipt,
    CHANNEL_CAPACITY,
};
