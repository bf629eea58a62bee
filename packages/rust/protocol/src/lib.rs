//! Wire protocol for streamed analysis runs.
//!
//! This crate provides:
//! - [`Event`]: one unit of streamed progress, tied to a stage
//! - [`EventEncoder`]: appends events to a byte stream in a given framing
//! - [`StreamDemux`]: recovers events from arbitrarily chunked bytes
//! - [`ProgressState`] / [`reduce`]: client-side fold of events

pub mod codec;
pub mod event;
pub mod progress;

pub use codec::{EventEncoder, StreamDemux, decode_all};
pub use event::{
    ErrorDescriptor, Event, GENERIC_FAILURE_MESSAGE, InputEcho, PagePreview, UrlEntry,
};
pub use progress::{ProgressState, fold, reduce};
