//! Stage executor and domain logic for hottake.
//!
//! This crate ties the upstream adapters together into one analysis run
//! ([`Pipeline::run`]) that reports its progress as protocol events.

#[cfg(any(test, feature = "test-util"))]
pub mod fakes;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod sink;

pub use pipeline::{Pipeline, PipelineRun, PipelineSettings, Upstreams};
pub use prompts::SynthesisTemplate;
pub use sink::{CollectingSink, EventSink};
