//! Per-call session state and the turn pipeline
//!
//! One [`CallSession`] exists per active call. The [`TurnPipeline`] drives a
//! turn through STT, streaming LLM and serialized TTS output, structured as
//! three stages per session: an LLM producer task, the token-buffer loop,
//! and a single writer task that drains the TTS queue to the wire in FIFO
//! order.

pub mod session;
pub mod text;
pub mod turn;

pub use session::{CallSession, GreetingState};
pub use turn::{PipelineServices, TurnPipeline};
