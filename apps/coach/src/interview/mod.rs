//! Interview orchestration.
//!
//! - `machine`: pure state machine (phases, events, effects, snapshot).
//! - `runtime`: the per-interview task that executes effects.
//! - `registry`: live interviews addressable over HTTP.

pub mod handlers;
pub mod machine;
pub mod prompts;
pub mod registry;
pub mod runtime;

pub use machine::{EndReason, InterviewSetup, SessionError, SessionPhase, SessionSnapshot};
pub use registry::{InterviewRegistry, RegistryError};
pub use runtime::{InterviewRuntime, SessionHandle};
