//! Common imports for typical harness usage.
//!
//! This module intentionally exports the most frequently used builder/runtime
//! types so examples and application code need fewer import lines.
pub use crate::{
    AbortHandle, Harness, HarnessBuilder, HarnessError, InputPart, ModelRef, OutputPart,
    ProviderId, RunBuilder, RunOutput, RunStream, Session, SessionConfig, StreamEvent,
};
