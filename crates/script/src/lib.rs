//! Lua capability host and the row transform pipeline.
//!
//! A [`ScriptHost`] owns one sandboxed Lua state with the `os.*`, `http.*`
//! and `json.*` bindings installed. A [`Pipeline`] runs sheet records either
//! straight through or through a named callback in that host.

pub mod bindings;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod response;

pub use error::{Result, ScriptError};
pub use host::{HostOptions, ScriptHost};
pub use pipeline::{CallbackInvoker, Pipeline, RowSink, RunSummary, Transform};
pub use response::{CallbackResponse, RowOutcome};
