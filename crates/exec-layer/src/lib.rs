//! Process execution layer.
//!
//! Spawns a helper process and drives it as a duplex byte stream: requests go
//! to the child's stdin, responses come back on its stdout, and stderr is kept
//! aside to explain the failure when the child dies unexpectedly.
//!
//! The implementation is picked at compile time through [`PlatformExecFactory`].
//! [`AsyncExec`] wraps any handle for use from a tokio runtime.

mod async_exec;
mod factory;
mod logging;

pub use async_exec::AsyncExec;
pub use factory::*;
pub use logging::*;

// Re-export core functionality
pub use exec_layer_core::*;

#[cfg(unix)]
pub use exec_layer_unix::{Exec, HandleRead, HandleWrite, UnixExecFactory};
