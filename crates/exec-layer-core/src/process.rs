use crate::{ExecConfig, IoRead, IoWrite, Result};

/// Process id of a spawned child
pub type ProcessId = u32;

/// Lifecycle state of a process handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    /// Configured, no descriptors and no child yet
    Unopened,
    /// Pipes created and child spawned
    Open,
    /// Descriptors released; the handle is inert
    Closed,
}

/// Handle to a child process driven as a duplex byte stream.
///
/// Reads, writes and eof checks go through the health check of the
/// implementation, so a dead child surfaces as a process failure rather than
/// a bare pipe error.
pub trait ExecHandle: IoRead + IoWrite + Send {
    /// Spawn the child and wire up its standard streams
    fn open(&mut self) -> Result<()>;

    /// Release descriptors and reap the child, failing if it does not exit in time
    fn close(&mut self) -> Result<()>;

    /// Process id, if a live child is still owned by this handle
    fn pid(&self) -> Option<ProcessId>;

    fn state(&self) -> ExecState;

    /// Full argument vector, command first
    fn argv(&self) -> &[String];
}

/// Factory for creating platform-specific process handles
pub trait ExecFactory {
    /// The type of handle this factory creates
    type Handle: ExecHandle;

    /// Create an unopened handle from the configuration
    fn create(config: &ExecConfig) -> Result<Self::Handle>;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}
