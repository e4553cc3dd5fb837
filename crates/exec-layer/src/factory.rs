use exec_layer_core::{ExecConfig, ExecFactory, Result};
use tracing::debug;

/// Platform-independent factory that selects the appropriate implementation at compile time
pub struct PlatformExecFactory;

#[cfg(unix)]
impl ExecFactory for PlatformExecFactory {
    type Handle = exec_layer_unix::Exec;

    fn create(config: &ExecConfig) -> Result<Self::Handle> {
        exec_layer_unix::UnixExecFactory::create(config)
    }

    fn platform_name() -> &'static str {
        exec_layer_unix::UnixExecFactory::platform_name()
    }
}

/// Create a platform-appropriate handle, not yet opened
#[cfg(unix)]
pub fn create_exec(config: &ExecConfig) -> Result<<PlatformExecFactory as ExecFactory>::Handle> {
    debug!(
        "Creating {} handle for {}",
        PlatformExecFactory::platform_name(),
        config.name
    );
    PlatformExecFactory::create(config)
}

/// Create a platform-appropriate handle and spawn the child
#[cfg(unix)]
pub fn spawn_exec(config: &ExecConfig) -> Result<<PlatformExecFactory as ExecFactory>::Handle> {
    let mut exec = create_exec(config)?;
    exec.open()?;
    Ok(exec)
}
