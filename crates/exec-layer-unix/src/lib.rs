//! Unix implementation of the process execution layer, built on fork/exec and
//! non-blocking pipes.

#[cfg(unix)]
mod child;
#[cfg(unix)]
mod exec;
#[cfg(unix)]
mod handle;

#[cfg(unix)]
pub use exec::Exec;
#[cfg(unix)]
pub use handle::{HandleRead, HandleWrite};

#[cfg(unix)]
pub struct UnixExecFactory;

#[cfg(unix)]
impl exec_layer_core::ExecFactory for UnixExecFactory {
    type Handle = Exec;

    fn create(config: &exec_layer_core::ExecConfig) -> exec_layer_core::Result<Exec> {
        Exec::from_config(config.clone())
    }

    fn platform_name() -> &'static str {
        "Unix"
    }
}
