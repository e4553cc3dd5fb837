use crate::child::{self, ChildFds};
use crate::handle::{HandleRead, HandleWrite, pipe_cloexec};
use exec_layer_core::{
    ExecConfig, ExecError, ExecHandle, ExecState, IoRead, IoWrite, ProcessId, Result, Wait,
};
use libc::c_char;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use std::ffi::CString;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::{debug, error, trace};

/// Child process driven as a duplex byte stream.
///
/// The parent writes to the child's stdin and reads from its stdout. Stderr is
/// captured separately and only drained to explain an unexpected exit. Every
/// failed read or write runs a health check first, so a child that died shows
/// up as a [`ExecError::Terminated`] or signal error carrying its stderr
/// instead of a broken pipe.
pub struct Exec {
    config: ExecConfig,
    argv: Vec<String>,
    command_c: CString,
    argv_c: Vec<CString>,
    timeout: Duration,
    state: ExecState,
    pid: Option<Pid>,
    read: Option<HandleRead>,
    write: Option<HandleWrite>,
    error: Option<HandleRead>,
}

impl Exec {
    /// Create an unopened handle.
    ///
    /// `command` is inserted as the first element of the argument vector.
    pub fn new(command: &str, args: Option<&[String]>, name: &str, timeout: Duration) -> Result<Self> {
        Self::from_config(ExecConfig::new(command, args, name, timeout)?)
    }

    pub fn from_config(config: ExecConfig) -> Result<Self> {
        config.validate()?;

        let argv = config.argv();
        let argv_c = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ExecError::InvalidArgument(e.to_string()))?;
        let command_c = argv_c[0].clone();

        Ok(Self {
            timeout: config.timeout(),
            config,
            argv,
            command_c,
            argv_c,
            state: ExecState::Unopened,
            pid: None,
            read: None,
            write: None,
            error: None,
        })
    }

    /// Create the pipes and spawn the child
    pub fn open(&mut self) -> Result<()> {
        if self.state != ExecState::Unopened {
            return Err(ExecError::Assert(format!(
                "{} has already been opened",
                self.config.name
            )));
        }

        let name = &self.config.name;

        // Pipe names are from the perspective of the parent
        let (read_out, read_in) =
            pipe_cloexec().map_err(|e| ExecError::kernel("unable to create read pipe", e))?;
        let (write_out, write_in) =
            pipe_cloexec().map_err(|e| ExecError::kernel("unable to create write pipe", e))?;
        let (error_out, error_in) =
            pipe_cloexec().map_err(|e| ExecError::kernel("unable to create error pipe", e))?;

        let child_fds = ChildFds {
            stdin: write_out.as_raw_fd(),
            stdout: read_in.as_raw_fd(),
            stderr: error_in.as_raw_fd(),
            parent: [
                read_out.as_raw_fd(),
                write_in.as_raw_fd(),
                error_out.as_raw_fd(),
            ],
        };

        let read = HandleRead::new(format!("{name} read"), read_out, self.timeout)?;
        let write = HandleWrite::new(format!("{name} write"), write_in, self.timeout)?;
        let error = HandleRead::new(format!("{name} error"), error_out, Duration::ZERO)?;

        let mut argv_ptrs: Vec<*const c_char> = self.argv_c.iter().map(|arg| arg.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());

        // SAFETY: the child branch only makes raw system calls on data built
        // above and leaves through exec or _exit
        let pid = match unsafe { fork() } {
            Ok(ForkResult::Child) => child::exec_child(&self.command_c, &argv_ptrs, &child_fds),
            Ok(ForkResult::Parent { child }) => child,
            Err(e) => return Err(ExecError::kernel("unable to fork", e)),
        };

        // The child has its own copies of these now
        drop(read_in);
        drop(write_out);
        drop(error_in);

        debug!(
            "Spawned {} (PID: {}) with argv: {:?}",
            name,
            pid.as_raw(),
            self.argv
        );

        self.pid = Some(pid);
        self.read = Some(read);
        self.write = Some(write);
        self.error = Some(error);
        self.state = ExecState::Open;

        Ok(())
    }

    /// Non-blocking check that the child is still running.
    ///
    /// An exited child is reaped exactly once, after which the pid is cleared
    /// and later checks succeed without waiting.
    fn check(&mut self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let status = waitpid(pid, Some(WaitPidFlag::WNOHANG)).map_err(wait_error)?;
        trace!("Health check of {} (PID: {}): {:?}", self.config.name, pid, status);

        match status {
            WaitStatus::Exited(_, code) => {
                self.pid = None;

                let stderr = match self.error.as_mut() {
                    Some(error) => error.drain().unwrap_or_default(),
                    None => Vec::new(),
                };
                debug!("{} (PID: {}) exited with code {}", self.config.name, pid, code);

                Err(ExecError::terminated(
                    &self.config.name,
                    code,
                    &String::from_utf8_lossy(&stderr),
                ))
            }
            WaitStatus::Signaled(_, signal, _) => {
                self.pid = None;
                debug!("{} (PID: {}) killed by {}", self.config.name, pid, signal);

                Err(ExecError::signaled(&self.config.name, signal as i32))
            }
            _ => Ok(()),
        }
    }

    fn reader(&mut self) -> Result<&mut HandleRead> {
        self.read
            .as_mut()
            .ok_or_else(|| not_open(&self.config.name, self.state))
    }

    fn writer(&mut self) -> Result<&mut HandleWrite> {
        self.write
            .as_mut()
            .ok_or_else(|| not_open(&self.config.name, self.state))
    }

    /// Read from the child's stdout.
    ///
    /// A failed read is replaced by the child's own failure when the health
    /// check finds it has exited.
    pub fn read(&mut self, buf: &mut [u8], block: bool) -> Result<usize> {
        match self.reader()?.read(buf, block) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.check()?;
                Err(e)
            }
        }
    }

    /// Write to the child's stdin and flush
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let writer = self.writer()?;
        match writer.write(buf).and_then(|()| writer.flush()) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.check()?;
                Err(e)
            }
        }
    }

    /// Never reports true.
    ///
    /// Once stdout has ended the health check runs, so a child that exited is
    /// raised as an error. A child still running, or one already reaped, gives
    /// false.
    pub fn is_eof(&mut self) -> Result<bool> {
        if self.reader()?.is_eof() {
            self.check()?;
        }

        Ok(false)
    }

    /// Close the pipes and wait for the child to exit.
    ///
    /// Closing stdin is what tells the child to finish. If it has not exited
    /// within the timeout an error is raised, but the descriptors are already
    /// released and the child is not waited on again.
    pub fn close(&mut self) -> Result<()> {
        if self.state != ExecState::Open {
            return Ok(());
        }
        self.state = ExecState::Closed;

        self.write = None;
        self.read = None;
        self.error = None;

        let Some(pid) = self.pid.take() else {
            return Ok(());
        };

        let mut wait = Wait::new(self.timeout);
        loop {
            match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    if !wait.more() {
                        return Err(ExecError::Execution(format!(
                            "{} did not exit when expected",
                            self.config.name
                        )));
                    }
                }
                Ok(status) => {
                    debug!("Closed {} (PID: {}): {:?}", self.config.name, pid, status);
                    return Ok(());
                }
                Err(Errno::EINTR) => {}
                Err(e) => return Err(wait_error(e)),
            }
        }
    }

    /// Ask a running child to terminate with SIGTERM.
    ///
    /// Does nothing once the child has been reaped.
    pub fn terminate(&mut self) -> Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        match signal::kill(pid, Signal::SIGTERM) {
            Ok(()) => {
                debug!("Sent SIGTERM to {} (PID: {})", self.config.name, pid);
                Ok(())
            }
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(ExecError::Execution(format!(
                "unable to signal {}: [{}] {}",
                self.config.name,
                e as i32,
                e.desc()
            ))),
        }
    }

    /// Descriptor of the child's stdout, for callers that multiplex on it
    pub fn handle_read(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(AsFd::as_fd)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn command(&self) -> &str {
        &self.config.command
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.pid.map(|pid| pid.as_raw() as ProcessId)
    }

    pub fn state(&self) -> ExecState {
        self.state
    }
}

fn not_open(name: &str, state: ExecState) -> ExecError {
    match state {
        ExecState::Closed => ExecError::Assert(format!("{name} is closed")),
        _ => ExecError::Assert(format!("{name} has not been opened")),
    }
}

fn wait_error(e: Errno) -> ExecError {
    ExecError::Execution(format!(
        "unable to wait on child process: [{}] {}",
        e as i32,
        e.desc()
    ))
}

fn into_io_error(e: ExecError) -> std::io::Error {
    let kind = if e.is_timeout() {
        std::io::ErrorKind::TimedOut
    } else {
        std::io::ErrorKind::Other
    };
    std::io::Error::new(kind, e)
}

impl Drop for Exec {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("Failed to close {}: {}", self.config.name, e);
        }
    }
}

impl std::fmt::Debug for Exec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exec")
            .field("name", &self.config.name)
            .field("argv", &self.argv)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish()
    }
}

impl IoRead for Exec {
    fn read(&mut self, buf: &mut [u8], block: bool) -> Result<usize> {
        Exec::read(self, buf, block)
    }

    fn eof(&mut self) -> Result<bool> {
        self.is_eof()
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

impl IoWrite for Exec {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        Exec::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer()?.flush() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.check()?;
                Err(e)
            }
        }
    }
}

impl ExecHandle for Exec {
    fn open(&mut self) -> Result<()> {
        Exec::open(self)
    }

    fn close(&mut self) -> Result<()> {
        Exec::close(self)
    }

    fn pid(&self) -> Option<ProcessId> {
        Exec::pid(self)
    }

    fn state(&self) -> ExecState {
        self.state
    }

    fn argv(&self) -> &[String] {
        &self.argv
    }
}

/// Reads wait up to the timeout for some data and return what is available.
///
/// Zero bytes means stdout has ended; the health check runs first so a child
/// that failed is reported as an error.
impl std::io::Read for Exec {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let result = self.reader().map_err(into_io_error)?.read_partial(buf);

        match result {
            Ok(0) if !buf.is_empty() => {
                self.check().map_err(into_io_error)?;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.check().map_err(into_io_error)?;
                Err(into_io_error(e))
            }
        }
    }
}

impl std::io::Write for Exec {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Exec::write(self, buf).map_err(into_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        IoWrite::flush(self).map_err(into_io_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn cat(timeout: Duration) -> Exec {
        Exec::new("cat", None, "cat", timeout).unwrap()
    }

    #[test]
    fn test_new() {
        let args = vec!["-c".to_string(), "exit 0".to_string()];
        let exec = Exec::new("sh", Some(&args), "shell", Duration::from_secs(1)).unwrap();
        assert_eq!(exec.argv(), ["sh", "-c", "exit 0"]);
        assert_eq!(exec.name(), "shell");
        assert_eq!(exec.command(), "sh");
        assert_eq!(exec.state(), ExecState::Unopened);
        assert!(exec.pid().is_none());
        assert!(exec.handle_read().is_none());
    }

    #[test]
    fn test_new_rejects_nul() {
        let args = vec!["a\0b".to_string()];
        let result = Exec::new("echo", Some(&args), "echo", Duration::from_secs(1));
        assert!(matches!(result, Err(ExecError::InvalidArgument(_))));
    }

    #[test]
    fn test_io_before_open() {
        let mut exec = cat(Duration::from_secs(1));
        let mut buf = [0u8; 4];

        let error = exec.read(&mut buf, false).unwrap_err();
        assert!(matches!(error, ExecError::Assert(_)));
        assert!(matches!(exec.write(b"x"), Err(ExecError::Assert(_))));
        assert!(matches!(exec.is_eof(), Err(ExecError::Assert(_))));

        // Nothing to release
        exec.close().unwrap();
        assert_eq!(exec.state(), ExecState::Unopened);
    }

    #[test]
    fn test_open_and_close() {
        let mut exec = cat(Duration::from_secs(2));
        exec.open().unwrap();
        assert_eq!(exec.state(), ExecState::Open);
        assert!(exec.pid().is_some());
        assert!(exec.handle_read().is_some());
        assert!(matches!(exec.open(), Err(ExecError::Assert(_))));

        exec.write(b"ping\n").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(exec.read(&mut buf, true).unwrap(), 5);
        assert_eq!(&buf, b"ping\n");
        assert!(!exec.is_eof().unwrap());

        let begin = Instant::now();
        exec.close().unwrap();
        assert!(begin.elapsed() < Duration::from_secs(2));
        assert_eq!(exec.state(), ExecState::Closed);
        assert!(exec.pid().is_none());
        assert!(exec.handle_read().is_none());

        // Second close is a no-op, further io is refused
        exec.close().unwrap();
        assert!(matches!(exec.write(b"x"), Err(ExecError::Assert(_))));
    }

    #[test]
    fn test_std_io_adapters() {
        use std::io::{Read, Write};

        let mut exec = cat(Duration::from_secs(2));
        exec.open().unwrap();

        writeln!(exec, "line").unwrap();
        Write::flush(&mut exec).unwrap();

        let mut buf = [0u8; 16];
        let n = Read::read(&mut exec, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"line\n");

        exec.close().unwrap();
    }
}
