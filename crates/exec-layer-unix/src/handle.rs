//! Timeout-aware streams over raw pipe descriptors.
//!
//! Both ends are switched to non-blocking mode and every wait goes through
//! `poll(2)`, so no call blocks longer than the configured timeout without
//! making progress.

use exec_layer_core::{ExecError, IoRead, IoWrite, Result};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::time::{Duration, Instant};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;
const DRAIN_CHUNK_SIZE: usize = 4096;

/// Create a pipe with close-on-exec set on both ends.
///
/// Returns `(read end, write end)`.
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
))]
pub(crate) fn pipe_cloexec() -> std::io::Result<(OwnedFd, OwnedFd)> {
    Ok(nix::unistd::pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "dragonfly",
    target_os = "netbsd",
    target_os = "openbsd"
)))]
pub(crate) fn pipe_cloexec() -> std::io::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd, FcntlArg::F_SETFD(nix::fcntl::FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> nix::Result<()> {
    let flags = OFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

/// Wait until `fd` reports one of `events` or `timeout` passes.
///
/// Returns false on timeout. A zero timeout checks once without waiting.
fn wait_ready(fd: BorrowedFd<'_>, events: PollFlags, timeout: Duration) -> nix::Result<bool> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        // poll() takes milliseconds, round up so short waits are not lost
        let millis = remaining.as_micros().div_ceil(1000).min(u128::from(u16::MAX)) as u16;
        let mut fds = [PollFd::new(fd, events)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) if Instant::now() >= deadline => return Ok(false),
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => return Ok(true),
            Err(e) => return Err(e),
        }
    }
}

/// Readable end of a pipe
#[derive(Debug)]
pub struct HandleRead {
    name: String,
    file: File,
    timeout: Duration,
    eof: bool,
}

impl HandleRead {
    pub fn new(name: impl Into<String>, fd: OwnedFd, timeout: Duration) -> Result<Self> {
        let name = name.into();
        set_nonblocking(fd.as_fd()).map_err(|e| {
            ExecError::kernel(format!("unable to set '{name}' non-blocking"), e)
        })?;

        Ok(Self {
            name,
            file: File::from(fd),
            timeout,
            eof: false,
        })
    }

    /// Read into `buf`.
    ///
    /// Blocking reads keep going until the buffer is full or eof, with each
    /// wait for data bounded by the timeout. Non-blocking reads return whatever
    /// is available right now, which may be nothing.
    pub fn read(&mut self, buf: &mut [u8], block: bool) -> Result<usize> {
        if !block {
            return self.read_once(buf, Duration::ZERO);
        }

        let mut total = 0;
        while total < buf.len() && !self.eof {
            total += self.read_once(&mut buf[total..], self.timeout)?;
        }

        Ok(total)
    }

    /// Wait up to the timeout for data, then return what a single read yields
    pub fn read_partial(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_once(buf, self.timeout)
    }

    /// Collect everything that can be read without waiting
    pub fn drain(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut chunk = [0u8; DRAIN_CHUNK_SIZE];

        loop {
            let n = self.read_once(&mut chunk, Duration::ZERO)?;
            if n == 0 {
                return Ok(data);
            }
            data.extend_from_slice(&chunk[..n]);
        }
    }

    fn read_once(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize> {
        if self.eof || buf.is_empty() {
            return Ok(0);
        }

        loop {
            let ready = wait_ready(self.file.as_fd(), PollFlags::POLLIN, wait).map_err(|e| {
                ExecError::Read {
                    name: self.name.clone(),
                    source: e.into(),
                }
            })?;

            if !ready {
                if wait.is_zero() {
                    return Ok(0);
                }

                return Err(ExecError::ReadTimeout {
                    name: self.name.clone(),
                    timeout: wait,
                });
            }

            match self.file.read(buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(0);
                }
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if wait.is_zero() {
                        return Ok(0);
                    }
                }
                Err(e) => {
                    return Err(ExecError::Read {
                        name: self.name.clone(),
                        source: e,
                    });
                }
            }
        }
    }

    /// True once a read has returned zero bytes
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}

impl AsFd for HandleRead {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl IoRead for HandleRead {
    fn read(&mut self, buf: &mut [u8], block: bool) -> Result<usize> {
        HandleRead::read(self, buf, block)
    }

    fn eof(&mut self) -> Result<bool> {
        Ok(self.eof)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Writable end of a pipe with an output buffer
#[derive(Debug)]
pub struct HandleWrite {
    name: String,
    file: File,
    timeout: Duration,
    buffer: Vec<u8>,
}

impl HandleWrite {
    pub fn new(name: impl Into<String>, fd: OwnedFd, timeout: Duration) -> Result<Self> {
        let name = name.into();
        set_nonblocking(fd.as_fd()).map_err(|e| {
            ExecError::kernel(format!("unable to set '{name}' non-blocking"), e)
        })?;

        Ok(Self {
            name,
            file: File::from(fd),
            timeout,
            buffer: Vec::with_capacity(WRITE_BUFFER_SIZE),
        })
    }

    /// Buffer `data`, writing out to the pipe once the buffer fills up
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.buffer.len() + data.len() > WRITE_BUFFER_SIZE {
            self.flush()?;
        }

        if data.len() >= WRITE_BUFFER_SIZE {
            return self.write_out(data);
        }

        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Write out everything buffered.
    ///
    /// Buffered data is discarded if the write fails.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut buffer = std::mem::take(&mut self.buffer);
        let result = self.write_out(&buffer);
        buffer.clear();
        self.buffer = buffer;

        result
    }

    fn write_out(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < data.len() {
            let ready = wait_ready(self.file.as_fd(), PollFlags::POLLOUT, self.timeout)
                .map_err(|e| ExecError::Write {
                    name: self.name.clone(),
                    source: e.into(),
                })?;

            if !ready {
                return Err(ExecError::WriteTimeout {
                    name: self.name.clone(),
                    timeout: self.timeout,
                });
            }

            match self.file.write(&data[written..]) {
                Ok(0) => {
                    return Err(ExecError::Write {
                        name: self.name.clone(),
                        source: ErrorKind::WriteZero.into(),
                    });
                }
                Ok(n) => written += n,
                Err(e) if matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock) => {}
                Err(e) => {
                    return Err(ExecError::Write {
                        name: self.name.clone(),
                        source: e,
                    });
                }
            }
        }

        Ok(())
    }

    /// Bytes buffered but not yet written to the pipe
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl AsFd for HandleWrite {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

impl IoWrite for HandleWrite {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        HandleWrite::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        HandleWrite::flush(self)
    }
}
