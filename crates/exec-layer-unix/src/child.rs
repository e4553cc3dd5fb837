//! Child side of `fork`.
//!
//! Everything here runs between `fork` and `exec`. After the logging reset,
//! which touches tracing's thread-local state, only async-signal-safe raw
//! system calls run on data built before the fork, and nothing returns.

use exec_layer_core::ErrorCategory;
use libc::c_char;
use nix::errno::Errno;
use std::ffi::CStr;
use std::os::fd::RawFd;

/// Descriptors the child wires onto its standard streams
pub(crate) struct ChildFds {
    pub stdin: RawFd,
    pub stdout: RawFd,
    pub stderr: RawFd,
    /// Parent ends of the pipes, closed before exec
    pub parent: [RawFd; 3],
}

/// Redirect the standard streams and exec `command`.
///
/// `argv` must be null-terminated. If exec fails a message is written to the
/// new stderr and the child exits with the execute error code.
pub(crate) fn exec_child(command: &CStr, argv: &[*const c_char], fds: &ChildFds) -> ! {
    // Nothing in the child may log through the parent's subscriber
    let _logging = tracing::dispatcher::set_default(&tracing::Dispatch::none());

    // SAFETY: only async-signal-safe calls on descriptors and pointers that stay
    // valid until exec or _exit
    unsafe {
        reset_signals();

        redirect(fds.stdout, libc::STDOUT_FILENO);
        redirect(fds.stdin, libc::STDIN_FILENO);
        redirect(fds.stderr, libc::STDERR_FILENO);

        for fd in fds.parent {
            if fd > libc::STDERR_FILENO {
                libc::close(fd);
            }
        }

        libc::execvp(command.as_ptr(), argv.as_ptr());
    }

    report_exec_failure(command, Errno::last());

    // SAFETY: _exit skips atexit handlers and buffered output inherited from the parent
    unsafe { libc::_exit(ErrorCategory::Execute.code()) }
}

/// Put back the signal state a freshly started program expects
unsafe fn reset_signals() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);

        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::pthread_sigmask(libc::SIG_SETMASK, &set, std::ptr::null_mut());
    }
}

unsafe fn redirect(fd: RawFd, target: RawFd) {
    unsafe {
        if fd == target {
            // Already in place, it only has to survive exec
            let flags = libc::fcntl(fd, libc::F_GETFD);
            if flags >= 0 {
                libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC);
            }
        } else {
            libc::dup2(fd, target);
        }
    }
}

fn report_exec_failure(command: &CStr, errno: Errno) {
    let mut digits = [0u8; 12];
    let parts: [&[u8]; 7] = [
        b"unable to execute '",
        command.to_bytes(),
        b"': [",
        format_decimal(errno as i32, &mut digits),
        b"] ",
        errno.desc().as_bytes(),
        b"\n",
    ];

    for part in parts {
        write_all_raw(libc::STDERR_FILENO, part);
    }
}

fn write_all_raw(fd: RawFd, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: bytes is a valid slice for the length passed
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        if n < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        bytes = &bytes[n as usize..];
    }
}

/// Format `value` into `buf` without allocating
fn format_decimal(value: i32, buf: &mut [u8; 12]) -> &[u8] {
    let mut n = value.unsigned_abs();
    let mut pos = buf.len();

    loop {
        pos -= 1;
        buf[pos] = b'0' + (n % 10) as u8;
        n /= 10;
        if n == 0 {
            break;
        }
    }

    if value < 0 {
        pos -= 1;
        buf[pos] = b'-';
    }

    &buf[pos..]
}
