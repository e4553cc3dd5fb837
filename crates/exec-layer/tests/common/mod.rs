#![allow(dead_code)]

use exec_layer::{Exec, ExecError};
use std::sync::Once;
use std::time::{Duration, Instant};
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per-test and only printed for failing tests unless run
/// with `--nocapture`. Enable levels with e.g. `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Handle running `sh -c <script>`
pub fn shell(name: &str, script: &str, timeout: Duration) -> Exec {
    let args = vec!["-c".to_string(), script.to_string()];
    Exec::new("sh", Some(&args), name, timeout).unwrap()
}

pub fn cat(timeout: Duration) -> Exec {
    Exec::new("cat", None, "cat", timeout).unwrap()
}

/// Poll the handle until the health check reports the child's death.
///
/// A child closes its pipes before it can be reaped, so the first reads after
/// it exits may only see eof.
pub fn wait_for_failure(exec: &mut Exec) -> ExecError {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut buf = [0u8; 256];

    while Instant::now() < deadline {
        if let Err(e) = exec.read(&mut buf, false) {
            return e;
        }
        if let Err(e) = exec.is_eof() {
            return e;
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    panic!("{} did not fail within 5s", exec.name());
}
