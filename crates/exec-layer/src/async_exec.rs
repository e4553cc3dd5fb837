use exec_layer_core::{ExecError, ExecHandle, ExecState, ProcessId, Result};

/// Async adapter over a blocking process handle.
///
/// Each operation moves the handle onto tokio's blocking pool, so a protocol
/// layer running on the runtime never stalls a worker thread while the child
/// is slow to answer. Operations take `&mut self`, so at most one is in flight.
pub struct AsyncExec<H> {
    name: String,
    handle: Option<H>,
}

impl<H: ExecHandle + 'static> AsyncExec<H> {
    pub fn new(handle: H) -> Self {
        Self {
            name: handle.name().to_string(),
            handle: Some(handle),
        }
    }

    async fn run<T, F>(&mut self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut H) -> Result<T> + Send + 'static,
    {
        let mut handle = self.handle.take().ok_or_else(|| {
            ExecError::Execution(format!("{} was lost by an earlier failure", self.name))
        })?;

        let joined = tokio::task::spawn_blocking(move || {
            let result = op(&mut handle);
            (handle, result)
        })
        .await;

        match joined {
            Ok((handle, result)) => {
                self.handle = Some(handle);
                result
            }
            Err(e) => Err(ExecError::Execution(format!(
                "{} operation did not complete: {e}",
                self.name
            ))),
        }
    }

    pub async fn open(&mut self) -> Result<()> {
        self.run(|handle| handle.open()).await
    }

    /// Read up to `len` bytes, see [`exec_layer_core::IoRead::read`]
    pub async fn read(&mut self, len: usize, block: bool) -> Result<Vec<u8>> {
        self.run(move |handle| {
            let mut buf = vec![0u8; len];
            let n = handle.read(&mut buf, block)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    pub async fn read_line(&mut self) -> Result<String> {
        self.run(|handle| handle.read_line()).await
    }

    /// Write and flush
    pub async fn write(&mut self, data: Vec<u8>) -> Result<()> {
        self.run(move |handle| {
            handle.write(&data)?;
            handle.flush()
        })
        .await
    }

    pub async fn write_line(&mut self, line: String) -> Result<()> {
        self.run(move |handle| {
            handle.write_line(&line)?;
            handle.flush()
        })
        .await
    }

    pub async fn is_eof(&mut self) -> Result<bool> {
        self.run(|handle| handle.eof()).await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.run(|handle| handle.close()).await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process id of the child, if still owned
    pub fn pid(&self) -> Option<ProcessId> {
        self.handle.as_ref().and_then(|handle| handle.pid())
    }

    /// State of the handle, `None` if it was lost to a failed operation
    pub fn state(&self) -> Option<ExecState> {
        self.handle.as_ref().map(|handle| handle.state())
    }

    pub fn into_inner(self) -> Option<H> {
        self.handle
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::Exec;
    use std::time::Duration;

    fn shell(script: &str) -> AsyncExec<Exec> {
        let args = vec!["-c".to_string(), script.to_string()];
        AsyncExec::new(Exec::new("sh", Some(&args), "shell", Duration::from_secs(2)).unwrap())
    }

    #[tokio::test]
    async fn test_line_round_trip() {
        let mut exec = AsyncExec::new(Exec::new("cat", None, "cat", Duration::from_secs(2)).unwrap());
        assert_eq!(exec.name(), "cat");
        assert_eq!(exec.state(), Some(ExecState::Unopened));

        exec.open().await.unwrap();
        assert!(exec.pid().is_some());

        exec.write_line("archive-push".to_string()).await.unwrap();
        assert_eq!(exec.read_line().await.unwrap(), "archive-push");

        exec.write(b"raw".to_vec()).await.unwrap();
        assert_eq!(exec.read(3, true).await.unwrap(), b"raw");
        assert!(!exec.is_eof().await.unwrap());

        exec.close().await.unwrap();
        assert_eq!(exec.state(), Some(ExecState::Closed));
        assert!(exec.into_inner().is_some());
    }

    #[tokio::test]
    async fn test_child_failure_is_reported() {
        let mut exec = shell("echo 'bad request' >&2; exit 27");
        exec.open().await.unwrap();

        let error = exec.read_line().await.unwrap_err();
        let error = match error {
            // stdout may close before the child can be reaped
            ExecError::UnexpectedEof { .. } => {
                std::thread::sleep(Duration::from_millis(200));
                exec.is_eof().await.unwrap_err()
            }
            other => other,
        };

        assert_eq!(error.code(), 27);
        assert_eq!(
            error.to_string(),
            "shell terminated unexpectedly [27]: bad request"
        );

        exec.close().await.unwrap();
    }
}
