use crate::{ExecError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single child process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ExecConfig {
    /// Name to display in log and error messages
    pub name: String,

    /// Command to execute, also passed as the first argument
    pub command: String,

    /// Arguments passed after the command
    #[serde(default)]
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,

    /// Timeout for any i/o operation (read, write, shutdown wait)
    #[serde(default = "default_timeout_ms")]
    #[builder(default = "default_timeout_ms()")]
    pub timeout_ms: u64,
}

impl ExecConfig {
    pub fn builder() -> ExecConfigBuilder {
        ExecConfigBuilder::default()
    }

    /// Create a configuration from the raw construction parameters.
    ///
    /// `args` is optional; the command is always inserted as argument zero when
    /// the argument vector is built.
    pub fn new(
        command: &str,
        args: Option<&[String]>,
        name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let config = Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.map(<[String]>::to_vec).unwrap_or_default(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        };
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.is_empty() {
            return Err(ExecError::InvalidArgument(
                "command must not be empty".to_string(),
            ));
        }

        if self.name.is_empty() {
            return Err(ExecError::InvalidArgument(
                "name must not be empty".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ExecError::InvalidArgument(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if let Some(arg) = std::iter::once(&self.command)
            .chain(self.args.iter())
            .find(|arg| arg.contains('\0'))
        {
            return Err(ExecError::InvalidArgument(format!(
                "argument '{}' contains a nul byte",
                arg.escape_debug()
            )));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full argument vector with the command as the first element
    pub fn argv(&self) -> Vec<String> {
        build_argv(&self.command, Some(&self.args))
    }
}

impl ExecConfigBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self.timeout_ms {
            Some(0) => Err("timeout must be greater than zero".to_string()),
            _ => Ok(()),
        }
    }
}

/// Build an argument vector with `command` as element zero.
///
/// A missing argument list is treated as empty.
pub fn build_argv(command: &str, args: Option<&[String]>) -> Vec<String> {
    let mut argv = args.map(<[String]>::to_vec).unwrap_or_default();
    argv.insert(0, command.to_string());
    argv
}

fn default_timeout_ms() -> u64 {
    60_000
}
