use crate::{ExecError, Result};

/// Readable byte stream with timeout and eof detection
pub trait IoRead {
    /// Read into `buf`.
    ///
    /// With `block` the call waits until the buffer is full or the stream ends.
    /// Without it, only what is already available is returned, possibly nothing.
    fn read(&mut self, buf: &mut [u8], block: bool) -> Result<usize>;

    /// Has the end of the stream been reached?
    fn eof(&mut self) -> Result<bool>;

    /// Name used in error messages
    fn name(&self) -> &str;

    /// Read a single line, without the trailing newline
    fn read_line(&mut self) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            if self.read(&mut byte, true)? == 0 {
                self.eof()?;

                return Err(ExecError::UnexpectedEof {
                    name: self.name().to_string(),
                });
            }

            if byte[0] == b'\n' {
                break;
            }

            line.push(byte[0]);
        }

        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

/// Writable byte stream
pub trait IoWrite {
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Write a line, adding the trailing newline
    fn write_line(&mut self, line: &str) -> Result<()> {
        self.write(line.as_bytes())?;
        self.write(b"\n")
    }
}
