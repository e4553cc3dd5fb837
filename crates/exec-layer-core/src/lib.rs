//! exec-layer core - platform-independent pieces of the process execution layer
//!
//! This crate provides the error types, the exit-code category table, the
//! configuration and the stream traits shared by the platform-specific
//! implementations.

mod category;
mod config;
mod error;
mod io;
mod process;
mod wait;

pub use category::*;
pub use config::*;
pub use error::*;
pub use io::*;
pub use process::*;
pub use wait::*;
