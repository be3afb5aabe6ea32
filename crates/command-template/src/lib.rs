//! Immutable command templates for launching external processes
//!
//! A [`Command`] accumulates a program, arguments, environment and
//! [`Opts`] through copy-on-bake modifiers, then runs synchronously or
//! asynchronously. Success is decided by the command's accepted exit codes,
//! and the standard streams can be bound to strings, [`Buffer`]s, async
//! readers and writers, channels, the host's own streams, or another
//! command's output.
//!
//! ```no_run
//! use command_template::{Command, Opts};
//!
//! # fn main() -> command_template::Result<()> {
//! let grep = Command::new("grep").bake_opts(Opts::new().ok_exit([0, 1]));
//! let matches = grep
//!     .bake_args(["-c", "needle"])
//!     .bake_opts(Opts::new().stdin("hay\nneedle\n"))
//!     .output_blocking()?;
//! assert_eq!(matches.trim(), "1");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod command;
pub mod env;
pub mod error;
pub mod event;
pub mod io;
pub mod modifier;
pub mod opts;
mod pipeline;
pub mod process;
mod resolve;
mod stdin;
mod task;

pub use command::Command;
pub use env::{ClearEnv, Env, host_snapshot};
pub use error::{Error, Result};
pub use event::{ProcessEvent, ProcessEventType};
pub use io::{Buffer, Input, Opaque, Output, SharedReader, SharedWriter};
pub use modifier::Modifier;
pub use opts::{DEFAULT_IO, Opts};
pub use process::{ExitStatus, ProcessHandle, RunningCommand};
