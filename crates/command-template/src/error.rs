//! Error types for building and running commands

use thiserror::Error;

/// Unified error type for command templates and their execution
#[derive(Error, Debug)]
pub enum Error {
    /// A modifier value of a kind the builder does not understand
    #[error("unrecognized command modifier of type {type_name}: {value}")]
    UnrecognizedModifier {
        /// Rust type name of the offending value
        type_name: &'static str,
        /// Debug rendering of the offending value
        value: String,
    },

    /// An I/O endpoint value that cannot be turned into a stream
    #[error("unsupported {stream} binding of type {type_name}")]
    UnsupportedStreamBinding {
        /// Which standard stream the binding was for
        stream: &'static str,
        /// Rust type name of the offending value
        type_name: &'static str,
    },

    /// The process exited with a code outside the accepted set
    #[error("command `{program}` exited with code {code}")]
    FailureExitCode {
        /// The program that was run
        program: String,
        /// The exit code it returned
        code: i32,
    },

    /// The process was terminated by a signal and has no exit code
    #[error("command `{program}` terminated by signal {signal}")]
    SignalTerminated {
        /// The program that was run
        program: String,
        /// The signal number that terminated the process
        signal: i32,
    },

    /// Piping from a command whose stdout is already bound elsewhere
    #[error("cannot pipe from `{program}`: its output is already bound")]
    PipingNotImplemented {
        /// The upstream program
        program: String,
    },

    /// Failed to spawn a process
    #[error("failed to spawn `{program}`: {reason}")]
    SpawnFailed {
        /// The program that could not be spawned
        program: String,
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Returns the exit code if this error is a [`Error::FailureExitCode`]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::FailureExitCode { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
