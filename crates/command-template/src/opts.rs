//! Execution options: working directory, stream bindings and exit codes

use std::path::PathBuf;

use crate::io::{Input, Output};

/// Execution options for a command.
///
/// Baking options is a selective overlay: only fields that are `Some` replace
/// the corresponding field of the template. A `None` field never clears what
/// an earlier bake set, so a working directory cannot be reset to "inherit"
/// once it has been baked in.
#[derive(Debug, Clone, Default)]
pub struct Opts {
    /// Working directory; `None` inherits the host's
    pub cwd: Option<PathBuf>,
    /// Standard input binding; unset reads from the null device
    pub stdin: Option<Input>,
    /// Standard output binding; unset discards output
    pub stdout: Option<Output>,
    /// Standard error binding; unset discards output
    pub stderr: Option<Output>,
    /// Exit codes treated as success. Zero is only accepted if listed.
    pub ok_exit: Option<Vec<i32>>,
}

/// Options binding all three standard streams to the host process's own,
/// for commands that should behave like an interactive subprocess.
pub const DEFAULT_IO: Opts = Opts {
    cwd: None,
    stdin: Some(Input::Inherit),
    stdout: Some(Output::Inherit),
    stderr: Some(Output::Inherit),
    ok_exit: None,
};

impl Opts {
    /// Create empty options (overlaying them changes nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Bind standard input
    pub fn stdin(mut self, input: impl Into<Input>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Bind standard output
    pub fn stdout(mut self, output: impl Into<Output>) -> Self {
        self.stdout = Some(output.into());
        self
    }

    /// Bind standard error
    pub fn stderr(mut self, output: impl Into<Output>) -> Self {
        self.stderr = Some(output.into());
        self
    }

    /// Set the accepted exit codes
    pub fn ok_exit(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.ok_exit = Some(codes.into_iter().collect());
        self
    }

    /// Overlay the `Some` fields of `other` onto `self`
    pub(crate) fn overlay(&mut self, other: Opts) {
        if other.cwd.is_some() {
            self.cwd = other.cwd;
        }
        if other.stdin.is_some() {
            self.stdin = other.stdin;
        }
        if other.stdout.is_some() {
            self.stdout = other.stdout;
        }
        if other.stderr.is_some() {
            self.stderr = other.stderr;
        }
        if other.ok_exit.is_some() {
            self.ok_exit = other.ok_exit;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Buffer;

    #[test]
    fn test_overlay_keeps_unset_fields() {
        let mut opts = Opts::new().cwd("/tmp");
        opts.overlay(Opts::new().ok_exit([1]));

        assert_eq!(opts.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
        assert_eq!(opts.ok_exit, Some(vec![1]));
    }

    #[test]
    fn test_overlay_replaces_set_fields() {
        let first = Buffer::new();
        let second = Buffer::new();
        let mut opts = Opts::new().stdout(first);
        opts.overlay(Opts::new().stdout(second.clone()));

        match opts.stdout {
            Some(Output::Buffer(buf)) => assert!(buf.ptr_eq(&second)),
            other => panic!("unexpected stdout: {other:?}"),
        }
    }

    #[test]
    fn test_default_io_inherits() {
        let opts = DEFAULT_IO;
        assert!(matches!(opts.stdin, Some(Input::Inherit)));
        assert!(matches!(opts.stdout, Some(Output::Inherit)));
        assert!(matches!(opts.stderr, Some(Output::Inherit)));
        assert!(opts.ok_exit.is_none());
    }
}
