//! Request-scoped description of an external command

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// An external command to run: program, ordered arguments, environment
/// mapping, and optional working directory.
///
/// The environment is always built from scratch for one invocation; the
/// spawned process never inherits the gateway's own environment, so
/// per-request secrets cannot leak between concurrent requests.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments and an empty
    /// environment.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable. Keys are unique; setting a key twice
    /// keeps the latest value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Ordered argument list.
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Environment mapping handed to the spawned process.
    pub fn env_map(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Working directory, if one was set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args_in_order() {
        let inv = Invocation::new("gfls").arg("-l").args(["-a", "/tmp"]);
        assert_eq!(inv.program(), "gfls");
        assert_eq!(inv.arg_list(), &["-l", "-a", "/tmp"]);
    }

    #[test]
    fn test_env_keys_are_unique() {
        let inv = Invocation::new("tool").env("KEY", "first").env("KEY", "second");
        assert_eq!(inv.env_map().len(), 1);
        assert_eq!(inv.env_map().get("KEY").map(String::as_str), Some("second"));
    }

    #[test]
    fn test_environment_starts_empty() {
        let inv = Invocation::new("tool");
        assert!(inv.env_map().is_empty());
        assert!(inv.working_dir().is_none());
    }

    #[test]
    fn test_working_dir() {
        let inv = Invocation::new("tool").current_dir("/var/tmp");
        assert_eq!(inv.working_dir(), Some(Path::new("/var/tmp")));
    }
}
