use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::QuotaError;
use crate::executor::{CommandOutput, DirOwner, SystemExecutor};

/// Canned host for reader tests. Commands are keyed by `program arg arg..`.
#[derive(Default)]
pub struct FakeExecutor {
    pub commands: HashMap<String, CommandOutput>,
    pub missing_tools: Vec<String>,
    pub existing: Vec<PathBuf>,
    pub xattrs: HashMap<(PathBuf, String), Vec<u8>>,
    pub children: HashMap<PathBuf, Vec<DirOwner>>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeExecutor {
    pub fn with_command(mut self, line: &str, status: i32, stdout: &str) -> Self {
        self.commands.insert(
            line.to_string(),
            CommandOutput {
                status,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        );
        self
    }

    pub fn with_xattr(mut self, path: &str, name: &str, value: &str) -> Self {
        let path = PathBuf::from(path);
        if !self.existing.contains(&path) {
            self.existing.push(path.clone());
        }
        self.xattrs
            .insert((path, name.to_string()), value.as_bytes().to_vec());
        self
    }
}

impl SystemExecutor for FakeExecutor {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, QuotaError> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.borrow_mut().push(line.clone());
        if self.missing_tools.iter().any(|tool| tool == program) {
            return Err(QuotaError::ExternalToolUnavailable {
                tool: program.to_string(),
            });
        }
        Ok(self.commands.get(&line).cloned().unwrap_or(CommandOutput {
            status: 1,
            stdout: String::new(),
            stderr: format!("no canned output for `{line}`"),
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.existing.iter().any(|known| known == path)
    }

    fn read_xattr(&self, path: &Path, name: &str) -> Result<Option<Vec<u8>>, QuotaError> {
        Ok(self
            .xattrs
            .get(&(path.to_path_buf(), name.to_string()))
            .cloned())
    }

    fn child_owners(&self, path: &Path) -> Result<Vec<DirOwner>, QuotaError> {
        Ok(self.children.get(path).cloned().unwrap_or_default())
    }
}
