// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::runner::RunnerError;

/// External command to run to completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables added to the inherited environment
    pub env: BTreeMap<String, String>,
    /// File receiving both stdout and stderr, truncated first
    pub output: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<P: Into<String>>(program: P) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Block until the command exits and return its exit code.
    ///
    /// `None` means the process was terminated by a signal.
    async fn call(&self, command: &CommandSpec) -> Result<Option<i32>, RunnerError>;
}

/// Runs commands as child processes of the current one.
#[derive(Clone, Debug, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    #[tracing::instrument(level = "info", skip(self), fields(program = %command.program))]
    async fn call(&self, command: &CommandSpec) -> Result<Option<i32>, RunnerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).envs(&command.env);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(output) = &command.output {
            let stdout =
                std::fs::File::create(output).map_err(|err| RunnerError::io(output, err))?;
            let stderr = stdout
                .try_clone()
                .map_err(|err| RunnerError::io(output, err))?;
            cmd.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
        }
        let status = cmd.status().await.map_err(|source| RunnerError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        debug!("{} finished with {}", command.program, status);
        Ok(status.code())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_output_redirected() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("run.log");
        let mut command =
            CommandSpec::new("sh").args(["-c", "echo \"$GREETING\"; echo oops >&2; exit 3"]);
        command.env.insert("GREETING".into(), "hello".into());
        command.cwd = Some(dir.path().into());
        command.output = Some(log.clone());

        let code = SystemExecutor.call(&command).await.unwrap();
        assert_eq!(Some(3), code);
        let written = std::fs::read_to_string(&log).unwrap();
        assert!(written.contains("hello\n"));
        assert!(written.contains("oops\n"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let command = CommandSpec::new("/nonexistent/tox");
        assert!(matches!(
            SystemExecutor.call(&command).await,
            Err(RunnerError::Spawn { .. })
        ));
    }
}
