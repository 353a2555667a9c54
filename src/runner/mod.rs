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

//! # Tempest runner
//!
//! Checks out the requested tempest branch under the configured root and runs
//! `tox` against it. The run output ends up in a timestamped log file which
//! is summarized into the [`ActionResult`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub mod error;
pub mod executor;

pub use error::RunnerError;
pub use executor::{CommandExecutor, CommandSpec, SystemExecutor};

use crate::config::TempestSection;
use crate::summary::{RunSummary, parse_tempest_log};

#[cfg(test)]
use mockall::mock;

#[cfg(test)]
mock! {
    pub CommandExecutor {}

    #[async_trait::async_trait]
    impl CommandExecutor for CommandExecutor {
        async fn call(&self, command: &CommandSpec) -> Result<Option<i32>, RunnerError>;
    }
}

/// Locations used by a single run of a branch.
#[derive(Clone, Debug, PartialEq)]
pub struct TempestFiles {
    /// Checkout of the branch
    pub git_dir: PathBuf,
    /// Fresh log file of this run
    pub logfile: PathBuf,
    /// Directory tox is executed in
    pub run_dir: PathBuf,
}

/// Outcome of a test run as reported to the operator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActionResult {
    #[serde(flatten)]
    pub summary: RunSummary,
    #[serde(rename = "tempest-logfile")]
    pub logfile: PathBuf,
}

#[derive(Clone)]
pub struct TempestRunner {
    config: TempestSection,
    executor: Arc<dyn CommandExecutor>,
}

impl TempestRunner {
    pub fn new(config: TempestSection, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn tempest_files(&self, branch: &str, now: DateTime<Utc>) -> TempestFiles {
        let git_dir = self.config.root.join(format!("tempest-{branch}"));
        let logfile = self
            .config
            .log_dir()
            .join(format!("run_{}.log", now.format("%Y%m%d%H%M%S")));
        let run_dir = git_dir.join("tempest");
        TempestFiles {
            git_dir,
            logfile,
            run_dir,
        }
    }

    /// Create the root and log directories when missing.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn setup_directories(&self) -> Result<(), RunnerError> {
        for dir in [self.config.root.clone(), self.config.log_dir()] {
            if !tokio::fs::try_exists(&dir)
                .await
                .map_err(|err| RunnerError::io(&dir, err))?
            {
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|err| RunnerError::io(&dir, err))?;
            }
        }
        Ok(())
    }

    /// Clone the branch unless already checked out and link the rendered
    /// config into it.
    ///
    /// A run dir without `.git` is the remains of a failed clone and is
    /// cloned again from scratch.
    #[tracing::instrument(level = "info", skip(self, files))]
    pub async fn setup_git(&self, branch: &str, files: &TempestFiles) -> Result<(), RunnerError> {
        let repo = files.run_dir.join(".git");
        if !tokio::fs::try_exists(&repo)
            .await
            .map_err(|err| RunnerError::io(&repo, err))?
        {
            if tokio::fs::try_exists(&files.run_dir)
                .await
                .map_err(|err| RunnerError::io(&files.run_dir, err))?
            {
                warn!("removing incomplete checkout {}", files.run_dir.display());
                tokio::fs::remove_dir_all(&files.run_dir)
                    .await
                    .map_err(|err| RunnerError::io(&files.run_dir, err))?;
            }
            info!("cloning {} into {}", self.config.source, files.run_dir.display());
            let run_dir = files.run_dir.to_string_lossy();
            let clone = CommandSpec::new("git")
                .args(["clone", "--branch", branch, "--depth", "1"])
                .args([self.config.source.as_str(), run_dir.as_ref()]);
            let code = self.executor.call(&clone).await?;
            if code != Some(0) {
                return Err(RunnerError::CommandFailed {
                    program: clone.program,
                    code,
                });
            }
        }

        let link = files.run_dir.join("etc").join("tempest.conf");
        // A dangling link still counts as present.
        if tokio::fs::symlink_metadata(&link).await.is_err() {
            if let Some(parent) = link.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| RunnerError::io(parent, err))?;
            }
            tokio::fs::symlink(self.config.conf_path(), &link)
                .await
                .map_err(|err| RunnerError::io(&link, err))?;
        }
        Ok(())
    }

    /// Run `tox -e <target>` with the output going into the log file.
    #[tracing::instrument(level = "info", skip(self, files))]
    pub async fn execute_tox(&self, files: &TempestFiles, target: &str) -> Result<(), RunnerError> {
        let mut tox = CommandSpec::new("tox").args(["-e", target]);
        tox.cwd = Some(files.run_dir.clone());
        tox.output = Some(files.logfile.clone());
        if let Some(proxy) = self.config.http_proxy() {
            tox.env.insert("http_proxy".into(), proxy.into());
        }
        if let Some(proxy) = self.config.https_proxy() {
            tox.env.insert("https_proxy".into(), proxy.into());
        }
        match self.executor.call(&tox).await? {
            Some(0) => info!("tox finished successfully"),
            code => warn!("tox exited with {:?}, see {}", code, files.logfile.display()),
        }
        Ok(())
    }

    /// Check out `branch`, run `target` and summarize the log.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn run_test(&self, branch: &str, target: &str) -> Result<ActionResult, RunnerError> {
        let files = self.tempest_files(branch, Utc::now());
        self.setup_directories().await?;
        self.setup_git(branch, &files).await?;
        self.execute_tox(&files, target).await?;
        let summary = parse_tempest_log(&files.logfile)?;
        Ok(ActionResult {
            summary,
            logfile: files.logfile,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mockall::Sequence;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    use super::*;

    fn section(root: &TempDir) -> TempestSection {
        TempestSection {
            root: root.path().join("tempest"),
            ..Default::default()
        }
    }

    fn runner(config: TempestSection, executor: MockCommandExecutor) -> TempestRunner {
        TempestRunner::new(config, Arc::new(executor))
    }

    #[test]
    fn test_tempest_files() {
        let sot = runner(
            TempestSection {
                root: "/var/lib/tempest".into(),
                ..Default::default()
            },
            MockCommandExecutor::new(),
        );
        let now = Utc.with_ymd_and_hms(2016, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            TempestFiles {
                git_dir: "/var/lib/tempest/tempest-stable/mitaka".into(),
                logfile: "/var/lib/tempest/logs/run_20160309140507.log".into(),
                run_dir: "/var/lib/tempest/tempest-stable/mitaka/tempest".into(),
            },
            sot.tempest_files("stable/mitaka", now)
        );
    }

    #[tokio::test]
    async fn test_setup_directories() {
        let dir = TempDir::new().unwrap();
        let config = section(&dir);
        let sot = runner(config.clone(), MockCommandExecutor::new());
        sot.setup_directories().await.unwrap();
        assert!(config.root.is_dir());
        assert!(config.log_dir().is_dir());
        // second call is a noop
        sot.setup_directories().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_git_clones_and_links() {
        let dir = TempDir::new().unwrap();
        let config = section(&dir);
        let expected_run_dir = config.root.join("tempest-master/tempest");
        let expected_args: Vec<String> = [
            "clone",
            "--branch",
            "master",
            "--depth",
            "1",
            "https://github.com/openstack/tempest",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain([expected_run_dir.to_string_lossy().to_string()])
        .collect();

        let mut executor = MockCommandExecutor::new();
        executor
            .expect_call()
            .withf(move |cmd| cmd.program == "git" && cmd.args == expected_args)
            .times(1)
            .returning(|cmd| {
                // mimic the checkout git would leave behind
                let run_dir = PathBuf::from(cmd.args.last().unwrap());
                std::fs::create_dir_all(run_dir.join(".git")).unwrap();
                std::fs::create_dir_all(run_dir.join("etc")).unwrap();
                Ok(Some(0))
            });
        let sot = runner(config.clone(), executor);
        let files = sot.tempest_files("master", Utc::now());
        sot.setup_git("master", &files).await.unwrap();

        let link = files.run_dir.join("etc/tempest.conf");
        assert_eq!(config.conf_path(), std::fs::read_link(link).unwrap());
    }

    #[tokio::test]
    async fn test_setup_git_existing_checkout() {
        let dir = TempDir::new().unwrap();
        let config = section(&dir);
        let mut executor = MockCommandExecutor::new();
        executor.expect_call().never();
        let sot = runner(config.clone(), executor);
        let files = sot.tempest_files("master", Utc::now());
        std::fs::create_dir_all(files.run_dir.join(".git")).unwrap();
        std::fs::create_dir_all(files.run_dir.join("etc")).unwrap();
        std::os::unix::fs::symlink("/elsewhere.conf", files.run_dir.join("etc/tempest.conf"))
            .unwrap();

        sot.setup_git("master", &files).await.unwrap();
        assert_eq!(
            PathBuf::from("/elsewhere.conf"),
            std::fs::read_link(files.run_dir.join("etc/tempest.conf")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_setup_git_retries_after_failed_clone() {
        let dir = TempDir::new().unwrap();
        let config = section(&dir);
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|cmd| {
                // git leaves the parent of the clone target behind
                let run_dir = PathBuf::from(cmd.args.last().unwrap());
                std::fs::create_dir_all(run_dir.parent().unwrap()).unwrap();
                Ok(Some(128))
            });
        executor
            .expect_call()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|cmd| {
                let run_dir = PathBuf::from(cmd.args.last().unwrap());
                assert!(!run_dir.exists());
                std::fs::create_dir_all(run_dir.join(".git")).unwrap();
                Ok(Some(0))
            });
        let sot = runner(config.clone(), executor);
        let files = sot.tempest_files("master", Utc::now());

        assert!(sot.setup_git("master", &files).await.is_err());
        assert!(files.git_dir.is_dir());
        sot.setup_git("master", &files).await.unwrap();
        assert_eq!(
            config.conf_path(),
            std::fs::read_link(files.run_dir.join("etc/tempest.conf")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_setup_git_replaces_incomplete_checkout() {
        let dir = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_call().times(1).returning(|cmd| {
            let run_dir = PathBuf::from(cmd.args.last().unwrap());
            assert!(!run_dir.exists());
            std::fs::create_dir_all(run_dir.join(".git")).unwrap();
            Ok(Some(0))
        });
        let sot = runner(section(&dir), executor);
        let files = sot.tempest_files("master", Utc::now());
        // link created by an earlier run into a checkout that never completed
        std::fs::create_dir_all(files.run_dir.join("etc")).unwrap();
        std::os::unix::fs::symlink("/elsewhere.conf", files.run_dir.join("etc/tempest.conf"))
            .unwrap();

        sot.setup_git("master", &files).await.unwrap();
        assert!(files.run_dir.join(".git").is_dir());
    }

    #[tokio::test]
    async fn test_setup_git_clone_failure() {
        let dir = TempDir::new().unwrap();
        let mut executor = MockCommandExecutor::new();
        executor.expect_call().returning(|_| Ok(Some(128)));
        let sot = runner(section(&dir), executor);
        let files = sot.tempest_files("nope", Utc::now());
        assert!(matches!(
            sot.setup_git("nope", &files).await,
            Err(RunnerError::CommandFailed {
                code: Some(128),
                ..
            })
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_execute_tox_with_proxies() {
        let dir = TempDir::new().unwrap();
        let config = TempestSection {
            http_proxy: Some("http://squid:3128".into()),
            https_proxy: Some("".into()),
            ..section(&dir)
        };
        let files = runner(config.clone(), MockCommandExecutor::new())
            .tempest_files("master", Utc::now());
        let expected = files.clone();
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_call()
            .withf(move |cmd| {
                cmd.program == "tox"
                    && cmd.args == ["-e", "full"]
                    && cmd.cwd.as_ref() == Some(&expected.run_dir)
                    && cmd.output.as_ref() == Some(&expected.logfile)
                    && cmd.env.get("http_proxy").map(String::as_str) == Some("http://squid:3128")
                    && !cmd.env.contains_key("https_proxy")
            })
            .returning(|_| Ok(Some(1)));
        let sot = runner(config, executor);
        // nonzero exit is not an error
        sot.execute_tox(&files, "full").await.unwrap();
        assert!(logs_contain("tox exited with Some(1)"));
    }

    #[tokio::test]
    async fn test_run_test() {
        let dir = TempDir::new().unwrap();
        let config = section(&dir);
        let mut executor = MockCommandExecutor::new();
        let mut seq = Sequence::new();
        executor
            .expect_call()
            .withf(|cmd| cmd.program == "git")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(0)));
        executor
            .expect_call()
            .withf(|cmd| cmd.program == "tox")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|cmd| {
                std::fs::write(
                    cmd.output.as_ref().unwrap(),
                    "======\nTotals\n======\n - Passed: 3\n - Failed: 1\n\nWorker Balance\n",
                )
                .unwrap();
                Ok(Some(1))
            });
        let sot = runner(config.clone(), executor);
        let result = sot.run_test("master", "smoke").await.unwrap();

        assert_eq!(Some("3"), result.summary.get("passed").map(String::as_str));
        assert_eq!(Some("1"), result.summary.get("failed").map(String::as_str));
        assert!(result.logfile.starts_with(config.log_dir()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            serde_json::Value::String(result.logfile.to_string_lossy().into()),
            json["tempest-logfile"]
        );
        assert_eq!("3", json["passed"]);
    }
}
