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

//! Summary of a finished tempest run.
//!
//! The runner closes its output with a block like
//!
//! ```text
//! ======
//! Totals
//! ======
//! Ran: 62 tests in 154.0000 sec.
//!  - Passed: 21
//!  - Skipped: 41
//!  - Expected Fail: 0
//!  - Unexpected Success: 0
//!  - Failed: 0
//! Sum of execute time for each test: 183.4211 sec.
//!
//! ==============
//! Worker Balance
//! ==============
//! ```
//!
//! Every ` - Label: value` line of the `Totals` block becomes one entry.

use regex::Regex;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

const SECTION_START: &str = "Totals";
const SECTION_END: &str = "Worker Balance";

static SUMMARY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.*)- (.*?):\s+(.*)").unwrap());

#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("cannot read log file {path}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Normalized label to value
pub type RunSummary = BTreeMap<String, String>;

/// Summarize the log file of a finished run.
#[tracing::instrument(level = "debug")]
pub fn parse_tempest_log(path: &Path) -> Result<RunSummary, SummaryError> {
    let io_err = |source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    summarize(BufReader::new(file)).map_err(io_err)
}

/// Summarize run output read line by line.
pub fn summarize<R: BufRead>(reader: R) -> Result<RunSummary, std::io::Error> {
    let mut summary = RunSummary::new();
    let mut in_section = false;
    // Test output may carry arbitrary bytes; decode each line lossily.
    for line in reader.split(b'\n') {
        let raw = line?;
        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.strip_suffix('\r').unwrap_or(&decoded);
        match line.trim() {
            SECTION_START => in_section = true,
            SECTION_END => in_section = false,
            _ if in_section => {
                if let Some(caps) = SUMMARY_LINE.captures(line) {
                    let key = caps[2].replace(' ', "-").replace(':', "").to_lowercase();
                    summary.insert(key, caps[3].to_string());
                }
            }
            _ => {}
        }
    }
    Ok(summary)
}
