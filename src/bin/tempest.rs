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

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result};
use std::io;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use openstack_tempest::action;
use openstack_tempest::config::Config;
use openstack_tempest::error::TempestError;
use openstack_tempest::provider::Provider;
use openstack_tempest::relation::KeystoneInfo;
use openstack_tempest::topology::types::ServiceAllowList;

/// Render the tempest configuration and run the suite against a cloud
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the tempest config file
    #[arg(short, long, default_value = "/etc/tempest/tempest.ini")]
    config: PathBuf,

    /// Path to the identity-admin relation data (json)
    #[arg(short, long)]
    relation: Option<PathBuf>,

    /// Verbosity level. Repeat to increase level.
    #[arg(short, long, global=true, action = clap::ArgAction::Count, display_order = 920)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the render context for tempest.conf
    Render {
        /// `auto` or the list of services to test
        #[arg(long, default_value = "auto")]
        service_whitelist: ServiceAllowList,
    },
    /// Render, then run the suite and summarize the result
    Run {
        /// Tempest branch to check out
        #[arg(long, default_value = "master")]
        branch: String,

        /// `auto` or the list of services to test
        #[arg(long, default_value = "auto")]
        service_whitelist: ServiceAllowList,

        /// tox environment, overriding the configured one
        #[arg(long)]
        target: Option<String>,
    },
}

fn load_relation(path: Option<&PathBuf>) -> Option<KeystoneInfo> {
    match KeystoneInfo::from_file(path?) {
        Ok(info) => Some(info),
        Err(err) => {
            warn!("relation data unusable: {}", err);
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Report> {
    color_eyre::install()?;
    let args = Args::parse();

    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(match args.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        });

    // build the tracing registry
    tracing_subscriber::registry().with(log_layer).init();

    let cfg = Config::new(args.config)?;
    let provider = Provider::new(cfg);
    let relation = load_relation(args.relation.as_ref());

    let output = match args.command {
        Command::Render { service_whitelist } => {
            let info = relation.ok_or(TempestError::RelationUnavailable)?;
            serde_json::to_string_pretty(
                &action::render(&provider, &info, &service_whitelist).await?,
            )?
        }
        Command::Run {
            branch,
            service_whitelist,
            target,
        } => serde_json::to_string_pretty(
            &action::run_tempest(
                &provider,
                relation.as_ref(),
                &branch,
                &service_whitelist,
                target.as_deref(),
            )
            .await?,
        )?,
    };
    println!("{output}");
    Ok(())
}
