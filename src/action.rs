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

//! # Operator actions
//!
//! `render` collects everything the `tempest.conf` template needs into a
//! [`RenderContext`] and stores it next to the rendered config. `run-tempest`
//! renders and then runs the suite.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::TempestError;
use crate::identity::types::{AuthVersion, Ec2Credentials, NegotiationStrategy};
use crate::provider::Provider;
use crate::relation::KeystoneInfo;
use crate::runner::ActionResult;
use crate::topology::types::{ContextFragment, Lookup, ResolvedTopology, ServiceAllowList};

/// Values the `tempest.conf` template is rendered from.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RenderContext {
    pub keystone_info: BTreeMap<String, String>,
    pub keystone_auth_url: String,
    pub api_version: String,
    pub ec2_creds: Option<Ec2Credentials>,
    pub image_info: BTreeMap<String, String>,
    pub network_info: BTreeMap<String, String>,
    pub compute_info: BTreeMap<String, String>,
    pub service_info: BTreeMap<String, String>,
}

fn fragment<T: ContextFragment>(lookup: &Lookup<T>) -> BTreeMap<String, String> {
    let mut context = BTreeMap::new();
    lookup.extend_context(&mut context);
    context
}

impl RenderContext {
    fn new(
        info: &KeystoneInfo,
        version: AuthVersion,
        topology: &ResolvedTopology,
        allow_list: &ServiceAllowList,
    ) -> Self {
        Self {
            keystone_info: info.template_data(version),
            keystone_auth_url: info.auth_url(version),
            api_version: version.to_string(),
            ec2_creds: None,
            image_info: fragment(&topology.image),
            network_info: fragment(&topology.network),
            compute_info: fragment(&topology.compute),
            service_info: topology.service_flags(allow_list),
        }
    }
}

/// Collect the render context from the cloud.
///
/// An identity service that cannot be reached yields a context without any
/// topology rather than an error.
#[tracing::instrument(level = "info", skip(provider, info))]
pub async fn build_context(
    provider: &Provider,
    info: &KeystoneInfo,
    allow_list: &ServiceAllowList,
) -> RenderContext {
    let requested = info.api_version(provider.config.identity.api_version());
    let identity = provider.identity_provider();
    let session = match identity
        .negotiate(info, &NegotiationStrategy::for_requested(requested))
        .await
    {
        Ok(session) => session,
        Err(err) => {
            warn!("identity service not ready, deferring: {}", err);
            return RenderContext::new(
                info,
                AuthVersion::from_requested(requested),
                &ResolvedTopology::unavailable(err.to_string()),
                allow_list,
            );
        }
    };

    let topology = provider.topology_resolver().resolve(&session).await;
    let mut context = RenderContext::new(info, session.version, &topology, allow_list);
    context.ec2_creds = match identity.ec2_credentials(&session).await {
        Ok(creds) => creds,
        Err(err) => {
            warn!("ec2 credentials not available: {}", err);
            None
        }
    };
    context
}

/// Build the render context and store it as json under the tempest root.
#[tracing::instrument(level = "info", skip(provider, info))]
pub async fn render(
    provider: &Provider,
    info: &KeystoneInfo,
    allow_list: &ServiceAllowList,
) -> Result<RenderContext, TempestError> {
    let context = build_context(provider, info, allow_list).await;
    let root = &provider.config.tempest.root;
    tokio::fs::create_dir_all(root)
        .await
        .map_err(|source| TempestError::Io {
            path: root.clone(),
            source,
        })?;
    let path = provider.config.tempest.context_path();
    tokio::fs::write(&path, serde_json::to_vec_pretty(&context)?)
        .await
        .map_err(|source| TempestError::Io {
            path: path.clone(),
            source,
        })?;
    info!("render context written to {}", path.display());
    Ok(context)
}

/// Render and run `target` (the configured default when `None`) of `branch`.
///
/// The suite only runs once `tempest.conf` has been rendered from the
/// context.
#[tracing::instrument(level = "info", skip(provider, info))]
pub async fn run_tempest(
    provider: &Provider,
    info: Option<&KeystoneInfo>,
    branch: &str,
    allow_list: &ServiceAllowList,
    target: Option<&str>,
) -> Result<ActionResult, TempestError> {
    let info = info.ok_or(TempestError::RelationUnavailable)?;
    render(provider, info, allow_list).await?;
    let conf = provider.config.tempest.conf_path();
    if !tokio::fs::try_exists(&conf)
        .await
        .map_err(|source| TempestError::Io {
            path: conf.clone(),
            source,
        })?
    {
        return Err(TempestError::ConfigurationMissing { path: conf });
    }
    let target = target.unwrap_or(&provider.config.tempest.target);
    Ok(provider.runner().run_test(branch, target).await?)
}
