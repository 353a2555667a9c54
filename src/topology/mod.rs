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

//! Cloud topology resolution.
//!
//! Cross references the names configured by the operator with what the
//! image, network and compute services report. Every lookup is independent:
//! a failing service only blanks its own part of the result.

#[cfg(test)]
use mockall::mock;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

pub mod backends;
pub mod error;
pub mod types;

use crate::catalog::{Interface, resolve_endpoint};
use crate::config::Config;
use crate::identity::IdentityProvider;
use crate::identity::types::Session;
pub use crate::topology::error::TopologyError;
use crate::topology::types::*;

#[cfg(test)]
mock! {
    pub ServiceBackend {}

    #[async_trait::async_trait]
    impl ServiceBackend for ServiceBackend {
        async fn list_images(
            &self,
            session: &Session,
            endpoint: &str,
        ) -> Result<Vec<Image>, TopologyError>;

        async fn list_routers(
            &self,
            session: &Session,
            endpoint: &str,
            name: &str,
        ) -> Result<Vec<Router>, TopologyError>;

        async fn list_networks(
            &self,
            session: &Session,
            endpoint: &str,
            name: &str,
        ) -> Result<Vec<Network>, TopologyError>;

        async fn list_flavors(
            &self,
            session: &Session,
            endpoint: &str,
        ) -> Result<Vec<Flavor>, TopologyError>;
    }
}

#[derive(Clone)]
pub struct TopologyResolver {
    config: Config,
    identity: IdentityProvider,
    backend_driver: Arc<dyn ServiceBackend>,
}

fn matches_name(configured: Option<&str>, name: Option<&str>) -> bool {
    configured.is_some() && configured == name
}

impl TopologyResolver {
    pub fn new(
        config: Config,
        identity: IdentityProvider,
        backend_driver: Arc<dyn ServiceBackend>,
    ) -> Self {
        Self {
            config,
            identity,
            backend_driver,
        }
    }

    /// Resolve everything the catalog offers. Never fails; see [`Lookup`].
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn resolve(&self, session: &Session) -> ResolvedTopology {
        let present = match self.identity.present_services(session).await {
            Ok(present) => present,
            Err(err) => {
                info!("identity service not ready, deferring: {}", err);
                return ResolvedTopology::unavailable(err.to_string());
            }
        };

        let image: Lookup<ImageInfo> = if present.iter().any(|x| x == "glance") {
            log_deferred("image", self.image_info(session).await).into()
        } else {
            Lookup::Absent
        };
        let network: Lookup<NetworkInfo> = if present.iter().any(|x| x == "neutron") {
            log_deferred("network", self.network_info(session).await).into()
        } else {
            Lookup::Absent
        };
        let compute: Lookup<ComputeInfo> = if present.iter().any(|x| x == "nova") {
            log_deferred("compute", self.compute_info(session).await).into()
        } else {
            Lookup::Absent
        };

        ResolvedTopology {
            present_services: Lookup::Resolved(present),
            image,
            network,
            compute,
        }
    }

    /// Image ids for the configured image names.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn image_info(&self, session: &Session) -> Result<ImageInfo, TopologyError> {
        let cfg = &self.config.image;
        let endpoint =
            resolve_endpoint(self.identity.backend(), session, "image", Interface::Public).await?;
        let mut image_info = ImageInfo {
            image_ssh_user: cfg.ssh_user().map(Into::into),
            image_alt_ssh_user: cfg.alt_ssh_user().map(Into::into),
            ..Default::default()
        };
        for image in self.backend_driver.list_images(session, &endpoint).await? {
            if matches_name(cfg.name(), image.name.as_deref()) {
                image_info.image_id = Some(image.id.clone());
            }
            if matches_name(cfg.alt_name(), image.name.as_deref()) {
                image_info.image_alt_id = Some(image.id);
            }
        }
        if cfg.name().is_some() && image_info.image_id.is_none() {
            info!("image {:?} not found", cfg.name());
        }
        Ok(image_info)
    }

    /// Router and public network ids for the configured names.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn network_info(&self, session: &Session) -> Result<NetworkInfo, TopologyError> {
        let cfg = &self.config.network;
        let endpoint = resolve_endpoint(
            self.identity.backend(),
            session,
            "network",
            Interface::Public,
        )
        .await?;
        let mut network_info = NetworkInfo::default();

        if let Some(name) = cfg.router_name() {
            match self
                .backend_driver
                .list_routers(session, &endpoint, name)
                .await?
                .into_iter()
                .next()
            {
                Some(router) => network_info.router_id = Some(router.id),
                None => info!("router {} not found", name),
            }
        }
        if let Some(name) = cfg.network_name() {
            match self
                .backend_driver
                .list_networks(session, &endpoint, name)
                .await?
                .into_iter()
                .next()
            {
                Some(network) => network_info.public_network_id = Some(network.id),
                None => info!("network {} not found", name),
            }
        }
        if let Some(name) = cfg.floating_network_name() {
            if self
                .backend_driver
                .list_networks(session, &endpoint, name)
                .await?
                .is_empty()
            {
                info!("floating network {} not found", name);
            } else {
                network_info.floating_network_name = Some(name.into());
            }
        }
        Ok(network_info)
    }

    /// Compute endpoint and flavor ids for the configured flavor names.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn compute_info(&self, session: &Session) -> Result<ComputeInfo, TopologyError> {
        let cfg = &self.config.compute;
        let endpoint = resolve_endpoint(
            self.identity.backend(),
            session,
            "compute",
            Interface::Public,
        )
        .await?;
        let url = Url::parse(&endpoint)?;
        let mut compute_info = ComputeInfo {
            nova_base: Some(format!(
                "{}://{}",
                url.scheme(),
                url.host_str().unwrap_or_default()
            )),
            nova_endpoint: Some(endpoint.clone()),
            ..Default::default()
        };
        for flavor in self.backend_driver.list_flavors(session, &endpoint).await? {
            if matches_name(cfg.flavor_name(), flavor.name.as_deref()) {
                compute_info.flavor_id = Some(flavor.id.clone());
            }
            if matches_name(cfg.flavor_alt_name(), flavor.name.as_deref()) {
                compute_info.flavor_alt_id = Some(flavor.id);
            }
        }
        if cfg.flavor_name().is_some() && compute_info.flavor_id.is_none() {
            info!("flavor {:?} not found", cfg.flavor_name());
        }
        Ok(compute_info)
    }
}

fn log_deferred<T>(kind: &str, result: Result<T, TopologyError>) -> Result<T, TopologyError> {
    if let Err(err) = &result {
        warn!("{} service not ready, deferring: {}", kind, err);
    }
    result
}
