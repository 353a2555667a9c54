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
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::str::FromStr;

use crate::identity::types::Session;
use crate::topology::TopologyError;

/// Services tempest knows how to exercise.
///
/// `neutron` is listed twice; the flag mapping collapses the duplicate.
pub const TEMPEST_CANDIDATES: [&str; 13] = [
    "ceilometer",
    "cinder",
    "glance",
    "heat",
    "horizon",
    "ironic",
    "neutron",
    "nova",
    "sahara",
    "swift",
    "trove",
    "zaqar",
    "neutron",
];

/// Outcome of one topology lookup.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    /// The backing service answered
    Resolved(T),
    /// The backing service is not registered in the catalog
    Absent,
    /// The backing service could not be queried this cycle
    Unavailable(String),
}

impl<T> Lookup<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Self::Resolved(x) => Some(x),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Lookup<T> {
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(x) => Self::Resolved(x),
            Err(err) => Self::Unavailable(err.to_string()),
        }
    }
}

/// Write the known attributes into a flat context.
pub trait ContextFragment {
    fn extend_context(&self, context: &mut BTreeMap<String, String>);
}

fn put(context: &mut BTreeMap<String, String>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        context.insert(key.into(), value.clone());
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ImageInfo {
    pub image_id: Option<String>,
    pub image_alt_id: Option<String>,
    pub image_ssh_user: Option<String>,
    pub image_alt_ssh_user: Option<String>,
}

impl ContextFragment for ImageInfo {
    fn extend_context(&self, context: &mut BTreeMap<String, String>) {
        put(context, "image_id", &self.image_id);
        put(context, "image_alt_id", &self.image_alt_id);
        put(context, "image_ssh_user", &self.image_ssh_user);
        put(context, "image_alt_ssh_user", &self.image_alt_ssh_user);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkInfo {
    pub router_id: Option<String>,
    pub public_network_id: Option<String>,
    pub floating_network_name: Option<String>,
}

impl ContextFragment for NetworkInfo {
    fn extend_context(&self, context: &mut BTreeMap<String, String>) {
        put(context, "router_id", &self.router_id);
        put(context, "public_network_id", &self.public_network_id);
        put(context, "floating_network_name", &self.floating_network_name);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComputeInfo {
    pub nova_base: Option<String>,
    pub nova_endpoint: Option<String>,
    pub flavor_id: Option<String>,
    pub flavor_alt_id: Option<String>,
}

impl ContextFragment for ComputeInfo {
    fn extend_context(&self, context: &mut BTreeMap<String, String>) {
        put(context, "nova_base", &self.nova_base);
        put(context, "nova_endpoint", &self.nova_endpoint);
        put(context, "flavor_id", &self.flavor_id);
        put(context, "flavor_alt_id", &self.flavor_alt_id);
    }
}

impl<T: ContextFragment> ContextFragment for Lookup<T> {
    fn extend_context(&self, context: &mut BTreeMap<String, String>) {
        if let Self::Resolved(x) = self {
            x.extend_context(context);
        }
    }
}

/// Result of one resolution pass.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTopology {
    pub present_services: Lookup<Vec<String>>,
    pub image: Lookup<ImageInfo>,
    pub network: Lookup<NetworkInfo>,
    pub compute: Lookup<ComputeInfo>,
}

impl ResolvedTopology {
    /// Nothing could be resolved this cycle.
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        let reason = reason.into();
        Self {
            present_services: Lookup::Unavailable(reason.clone()),
            image: Lookup::Unavailable(reason.clone()),
            network: Lookup::Unavailable(reason.clone()),
            compute: Lookup::Unavailable(reason),
        }
    }

    /// Flat attribute mapping; unresolved attributes are left out.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        self.image.extend_context(&mut context);
        self.network.extend_context(&mut context);
        self.compute.extend_context(&mut context);
        context
    }

    /// `"true"`/`"false"` flag for every tempest candidate.
    pub fn service_flags(&self, allow_list: &ServiceAllowList) -> BTreeMap<String, String> {
        let present = self
            .present_services
            .resolved()
            .map(Vec::as_slice)
            .unwrap_or_default();
        service_flags(present, allow_list)
    }
}

/// Which services the test run exercises.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ServiceAllowList {
    /// Every candidate registered in the catalog
    #[default]
    Auto,
    /// Exactly the listed services, registered or not
    Explicit(Vec<String>),
}

impl FromStr for ServiceAllowList {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "auto" {
            return Ok(Self::Auto);
        }
        Ok(Self::Explicit(
            s.split(|c: char| c.is_whitespace() || c == ',')
                .filter(|x| !x.is_empty())
                .map(Into::into)
                .collect(),
        ))
    }
}

pub fn service_flags(present: &[String], allow_list: &ServiceAllowList) -> BTreeMap<String, String> {
    let enabled: Vec<&str> = match allow_list {
        ServiceAllowList::Auto => present
            .iter()
            .map(String::as_str)
            .filter(|svc| TEMPEST_CANDIDATES.contains(svc))
            .collect(),
        ServiceAllowList::Explicit(list) => list.iter().map(String::as_str).collect(),
    };
    TEMPEST_CANDIDATES
        .iter()
        .map(|svc| (svc.to_string(), enabled.contains(svc).to_string()))
        .collect()
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Flavor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Image, network and compute apis the topology is read from.
#[async_trait]
pub trait ServiceBackend: Send + Sync {
    /// List all images
    async fn list_images(
        &self,
        session: &Session,
        endpoint: &str,
    ) -> Result<Vec<Image>, TopologyError>;

    /// List routers with the given name
    async fn list_routers(
        &self,
        session: &Session,
        endpoint: &str,
        name: &str,
    ) -> Result<Vec<Router>, TopologyError>;

    /// List networks with the given name
    async fn list_networks(
        &self,
        session: &Session,
        endpoint: &str,
        name: &str,
    ) -> Result<Vec<Network>, TopologyError>;

    /// List all flavors
    async fn list_flavors(
        &self,
        session: &Session,
        endpoint: &str,
    ) -> Result<Vec<Flavor>, TopologyError>;
}
