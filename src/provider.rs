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

use derive_builder::Builder;
use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityProvider;
use crate::identity::backends::keystone::KeystoneBackend;
use crate::identity::types::IdentityBackend;
use crate::runner::{CommandExecutor, SystemExecutor, TempestRunner};
use crate::topology::TopologyResolver;
use crate::topology::backends::openstack::OpenStackBackend;
use crate::topology::types::ServiceBackend;

/// Backend drivers shared by the actions.
#[derive(Builder, Clone)]
#[builder(pattern = "owned")]
pub struct Provider {
    pub config: Config,
    identity: Arc<dyn IdentityBackend>,
    services: Arc<dyn ServiceBackend>,
    executor: Arc<dyn CommandExecutor>,
}

impl Provider {
    /// Provider talking to the real cloud and spawning real processes.
    pub fn new(config: Config) -> Self {
        let client = Client::new();
        Self {
            config,
            identity: Arc::new(KeystoneBackend::new(client.clone())),
            services: Arc::new(OpenStackBackend::new(client)),
            executor: Arc::new(SystemExecutor),
        }
    }

    pub fn identity_provider(&self) -> IdentityProvider {
        IdentityProvider::new(self.identity.clone())
    }

    pub fn topology_resolver(&self) -> TopologyResolver {
        TopologyResolver::new(
            self.config.clone(),
            self.identity_provider(),
            self.services.clone(),
        )
    }

    pub fn runner(&self) -> TempestRunner {
        TempestRunner::new(self.config.tempest.clone(), self.executor.clone())
    }
}
