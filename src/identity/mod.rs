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

use chrono::Utc;
#[cfg(test)]
use mockall::mock;
use std::sync::Arc;
use tracing::{info, warn};

pub mod backends;
pub mod error;
pub mod types;

pub use crate::identity::error::IdentityProviderError;
use crate::identity::types::*;
use crate::relation::KeystoneInfo;

#[derive(Clone)]
pub struct IdentityProvider {
    backend_driver: Arc<dyn IdentityBackend>,
}

#[cfg(test)]
mock! {
    pub IdentityBackend {}

    #[async_trait::async_trait]
    impl IdentityBackend for IdentityBackend {
        async fn authenticate(
            &self,
            version: AuthVersion,
            info: &KeystoneInfo,
        ) -> Result<Session, IdentityProviderError>;

        async fn list_services(
            &self,
            session: &Session,
            params: &ServiceListParameters,
        ) -> Result<Vec<Service>, IdentityProviderError>;

        async fn list_endpoints(
            &self,
            session: &Session,
            params: &EndpointListParameters,
        ) -> Result<Vec<Endpoint>, IdentityProviderError>;

        async fn list_ec2_credentials(
            &self,
            session: &Session,
        ) -> Result<Vec<Ec2Credentials>, IdentityProviderError>;

        async fn create_ec2_credentials(
            &self,
            session: &Session,
        ) -> Result<Ec2Credentials, IdentityProviderError>;
    }
}

impl IdentityProvider {
    pub fn new(backend_driver: Arc<dyn IdentityBackend>) -> Self {
        Self { backend_driver }
    }

    pub fn backend(&self) -> &dyn IdentityBackend {
        self.backend_driver.as_ref()
    }

    /// Obtain a session trying the strategy versions in order.
    #[tracing::instrument(level = "info", skip(self, info), fields(host = %info.service_hostname))]
    pub async fn negotiate(
        &self,
        info: &KeystoneInfo,
        strategy: &NegotiationStrategy,
    ) -> Result<Session, IdentityProviderError> {
        let mut last_err = IdentityProviderError::NoAttempts;
        for version in strategy.attempts() {
            match self.backend_driver.authenticate(*version, info).await {
                Ok(session) => {
                    info!("authenticated with identity api v{}", version);
                    return Ok(session);
                }
                Err(err) if err.is_auth_rejected() => {
                    warn!("identity api v{} rejected the credentials", version);
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    /// Names of the enabled services registered in the catalog.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn present_services(
        &self,
        session: &Session,
    ) -> Result<Vec<String>, IdentityProviderError> {
        if session.is_expired(Utc::now()) {
            return Err(IdentityProviderError::SessionExpired);
        }
        Ok(self
            .backend_driver
            .list_services(session, &ServiceListParameters::default())
            .await?
            .into_iter()
            .filter(|svc| svc.enabled)
            .filter_map(|svc| svc.name)
            .collect())
    }

    /// EC2 credentials of the admin user, creating a pair when none exists.
    ///
    /// Only the v2 api hands these out; v3 sessions get `None`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn ec2_credentials(
        &self,
        session: &Session,
    ) -> Result<Option<Ec2Credentials>, IdentityProviderError> {
        if session.version != AuthVersion::V2 {
            return Ok(None);
        }
        let current = self.backend_driver.list_ec2_credentials(session).await?;
        if let Some(creds) = current.into_iter().next() {
            return Ok(Some(creds));
        }
        Ok(Some(
            self.backend_driver.create_ec2_credentials(session).await?,
        ))
    }
}
