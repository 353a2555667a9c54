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
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::IdentityProviderError;
use crate::relation::KeystoneInfo;

/// Identity api version
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum AuthVersion {
    #[default]
    #[serde(rename = "2")]
    V2,
    #[serde(rename = "3")]
    V3,
}

impl AuthVersion {
    /// Url path the version is served under.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            Self::V2 => "v2.0",
            Self::V3 => "v3",
        }
    }

    /// Anything newer than "2" selects v3. Unparsable versions fall back to v2.
    pub fn from_requested(requested: &str) -> Self {
        let major = requested
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .next()
            .and_then(|x| x.parse::<u32>().ok());
        match major {
            Some(x) if x > 2 => Self::V3,
            _ => Self::V2,
        }
    }
}

impl fmt::Display for AuthVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => write!(f, "2"),
            Self::V3 => write!(f, "3"),
        }
    }
}

/// Ordered list of versions tried until one is not rejected.
///
/// Only an authorization rejection moves on to the next version; any other
/// failure ends the negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct NegotiationStrategy {
    attempts: Vec<AuthVersion>,
}

impl NegotiationStrategy {
    pub fn new(attempts: Vec<AuthVersion>) -> Self {
        Self { attempts }
    }

    /// v3 when explicitly requested, otherwise v2 falling back to v3.
    ///
    /// Keystone may run v3 only without advertising it on the relation.
    pub fn for_requested(requested: &str) -> Self {
        match AuthVersion::from_requested(requested) {
            AuthVersion::V3 => Self::new(vec![AuthVersion::V3]),
            AuthVersion::V2 => Self::new(vec![AuthVersion::V2, AuthVersion::V3]),
        }
    }

    pub fn attempts(&self) -> &[AuthVersion] {
        &self.attempts
    }
}

/// Endpoint of a service in the token catalog
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// Service entry in the token catalog
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub r#type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// Authenticated session against the identity service.
///
/// Owned by the caller and handed by reference to everything talking to the
/// cloud. Sessions are not refreshed; once expired a new one must be
/// negotiated.
#[derive(Builder, Clone, Default, PartialEq)]
#[builder(setter(strip_option, into))]
pub struct Session {
    pub version: AuthVersion,
    /// Versioned identity url the session was obtained from
    pub auth_url: String,
    pub token: String,
    #[builder(default)]
    pub user_id: Option<String>,
    #[builder(default)]
    pub project_id: Option<String>,
    #[builder(default)]
    pub region: Option<String>,
    #[builder(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[builder(default)]
    pub catalog: Vec<CatalogEntry>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|x| x <= now)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("version", &self.version)
            .field("auth_url", &self.auth_url)
            .field("user_id", &self.user_id)
            .field("project_id", &self.project_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Service registered in the identity catalog
#[derive(Builder, Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[builder(setter(strip_option, into))]
pub struct Service {
    #[builder(default)]
    pub id: String,
    #[builder(default)]
    #[serde(default)]
    pub name: Option<String>,
    pub r#type: String,
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceListParameters {
    pub r#type: Option<String>,
}

/// Endpoint registered in the identity catalog
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Endpoint {
    #[serde(default)]
    pub id: String,
    pub service_id: String,
    pub interface: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndpointListParameters {
    pub service_id: Option<String>,
    pub interface: Option<String>,
}

/// EC2 style credentials of the admin user
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Ec2Credentials {
    #[serde(rename(deserialize = "access"))]
    pub access_token: String,
    #[serde(rename(deserialize = "secret"))]
    pub secret_token: String,
}

fn default_true() -> bool {
    true
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    /// Authenticate with the given api version
    async fn authenticate(
        &self,
        version: AuthVersion,
        info: &KeystoneInfo,
    ) -> Result<Session, IdentityProviderError>;

    /// List services
    async fn list_services(
        &self,
        session: &Session,
        params: &ServiceListParameters,
    ) -> Result<Vec<Service>, IdentityProviderError>;

    /// List endpoints
    async fn list_endpoints(
        &self,
        session: &Session,
        params: &EndpointListParameters,
    ) -> Result<Vec<Endpoint>, IdentityProviderError>;

    /// List EC2 credentials of the session user
    async fn list_ec2_credentials(
        &self,
        session: &Session,
    ) -> Result<Vec<Ec2Credentials>, IdentityProviderError>;

    /// Create EC2 credentials for the session user and project
    async fn create_ec2_credentials(
        &self,
        session: &Session,
    ) -> Result<Ec2Credentials, IdentityProviderError>;
}
