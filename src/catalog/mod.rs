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

//! Endpoint resolution against the identity catalog.

pub mod error;

pub use crate::catalog::error::CatalogError;
use crate::identity::types::{
    AuthVersion, EndpointListParameters, IdentityBackend, ServiceListParameters, Session,
};

/// Interface class of an endpoint
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Interface {
    #[default]
    Public,
    Internal,
    Admin,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Admin => "admin",
        }
    }
}

/// Resolve the url of a service type for the interface.
///
/// v2 sessions read the catalog shipped with the token. v3 sessions look
/// the service up by type and then its endpoint by service id and interface.
#[tracing::instrument(level = "debug", skip(backend))]
pub async fn resolve_endpoint(
    backend: &dyn IdentityBackend,
    session: &Session,
    service_type: &str,
    interface: Interface,
) -> Result<String, CatalogError> {
    match session.version {
        AuthVersion::V2 => from_token_catalog(session, service_type, interface),
        AuthVersion::V3 => {
            let service = backend
                .list_services(
                    session,
                    &ServiceListParameters {
                        r#type: Some(service_type.into()),
                    },
                )
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| CatalogError::ServiceNotFound(service_type.into()))?;
            backend
                .list_endpoints(
                    session,
                    &EndpointListParameters {
                        service_id: Some(service.id),
                        interface: Some(interface.as_str().into()),
                    },
                )
                .await?
                .into_iter()
                .next()
                .map(|ep| ep.url)
                .ok_or_else(|| CatalogError::EndpointNotFound {
                    service_type: service_type.into(),
                    interface: interface.as_str().into(),
                })
        }
    }
}

fn from_token_catalog(
    session: &Session,
    service_type: &str,
    interface: Interface,
) -> Result<String, CatalogError> {
    let entry = session
        .catalog
        .iter()
        .find(|entry| entry.r#type == service_type)
        .ok_or_else(|| CatalogError::ServiceNotFound(service_type.into()))?;
    let mut candidates = entry
        .endpoints
        .iter()
        .filter(|ep| ep.interface == interface.as_str());
    let first = candidates.clone().next();
    // Prefer the session region when the service spans several.
    candidates
        .find(|ep| session.region.is_some() && ep.region == session.region)
        .or(first)
        .map(|ep| ep.url.clone())
        .ok_or_else(|| CatalogError::EndpointNotFound {
            service_type: service_type.into(),
            interface: interface.as_str().into(),
        })
}
