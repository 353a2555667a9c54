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

//! Keystone REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::identity::IdentityProviderError;
use crate::identity::types::*;
use crate::relation::KeystoneInfo;

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

#[derive(Clone, Debug, Default)]
pub struct KeystoneBackend {
    client: Client,
}

impl KeystoneBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn authenticate_v2(&self, info: &KeystoneInfo) -> Result<Session, IdentityProviderError> {
        let creds = info.admin_creds_v2();
        let url = format!("{}/tokens", creds.auth_url);
        let body = json!({
            "auth": {
                "passwordCredentials": {
                    "username": creds.username,
                    "password": creds.password,
                },
                "tenantName": creds.tenant_name,
            }
        });
        let rsp = send_auth(self.client.post(&url).json(&body), &creds.auth_url, &url).await?;
        let access: V2AuthResponse = decode(rsp, &url).await?;
        let access = access.access;

        let mut session = SessionBuilder::default();
        session
            .version(AuthVersion::V2)
            .auth_url(creds.auth_url)
            .token(access.token.id)
            .region(creds.region_name)
            .catalog(
                access
                    .service_catalog
                    .into_iter()
                    .map(Into::into)
                    .collect::<Vec<CatalogEntry>>(),
            );
        if let Some(expires) = access.token.expires {
            session.expires_at(expires);
        }
        if let Some(tenant) = access.token.tenant {
            session.project_id(tenant.id);
        }
        if let Some(user) = access.user {
            session.user_id(user.id);
        }
        Ok(session.build()?)
    }

    async fn authenticate_v3(&self, info: &KeystoneInfo) -> Result<Session, IdentityProviderError> {
        let creds = info.admin_creds_v3();
        let url = format!("{}/auth/tokens", creds.auth_url);
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": creds.username,
                            "password": creds.password,
                            "domain": {"name": creds.user_domain_name},
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": creds.project_name,
                        "domain": {"name": creds.project_domain_name},
                    }
                }
            }
        });
        let rsp = send_auth(self.client.post(&url).json(&body), &creds.auth_url, &url).await?;
        let token = rsp
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .ok_or(IdentityProviderError::SubjectTokenMissing)?
            .to_str()
            .map_err(|_| IdentityProviderError::InvalidHeader)?
            .to_string();
        let data: V3AuthResponse = decode(rsp, &url).await?;

        let mut session = SessionBuilder::default();
        session
            .version(AuthVersion::V3)
            .auth_url(creds.auth_url)
            .token(token)
            .region(info.service_region.clone())
            .catalog(data.token.catalog);
        if let Some(expires) = data.token.expires_at {
            session.expires_at(expires);
        }
        if let Some(project) = data.token.project {
            session.project_id(project.id);
        }
        if let Some(user) = data.token.user {
            session.user_id(user.id);
        }
        Ok(session.build()?)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, IdentityProviderError> {
        debug!("GET {}", url);
        let rsp = self
            .client
            .get(url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .query(query)
            .send()
            .await
            .map_err(|err| IdentityProviderError::http(url, err))?;
        decode(check_status(rsp, url)?, url).await
    }

    fn ec2_url(session: &Session) -> Result<String, IdentityProviderError> {
        let user_id = session
            .user_id
            .as_ref()
            .ok_or(IdentityProviderError::SessionIncomplete("user id"))?;
        Ok(format!(
            "{}/users/{}/credentials/OS-EC2",
            session.auth_url, user_id
        ))
    }
}

#[async_trait]
impl IdentityBackend for KeystoneBackend {
    #[tracing::instrument(level = "debug", skip(self, info))]
    async fn authenticate(
        &self,
        version: AuthVersion,
        info: &KeystoneInfo,
    ) -> Result<Session, IdentityProviderError> {
        match version {
            AuthVersion::V2 => self.authenticate_v2(info).await,
            AuthVersion::V3 => self.authenticate_v3(info).await,
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_services(
        &self,
        session: &Session,
        params: &ServiceListParameters,
    ) -> Result<Vec<Service>, IdentityProviderError> {
        match session.version {
            AuthVersion::V2 => {
                let url = format!("{}/OS-KSADM/services", session.auth_url);
                let rsp: V2ServicesResponse = self.get(session, &url, &[]).await?;
                Ok(rsp
                    .services
                    .into_iter()
                    .filter(|svc| params.r#type.as_ref().is_none_or(|x| *x == svc.r#type))
                    .collect())
            }
            AuthVersion::V3 => {
                let url = format!("{}/services", session.auth_url);
                let mut query = Vec::new();
                if let Some(typ) = &params.r#type {
                    query.push(("type", typ.as_str()));
                }
                let rsp: V3ServicesResponse = self.get(session, &url, &query).await?;
                Ok(rsp.services)
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_endpoints(
        &self,
        session: &Session,
        params: &EndpointListParameters,
    ) -> Result<Vec<Endpoint>, IdentityProviderError> {
        if session.version != AuthVersion::V3 {
            return Err(IdentityProviderError::UnsupportedVersion(session.version));
        }
        let url = format!("{}/endpoints", session.auth_url);
        let mut query = Vec::new();
        if let Some(service_id) = &params.service_id {
            query.push(("service_id", service_id.as_str()));
        }
        if let Some(interface) = &params.interface {
            query.push(("interface", interface.as_str()));
        }
        let rsp: V3EndpointsResponse = self.get(session, &url, &query).await?;
        Ok(rsp.endpoints)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_ec2_credentials(
        &self,
        session: &Session,
    ) -> Result<Vec<Ec2Credentials>, IdentityProviderError> {
        if session.version != AuthVersion::V2 {
            return Err(IdentityProviderError::UnsupportedVersion(session.version));
        }
        let url = Self::ec2_url(session)?;
        let rsp: Ec2ListResponse = self.get(session, &url, &[]).await?;
        Ok(rsp.credentials)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn create_ec2_credentials(
        &self,
        session: &Session,
    ) -> Result<Ec2Credentials, IdentityProviderError> {
        if session.version != AuthVersion::V2 {
            return Err(IdentityProviderError::UnsupportedVersion(session.version));
        }
        let url = Self::ec2_url(session)?;
        let project_id = session
            .project_id
            .as_ref()
            .ok_or(IdentityProviderError::SessionIncomplete("project id"))?;
        let rsp = self
            .client
            .post(&url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .json(&json!({"tenant_id": project_id}))
            .send()
            .await
            .map_err(|err| IdentityProviderError::http(&url, err))?;
        let created: Ec2CreateResponse = decode(check_status(rsp, &url)?, &url).await?;
        Ok(created.credential)
    }
}

/// Send an authentication request mapping 401 to a rejection.
async fn send_auth(
    request: RequestBuilder,
    auth_url: &str,
    url: &str,
) -> Result<Response, IdentityProviderError> {
    let rsp = request
        .send()
        .await
        .map_err(|err| IdentityProviderError::http(url, err))?;
    if rsp.status() == StatusCode::UNAUTHORIZED {
        return Err(IdentityProviderError::AuthRejected {
            url: auth_url.into(),
        });
    }
    check_status(rsp, url)
}

fn check_status(rsp: Response, url: &str) -> Result<Response, IdentityProviderError> {
    if rsp.status().is_success() {
        Ok(rsp)
    } else {
        Err(IdentityProviderError::UnexpectedStatus {
            url: url.into(),
            status: rsp.status().as_u16(),
        })
    }
}

async fn decode<T: DeserializeOwned>(rsp: Response, url: &str) -> Result<T, IdentityProviderError> {
    rsp.json()
        .await
        .map_err(|err| IdentityProviderError::http(url, err))
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
struct V2AuthResponse {
    access: V2Access,
}

#[derive(Deserialize)]
struct V2Access {
    token: V2Token,
    #[serde(default, rename = "serviceCatalog")]
    service_catalog: Vec<V2CatalogEntry>,
    #[serde(default)]
    user: Option<IdRef>,
}

#[derive(Deserialize)]
struct V2Token {
    id: String,
    #[serde(default)]
    expires: Option<DateTime<Utc>>,
    #[serde(default)]
    tenant: Option<IdRef>,
}

#[derive(Deserialize)]
struct V2CatalogEntry {
    r#type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    endpoints: Vec<V2Endpoint>,
}

#[derive(Deserialize)]
struct V2Endpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(default, rename = "publicURL")]
    public_url: Option<String>,
    #[serde(default, rename = "internalURL")]
    internal_url: Option<String>,
    #[serde(default, rename = "adminURL")]
    admin_url: Option<String>,
}

impl From<V2CatalogEntry> for CatalogEntry {
    fn from(value: V2CatalogEntry) -> Self {
        let mut endpoints = Vec::new();
        for ep in value.endpoints {
            for (interface, url) in [
                ("public", ep.public_url),
                ("internal", ep.internal_url),
                ("admin", ep.admin_url),
            ] {
                if let Some(url) = url {
                    endpoints.push(CatalogEndpoint {
                        interface: interface.into(),
                        url,
                        region: ep.region.clone(),
                    });
                }
            }
        }
        Self {
            r#type: value.r#type,
            name: value.name,
            endpoints,
        }
    }
}

#[derive(Deserialize)]
struct V3AuthResponse {
    token: V3Token,
}

#[derive(Deserialize)]
struct V3Token {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    project: Option<IdRef>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct V2ServicesResponse {
    #[serde(rename = "OS-KSADM:services")]
    services: Vec<Service>,
}

#[derive(Deserialize)]
struct V3ServicesResponse {
    services: Vec<Service>,
}

#[derive(Deserialize)]
struct V3EndpointsResponse {
    endpoints: Vec<Endpoint>,
}

#[derive(Deserialize)]
struct Ec2ListResponse {
    credentials: Vec<Ec2Credentials>,
}

#[derive(Deserialize)]
struct Ec2CreateResponse {
    credential: Ec2Credentials,
}

#[cfg(test)]
mod tests {
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use std::collections::HashMap;

    use super::*;
    use crate::tests::cloud::serve;

    async fn keystone_info_for(router: Router) -> KeystoneInfo {
        let address = serve(router).await;
        KeystoneInfo::from_value(json!({
            "service_hostname": address.ip().to_string(),
            "service_port": address.port(),
            "service_username": "admin",
            "service_password": "secret",
            "service_tenant_name": "admin",
            "service_region": "RegionOne"
        }))
        .unwrap()
    }

    async fn v2_tokens(Json(body): Json<Value>) -> impl IntoResponse {
        if body["auth"]["passwordCredentials"]["password"] != "secret"
            || body["auth"]["tenantName"] != "admin"
        {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({
            "access": {
                "token": {
                    "id": "v2token",
                    "expires": "2030-01-01T00:00:00Z",
                    "tenant": {"id": "tenant1", "name": "admin"}
                },
                "user": {"id": "user1", "name": "admin"},
                "serviceCatalog": [{
                    "type": "image",
                    "name": "glance",
                    "endpoints": [{
                        "region": "RegionOne",
                        "publicURL": "http://glance:9292",
                        "internalURL": "http://glance-int:9292",
                        "adminURL": "http://glance-adm:9292"
                    }]
                }]
            }
        }))
        .into_response()
    }

    async fn v3_tokens(Json(body): Json<Value>) -> impl IntoResponse {
        let user = &body["auth"]["identity"]["password"]["user"];
        assert_eq!("admin_domain", user["domain"]["name"]);
        assert_eq!("admin", body["auth"]["scope"]["project"]["name"]);
        assert_eq!(
            "Default",
            body["auth"]["scope"]["project"]["domain"]["name"]
        );
        (
            StatusCode::CREATED,
            [("X-Subject-Token", "v3token")],
            Json(json!({
                "token": {
                    "expires_at": "2030-01-01T00:00:00.000000Z",
                    "user": {"id": "user3"},
                    "project": {"id": "project3"},
                    "catalog": [{
                        "type": "compute",
                        "name": "nova",
                        "endpoints": [{
                            "interface": "public",
                            "url": "http://nova:8774/v2.1",
                            "region": "RegionOne"
                        }]
                    }]
                }
            })),
        )
    }

    fn require_token(headers: &HeaderMap, expected: &str) {
        assert_eq!(expected, headers.get(AUTH_TOKEN_HEADER).unwrap());
    }

    #[tokio::test]
    async fn test_authenticate_v2() {
        let info = keystone_info_for(Router::new().route("/v2.0/tokens", post(v2_tokens))).await;
        let backend = KeystoneBackend::default();
        let sot = backend.authenticate(AuthVersion::V2, &info).await.unwrap();
        assert_eq!(AuthVersion::V2, sot.version);
        assert_eq!("v2token", sot.token);
        assert_eq!(info.auth_url(AuthVersion::V2), sot.auth_url);
        assert_eq!(Some("user1".into()), sot.user_id);
        assert_eq!(Some("tenant1".into()), sot.project_id);
        assert_eq!(Some("RegionOne".into()), sot.region);
        assert!(sot.expires_at.is_some());
        assert_eq!(
            vec![
                CatalogEndpoint {
                    interface: "public".into(),
                    url: "http://glance:9292".into(),
                    region: Some("RegionOne".into()),
                },
                CatalogEndpoint {
                    interface: "internal".into(),
                    url: "http://glance-int:9292".into(),
                    region: Some("RegionOne".into()),
                },
                CatalogEndpoint {
                    interface: "admin".into(),
                    url: "http://glance-adm:9292".into(),
                    region: Some("RegionOne".into()),
                },
            ],
            sot.catalog[0].endpoints
        );
    }

    #[tokio::test]
    async fn test_authenticate_v2_rejected() {
        let mut info =
            keystone_info_for(Router::new().route("/v2.0/tokens", post(v2_tokens))).await;
        info.service_password = "wrong".into();
        let backend = KeystoneBackend::default();
        let err = backend
            .authenticate(AuthVersion::V2, &info)
            .await
            .unwrap_err();
        assert!(err.is_auth_rejected());
    }

    #[tokio::test]
    async fn test_authenticate_v2_unavailable() {
        let info = keystone_info_for(Router::new()).await;
        let backend = KeystoneBackend::default();
        assert!(matches!(
            backend.authenticate(AuthVersion::V2, &info).await,
            Err(IdentityProviderError::UnexpectedStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_authenticate_v3() {
        let info = keystone_info_for(Router::new().route("/v3/auth/tokens", post(v3_tokens))).await;
        let backend = KeystoneBackend::default();
        let sot = backend.authenticate(AuthVersion::V3, &info).await.unwrap();
        assert_eq!(AuthVersion::V3, sot.version);
        assert_eq!("v3token", sot.token);
        assert_eq!(Some("user3".into()), sot.user_id);
        assert_eq!(Some("project3".into()), sot.project_id);
        assert_eq!("compute", sot.catalog[0].r#type);
    }

    #[tokio::test]
    async fn test_list_services_v2() {
        let router = Router::new()
            .route("/v2.0/tokens", post(v2_tokens))
            .route(
                "/v2.0/OS-KSADM/services",
                get(|headers: HeaderMap| async move {
                    require_token(&headers, "v2token");
                    Json(json!({"OS-KSADM:services": [
                        {"id": "1", "name": "glance", "type": "image"},
                        {"id": "2", "name": "nova", "type": "compute"}
                    ]}))
                }),
            );
        let info = keystone_info_for(router).await;
        let backend = KeystoneBackend::default();
        let session = backend.authenticate(AuthVersion::V2, &info).await.unwrap();
        let all = backend
            .list_services(&session, &ServiceListParameters::default())
            .await
            .unwrap();
        assert_eq!(2, all.len());
        assert!(all.iter().all(|svc| svc.enabled));
        let compute = backend
            .list_services(
                &session,
                &ServiceListParameters {
                    r#type: Some("compute".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(vec![Some("nova".to_string())], compute.into_iter().map(|x| x.name).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_list_services_and_endpoints_v3() {
        let router = Router::new()
            .route("/v3/auth/tokens", post(v3_tokens))
            .route(
                "/v3/services",
                get(
                    |headers: HeaderMap, Query(query): Query<HashMap<String, String>>| async move {
                        require_token(&headers, "v3token");
                        assert_eq!(Some("image"), query.get("type").map(String::as_str));
                        Json(json!({"services": [
                            {"id": "svc1", "name": "glance", "type": "image", "enabled": true}
                        ]}))
                    },
                ),
            )
            .route(
                "/v3/endpoints",
                get(|Query(query): Query<HashMap<String, String>>| async move {
                    assert_eq!(Some("svc1"), query.get("service_id").map(String::as_str));
                    assert_eq!(Some("public"), query.get("interface").map(String::as_str));
                    Json(json!({"endpoints": [{
                        "id": "ep1",
                        "service_id": "svc1",
                        "interface": "public",
                        "url": "http://glance:9292",
                        "region": "RegionOne"
                    }]}))
                }),
            );
        let info = keystone_info_for(router).await;
        let backend = KeystoneBackend::default();
        let session = backend.authenticate(AuthVersion::V3, &info).await.unwrap();
        let services = backend
            .list_services(
                &session,
                &ServiceListParameters {
                    r#type: Some("image".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!("svc1", services[0].id);
        let endpoints = backend
            .list_endpoints(
                &session,
                &EndpointListParameters {
                    service_id: Some("svc1".into()),
                    interface: Some("public".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!("http://glance:9292", endpoints[0].url);
    }

    #[tokio::test]
    async fn test_ec2_credentials() {
        let router = Router::new()
            .route("/v2.0/tokens", post(v2_tokens))
            .route(
                "/v2.0/users/{user_id}/credentials/OS-EC2",
                get(|Path(user_id): Path<String>| async move {
                    assert_eq!("user1", user_id);
                    Json(json!({"credentials": []}))
                })
                .post(|Json(body): Json<Value>| async move {
                    assert_eq!("tenant1", body["tenant_id"]);
                    Json(json!({"credential": {
                        "access": "ac2",
                        "secret": "st2",
                        "tenant_id": "tenant1",
                        "user_id": "user1"
                    }}))
                }),
            );
        let info = keystone_info_for(router).await;
        let backend = KeystoneBackend::default();
        let session = backend.authenticate(AuthVersion::V2, &info).await.unwrap();
        assert!(backend.list_ec2_credentials(&session).await.unwrap().is_empty());
        assert_eq!(
            backend.create_ec2_credentials(&session).await.unwrap(),
            Ec2Credentials {
                access_token: "ac2".into(),
                secret_token: "st2".into(),
            }
        );
    }
}
