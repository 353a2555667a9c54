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

//! Data published by keystone on the `identity-admin` relation.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

use crate::identity::types::AuthVersion;

pub const DEFAULT_CREDENTIALS_DOMAIN_NAME: &str = "default";
const DEFAULT_USER_DOMAIN_NAME: &str = "admin_domain";
const DEFAULT_PROJECT_NAME: &str = "admin";
const DEFAULT_PROJECT_DOMAIN_NAME: &str = "Default";

#[derive(Error, Debug)]
pub enum RelationError {
    #[error("relation data is not readable")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("relation data is not valid json")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("relation data must be a json object")]
    NotAnObject,

    #[error("relation is missing required key {0}")]
    MissingKey(&'static str),
}

/// Connection info and administrative credentials of the identity service.
#[derive(Clone, Default, PartialEq, Serialize)]
pub struct KeystoneInfo {
    pub service_hostname: String,
    pub service_port: String,
    pub service_username: String,
    #[serde(skip_serializing)]
    pub service_password: String,
    pub service_tenant_name: String,
    pub service_region: String,
    pub service_user_domain_name: Option<String>,
    pub service_project_name: Option<String>,
    pub service_project_domain_name: Option<String>,
    pub api_version: Option<String>,
}

/// Credentials for the v2 `passwordCredentials` flow.
#[derive(Clone, PartialEq)]
pub struct AdminCredsV2 {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub region_name: String,
}

/// Credentials for the v3 password flow with project scope.
#[derive(Clone, PartialEq)]
pub struct AdminCredsV3 {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub user_domain_name: String,
    pub project_name: String,
    pub project_domain_name: String,
}

impl fmt::Debug for KeystoneInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystoneInfo")
            .field("service_hostname", &self.service_hostname)
            .field("service_port", &self.service_port)
            .field("service_username", &self.service_username)
            .field("service_tenant_name", &self.service_tenant_name)
            .field("service_region", &self.service_region)
            .field("service_user_domain_name", &self.service_user_domain_name)
            .field("service_project_name", &self.service_project_name)
            .field(
                "service_project_domain_name",
                &self.service_project_domain_name,
            )
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AdminCredsV2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredsV2")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("tenant_name", &self.tenant_name)
            .field("region_name", &self.region_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AdminCredsV3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredsV3")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_name", &self.project_name)
            .field("project_domain_name", &self.project_domain_name)
            .finish_non_exhaustive()
    }
}

impl KeystoneInfo {
    /// Read relation data from a json document.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelationError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&data)?)
    }

    pub fn from_value(value: Value) -> Result<Self, RelationError> {
        let Value::Object(data) = value else {
            return Err(RelationError::NotAnObject);
        };
        Ok(Self {
            service_hostname: required(&data, "service_hostname")?,
            service_port: required(&data, "service_port")?,
            service_username: required(&data, "service_username")?,
            service_password: required(&data, "service_password")?,
            service_tenant_name: required(&data, "service_tenant_name")?,
            service_region: required(&data, "service_region")?,
            service_user_domain_name: optional(&data, "service_user_domain_name"),
            service_project_name: optional(&data, "service_project_name"),
            service_project_domain_name: optional(&data, "service_project_domain_name"),
            api_version: optional(&data, "api_version"),
        })
    }

    /// Api version requested by the relation, unless overridden.
    pub fn api_version<'a>(&'a self, overridden: Option<&'a str>) -> &'a str {
        overridden
            .or(self.api_version.as_deref())
            .unwrap_or("2")
    }

    pub fn user_domain_name(&self) -> &str {
        self.service_user_domain_name
            .as_deref()
            .unwrap_or(DEFAULT_USER_DOMAIN_NAME)
    }

    pub fn project_name(&self) -> &str {
        self.service_project_name
            .as_deref()
            .unwrap_or(DEFAULT_PROJECT_NAME)
    }

    pub fn project_domain_name(&self) -> &str {
        self.service_project_domain_name
            .as_deref()
            .unwrap_or(DEFAULT_PROJECT_DOMAIN_NAME)
    }

    pub fn auth_url(&self, version: AuthVersion) -> String {
        format!(
            "http://{}:{}/{}",
            self.service_hostname,
            self.service_port,
            version.path_suffix()
        )
    }

    pub fn admin_creds_v2(&self) -> AdminCredsV2 {
        AdminCredsV2 {
            auth_url: self.auth_url(AuthVersion::V2),
            username: self.service_username.clone(),
            password: self.service_password.clone(),
            tenant_name: self.service_tenant_name.clone(),
            region_name: self.service_region.clone(),
        }
    }

    pub fn admin_creds_v3(&self) -> AdminCredsV3 {
        AdminCredsV3 {
            auth_url: self.auth_url(AuthVersion::V3),
            username: self.service_username.clone(),
            password: self.service_password.clone(),
            user_domain_name: self.user_domain_name().into(),
            project_name: self.project_name().into(),
            project_domain_name: self.project_domain_name().into(),
        }
    }

    /// Relation data as handed to the `tempest.conf` template.
    ///
    /// Defaults are filled in and `api_version` is the negotiated one.
    pub fn template_data(&self, api_version: AuthVersion) -> BTreeMap<String, String> {
        let mut data: BTreeMap<String, String> = [
            ("service_hostname", self.service_hostname.as_str()),
            ("service_port", self.service_port.as_str()),
            ("service_username", self.service_username.as_str()),
            ("service_password", self.service_password.as_str()),
            ("service_tenant_name", self.service_tenant_name.as_str()),
            ("service_region", self.service_region.as_str()),
            ("service_user_domain_name", self.user_domain_name()),
            (
                "default_credentials_domain_name",
                DEFAULT_CREDENTIALS_DOMAIN_NAME,
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        if let Some(val) = &self.service_project_name {
            data.insert("service_project_name".into(), val.clone());
        }
        if let Some(val) = &self.service_project_domain_name {
            data.insert("service_project_domain_name".into(), val.clone());
        }
        data.insert("api_version".into(), api_version.to_string());
        data
    }
}

fn optional(data: &Map<String, Value>, key: &str) -> Option<String> {
    match data.get(key) {
        Some(Value::String(x)) if !x.is_empty() => Some(x.clone()),
        Some(Value::Number(x)) => Some(x.to_string()),
        _ => None,
    }
}

fn required(data: &Map<String, Value>, key: &'static str) -> Result<String, RelationError> {
    optional(data, key).ok_or(RelationError::MissingKey(key))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn relation_data() -> Value {
        json!({
            "service_hostname": "kshost",
            "service_port": "5001",
            "service_username": "user1",
            "service_password": "pass1",
            "service_tenant_name": "svc",
            "service_region": "reg1"
        })
    }

    #[test]
    fn test_admin_creds_v2() {
        let sot = KeystoneInfo::from_value(relation_data()).unwrap();
        assert_eq!(
            sot.admin_creds_v2(),
            AdminCredsV2 {
                auth_url: "http://kshost:5001/v2.0".into(),
                username: "user1".into(),
                password: "pass1".into(),
                tenant_name: "svc".into(),
                region_name: "reg1".into(),
            }
        );
        assert_eq!("2", sot.api_version(None));
    }

    #[test]
    fn test_admin_creds_v3_defaults() {
        let sot = KeystoneInfo::from_value(relation_data()).unwrap();
        assert_eq!(
            sot.admin_creds_v3(),
            AdminCredsV3 {
                auth_url: "http://kshost:5001/v3".into(),
                username: "user1".into(),
                password: "pass1".into(),
                user_domain_name: "admin_domain".into(),
                project_name: "admin".into(),
                project_domain_name: "Default".into(),
            }
        );
    }

    #[test]
    fn test_numeric_values_and_override() {
        let mut data = relation_data();
        data["service_port"] = json!(35357);
        data["api_version"] = json!(3);
        data["service_project_name"] = json!("services");
        let sot = KeystoneInfo::from_value(data).unwrap();
        assert_eq!("35357", sot.service_port);
        assert_eq!("3", sot.api_version(None));
        assert_eq!("2", sot.api_version(Some("2")));
        assert_eq!("services", sot.project_name());
    }

    #[test]
    fn test_missing_key() {
        let mut data = relation_data();
        data.as_object_mut().unwrap().remove("service_password");
        match KeystoneInfo::from_value(data) {
            Err(RelationError::MissingKey(key)) => assert_eq!("service_password", key),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(matches!(
            KeystoneInfo::from_value(json!([])),
            Err(RelationError::NotAnObject)
        ));
    }

    #[test]
    fn test_template_data() {
        let sot = KeystoneInfo::from_value(relation_data())
            .unwrap()
            .template_data(AuthVersion::V3);
        assert_eq!(Some("pass1"), sot.get("service_password").map(String::as_str));
        assert_eq!(Some("3"), sot.get("api_version").map(String::as_str));
        assert_eq!(
            Some("admin_domain"),
            sot.get("service_user_domain_name").map(String::as_str)
        );
        assert_eq!(
            Some("default"),
            sot.get("default_credentials_domain_name").map(String::as_str)
        );
        assert!(!sot.contains_key("service_project_name"));
    }

    #[test]
    fn test_debug_hides_password() {
        let sot = KeystoneInfo::from_value(relation_data()).unwrap();
        for printed in [
            format!("{sot:?}"),
            format!("{:?}", sot.admin_creds_v2()),
            format!("{:?}", sot.admin_creds_v3()),
        ] {
            assert!(printed.contains("user1"));
            assert!(!printed.contains("pass1"));
        }
    }
}
