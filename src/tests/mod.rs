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

use serde_json::json;

use crate::identity::types::{AuthVersion, CatalogEndpoint, CatalogEntry, Session, SessionBuilder};
use crate::relation::KeystoneInfo;


pub(crate) fn keystone_info() -> KeystoneInfo {
    KeystoneInfo::from_value(json!({
        "service_hostname": "kshost",
        "service_port": "5001",
        "service_username": "user1",
        "service_password": "pass1",
        "service_tenant_name": "svc",
        "service_region": "reg1"
    }))
    .unwrap()
}

/// v2 session carrying a catalog with image, network and compute entries.
pub(crate) fn v2_session() -> Session {
    SessionBuilder::default()
        .version(AuthVersion::V2)
        .auth_url("http://kshost:5001/v2.0")
        .token("tok")
        .user_id("uid")
        .project_id("pid")
        .region("reg1")
        .catalog(vec![
            catalog_entry("image", "glance", "http://glance:9292"),
            catalog_entry("network", "neutron", "http://neutron:9696"),
            catalog_entry("compute", "nova", "http://nova:8774/v2.1"),
        ])
        .build()
        .unwrap()
}

pub(crate) fn v3_session() -> Session {
    SessionBuilder::default()
        .version(AuthVersion::V3)
        .auth_url("http://kshost:5001/v3")
        .token("tok")
        .build()
        .unwrap()
}

pub(crate) fn catalog_entry(typ: &str, name: &str, url: &str) -> CatalogEntry {
    CatalogEntry {
        r#type: typ.into(),
        name: Some(name.into()),
        endpoints: ["public", "internal", "admin"]
            .into_iter()
            .map(|interface| CatalogEndpoint {
                interface: interface.into(),
                url: url.into(),
                region: Some("reg1".into()),
            })
            .collect(),
    }
}
