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

//! Image (glance), network (neutron) and compute (nova) REST clients.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::identity::backends::keystone::AUTH_TOKEN_HEADER;
use crate::identity::types::Session;
use crate::topology::TopologyError;
use crate::topology::types::*;

#[derive(Clone, Debug, Default)]
pub struct OpenStackBackend {
    client: Client,
}

impl OpenStackBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        session: &Session,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TopologyError> {
        debug!("GET {}", url);
        let rsp = self
            .client
            .get(url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .query(query)
            .send()
            .await
            .map_err(|err| TopologyError::http(url, err))?;
        if !rsp.status().is_success() {
            return Err(TopologyError::UnexpectedStatus {
                url: url.into(),
                status: rsp.status().as_u16(),
            });
        }
        rsp.json().await.map_err(|err| TopologyError::http(url, err))
    }
}

fn join(endpoint: &str, path: &str) -> String {
    format!("{}{}", endpoint.trim_end_matches('/'), path)
}

#[derive(Deserialize)]
struct ImagesPage {
    images: Vec<Image>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Deserialize)]
struct Routers {
    routers: Vec<Router>,
}

#[derive(Deserialize)]
struct Networks {
    networks: Vec<Network>,
}

#[derive(Deserialize)]
struct Flavors {
    flavors: Vec<Flavor>,
}

#[async_trait]
impl ServiceBackend for OpenStackBackend {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_images(
        &self,
        session: &Session,
        endpoint: &str,
    ) -> Result<Vec<Image>, TopologyError> {
        let mut images = Vec::new();
        let mut url = join(endpoint, "/v2/images");
        loop {
            let page: ImagesPage = self.get(session, &url, &[]).await?;
            let last_page = page.images.is_empty();
            images.extend(page.images);
            // `next` is relative to the service root, e.g. /v2/images?marker=..
            match page.next {
                Some(next) if !last_page => url = join(endpoint, &next),
                _ => break,
            }
        }
        Ok(images)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_routers(
        &self,
        session: &Session,
        endpoint: &str,
        name: &str,
    ) -> Result<Vec<Router>, TopologyError> {
        let url = join(endpoint, "/v2.0/routers");
        let rsp: Routers = self.get(session, &url, &[("name", name)]).await?;
        Ok(rsp.routers)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_networks(
        &self,
        session: &Session,
        endpoint: &str,
        name: &str,
    ) -> Result<Vec<Network>, TopologyError> {
        let url = join(endpoint, "/v2.0/networks");
        let rsp: Networks = self.get(session, &url, &[("name", name)]).await?;
        Ok(rsp.networks)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn list_flavors(
        &self,
        session: &Session,
        endpoint: &str,
    ) -> Result<Vec<Flavor>, TopologyError> {
        let url = join(endpoint, "/flavors");
        let rsp: Flavors = self.get(session, &url, &[]).await?;
        Ok(rsp.flavors)
    }
}
