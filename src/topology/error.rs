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

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::identity::IdentityProviderError;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error(transparent)]
    Catalog {
        #[from]
        source: CatalogError,
    },

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
    },

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("invalid endpoint url")]
    Url {
        #[from]
        source: url::ParseError,
    },
}

impl TopologyError {
    pub fn http<U: Into<String>>(url: U, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }
}
