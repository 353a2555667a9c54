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

use crate::identity::types::{AuthVersion, SessionBuilderError};

#[derive(Error, Debug)]
pub enum IdentityProviderError {
    /// The identity service refused the credentials
    #[error("authentication rejected by {url}")]
    AuthRejected { url: String },

    #[error("identity request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("identity service at {url} answered with status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("missing x-subject-token header")]
    SubjectTokenMissing,

    #[error("invalid header")]
    InvalidHeader,

    #[error("no authentication method was attempted")]
    NoAttempts,

    #[error("operation is not supported with identity api v{0}")]
    UnsupportedVersion(AuthVersion),

    #[error("session expired")]
    SessionExpired,

    #[error("session is missing the {0}")]
    SessionIncomplete(&'static str),

    #[error(transparent)]
    SessionBuilder {
        #[from]
        source: SessionBuilderError,
    },
}

impl IdentityProviderError {
    pub fn http<U: Into<String>>(url: U, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.into(),
            source,
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}
