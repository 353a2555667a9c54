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

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::identity::IdentityProviderError;
use crate::provider::ProviderBuilderError;
use crate::relation::RelationError;
use crate::runner::RunnerError;
use crate::summary::SummaryError;
use crate::topology::TopologyError;

/// Errors surfaced by the actions
#[derive(Debug, Error)]
pub enum TempestError {
    #[error("The identity-admin interface is not available - bailing")]
    RelationUnavailable,

    #[error("tempest configuration {} has not been rendered", path.display())]
    ConfigurationMissing { path: PathBuf },

    #[error(transparent)]
    Relation {
        #[from]
        source: RelationError,
    },

    #[error(transparent)]
    Identity {
        #[from]
        source: IdentityProviderError,
    },

    #[error(transparent)]
    Catalog {
        #[from]
        source: CatalogError,
    },

    #[error(transparent)]
    Topology {
        #[from]
        source: TopologyError,
    },

    #[error(transparent)]
    Runner {
        #[from]
        source: RunnerError,
    },

    #[error(transparent)]
    Summary {
        #[from]
        source: SummaryError,
    },

    #[error("provider setup failed: {}", source)]
    ProviderBuilder {
        #[from]
        source: ProviderBuilderError,
    },

    #[error("cannot serialize the render context")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error("cannot write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
