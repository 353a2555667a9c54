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

//! Deploy and drive the OpenStack Tempest suite against a live cloud.
//!
//! The crate discovers the cloud topology through the keystone
//! administrative relation, produces the context a `tempest.conf` is
//! rendered from, runs the suite through `tox` and summarizes the result.

pub mod action;
pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod provider;
pub mod relation;
pub mod runner;
pub mod summary;
pub mod topology;

#[cfg(test)]
mod tests;
