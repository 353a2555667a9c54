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

use config::{File, FileFormat};
use eyre::Report;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize, Clone)]
pub struct Config {
    /// Tempest checkout and run settings
    #[serde(default)]
    pub tempest: TempestSection,

    /// Identity negotiation overrides
    #[serde(default)]
    pub identity: IdentitySection,

    /// Images tempest boots
    #[serde(default)]
    pub image: ImageSection,

    /// Router and networks used by the network scenarios
    #[serde(default)]
    pub network: NetworkSection,

    /// Flavors used by the compute scenarios
    #[serde(default)]
    pub compute: ComputeSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TempestSection {
    /// Directory holding checkouts, logs and the rendered config
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Git URL of the tempest source
    #[serde(default = "default_source")]
    pub source: String,

    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,

    /// tox environment executed by the run action
    #[serde(default = "default_target")]
    pub target: String,
}

impl Default for TempestSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            source: default_source(),
            http_proxy: None,
            https_proxy: None,
            target: default_target(),
        }
    }
}

impl TempestSection {
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Path of the rendered `tempest.conf`
    pub fn conf_path(&self) -> PathBuf {
        self.root.join("tempest.conf")
    }

    /// Path the render context is written to
    pub fn context_path(&self) -> PathBuf {
        self.root.join("tempest.json")
    }

    pub fn http_proxy(&self) -> Option<&str> {
        non_empty(&self.http_proxy)
    }

    pub fn https_proxy(&self) -> Option<&str> {
        non_empty(&self.https_proxy)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct IdentitySection {
    /// Overrides the api version advertised on the relation
    pub api_version: Option<String>,
}

impl IdentitySection {
    pub fn api_version(&self) -> Option<&str> {
        non_empty(&self.api_version)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ImageSection {
    pub name: Option<String>,
    pub alt_name: Option<String>,
    pub ssh_user: Option<String>,
    pub alt_ssh_user: Option<String>,
}

impl ImageSection {
    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    pub fn alt_name(&self) -> Option<&str> {
        non_empty(&self.alt_name)
    }

    pub fn ssh_user(&self) -> Option<&str> {
        non_empty(&self.ssh_user)
    }

    pub fn alt_ssh_user(&self) -> Option<&str> {
        non_empty(&self.alt_ssh_user)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct NetworkSection {
    pub router_name: Option<String>,
    pub network_name: Option<String>,
    pub floating_network_name: Option<String>,
}

impl NetworkSection {
    pub fn router_name(&self) -> Option<&str> {
        non_empty(&self.router_name)
    }

    pub fn network_name(&self) -> Option<&str> {
        non_empty(&self.network_name)
    }

    pub fn floating_network_name(&self) -> Option<&str> {
        non_empty(&self.floating_network_name)
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ComputeSection {
    pub flavor_name: Option<String>,
    pub flavor_alt_name: Option<String>,
}

impl ComputeSection {
    pub fn flavor_name(&self) -> Option<&str> {
        non_empty(&self.flavor_name)
    }

    pub fn flavor_alt_name(&self) -> Option<&str> {
        non_empty(&self.flavor_alt_name)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("/var/lib/tempest")
}

fn default_source() -> String {
    "https://github.com/openstack/tempest".into()
}

fn default_target() -> String {
    "smoke".into()
}

/// INI files express "unset" as an empty value.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|x| !x.is_empty())
}

impl Config {
    pub fn new(path: PathBuf) -> Result<Self, Report> {
        let mut builder = config::Config::builder();

        builder = builder.set_default("tempest.target", default_target())?;
        if std::path::Path::new(&path).is_file() {
            builder = builder.add_source(File::from(path).format(FileFormat::Ini));
        }

        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults() {
        let sot = Config::default();
        assert_eq!(PathBuf::from("/var/lib/tempest"), sot.tempest.root);
        assert_eq!(
            PathBuf::from("/var/lib/tempest/logs"),
            sot.tempest.log_dir()
        );
        assert_eq!(
            PathBuf::from("/var/lib/tempest/tempest.conf"),
            sot.tempest.conf_path()
        );
        assert_eq!("smoke", sot.tempest.target);
        assert!(sot.image.name().is_none());
    }

    #[test]
    fn test_missing_file() {
        let sot = Config::new("/nonexistent/tempest.ini".into()).unwrap();
        assert_eq!("https://github.com/openstack/tempest", sot.tempest.source);
        assert_eq!("smoke", sot.tempest.target);
    }

    #[test]
    fn test_load_ini() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[tempest]
root = /srv/tempest
http_proxy = http://squid:3128
https_proxy =

[identity]
api_version = 3

[image]
name = cirros
alt_name = cirros2
ssh_user = cirros

[network]
router_name = provider-router
network_name = ext_net

[compute]
flavor_name = m1.small
flavor_alt_name = m1.medium
"#
        )
        .unwrap();

        let sot = Config::new(file.path().into()).unwrap();
        assert_eq!(PathBuf::from("/srv/tempest"), sot.tempest.root);
        assert_eq!(Some("http://squid:3128"), sot.tempest.http_proxy());
        assert_eq!(None, sot.tempest.https_proxy());
        assert_eq!("smoke", sot.tempest.target);
        assert_eq!(Some("3"), sot.identity.api_version());
        assert_eq!(Some("cirros"), sot.image.name());
        assert_eq!(Some("cirros2"), sot.image.alt_name());
        assert_eq!(Some("cirros"), sot.image.ssh_user());
        assert_eq!(None, sot.image.alt_ssh_user());
        assert_eq!(Some("provider-router"), sot.network.router_name());
        assert_eq!(Some("ext_net"), sot.network.network_name());
        assert_eq!(None, sot.network.floating_network_name());
        assert_eq!(Some("m1.small"), sot.compute.flavor_name());
        assert_eq!(Some("m1.medium"), sot.compute.flavor_alt_name());
    }
}
