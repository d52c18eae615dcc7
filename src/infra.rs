//! Infrastructure description: named clusters of hosts and the tasks to run on them.

use std::fs::File;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use void::Void;

use crate::error::RaccoonError;
use crate::host::{Auth, Host, DEFAULT_SSH_PORT};
use crate::serde::string_or_mapping;

/// A cluster after auth inheritance and validation.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    /// Titles of the recipes to run on every host, in order.
    pub tasks: Vec<String>,
    pub hosts: Vec<Host>,
}

#[derive(Debug, Clone)]
pub struct Infrastructure {
    pub name: String,
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InfrastructureSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    infrastructure: Vec<ClusterSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterSpec {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tasks: Vec<String>,
    #[serde(default)]
    hosts: Vec<HostEntry>,
    username: Option<String>,
    password: Option<String>,
    identity_file: Option<PathBuf>,
    #[serde(default)]
    interactive_auth: bool,
}

#[derive(Debug, Deserialize)]
struct HostEntry(#[serde(deserialize_with = "string_or_mapping")] HostSpec);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostSpec {
    #[serde(default)]
    ip: String,
    ssh_port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    identity_file: Option<PathBuf>,
    #[serde(default)]
    interactive_auth: bool,
    description: Option<String>,
}

impl FromStr for HostSpec {
    type Err = Void;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            ip: s.to_string(),
            ..Default::default()
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl HostSpec {
    /// Fill in whatever the host left out from the cluster-level fields.
    fn inherit(&mut self, cluster: &ClusterSpec) {
        if non_blank(self.username.clone()).is_none() {
            self.username = cluster.username.clone();
        }
        if non_blank(self.password.clone()).is_none() {
            self.password = cluster.password.clone();
        }
        if self.identity_file.is_none() {
            self.identity_file = cluster.identity_file.clone();
        }
        if !self.interactive_auth {
            self.interactive_auth = cluster.interactive_auth;
        }
    }

    fn into_host(self, cluster: &str, errors: &mut Vec<String>) -> Option<Host> {
        let address = self.ip.trim().to_string();
        let username = non_blank(self.username);
        if address.is_empty() {
            errors.push(format!("Host IP can't be blank on cluster '{}'", cluster));
        }
        if username.is_none() {
            errors.push(format!("Host username is blank on host '{}'", address));
        }

        let auth = if let Some(path) = self.identity_file.filter(|p| !p.as_os_str().is_empty()) {
            Auth::IdentityFile(path)
        } else if let Some(password) = non_blank(self.password) {
            Auth::Password(password)
        } else {
            if !self.interactive_auth {
                tracing::warn!(
                    host = %address,
                    component = "parser",
                    "No password or identity file on host '{}'; falling back to interactive \
                     authentication",
                    address
                );
            }
            Auth::Interactive
        };

        let username = username?;
        if address.is_empty() {
            return None;
        }
        Some(Host {
            address,
            port: self.ssh_port.filter(|p| *p != 0).unwrap_or(DEFAULT_SSH_PORT),
            username,
            auth,
            description: non_blank(self.description),
        })
    }
}

impl Infrastructure {
    /// Parse a YAML (or JSON) infrastructure document.
    pub fn parse(contents: &str) -> Result<Self, RaccoonError> {
        let spec: InfrastructureSpec =
            serde_yaml::from_str(contents).map_err(|e| RaccoonError::Parse {
                path: "<infrastructure>".to_string(),
                source: Box::new(e),
            })?;
        Self::resolve(spec)
    }

    pub fn load(path: &str) -> Result<Self, RaccoonError> {
        let file = File::open(path).map_err(|e| RaccoonError::Parse {
            path: path.to_string(),
            source: Box::new(e),
        })?;
        let spec: InfrastructureSpec =
            serde_yaml::from_reader(file).map_err(|e| RaccoonError::Parse {
                path: path.to_string(),
                source: Box::new(e),
            })?;
        Self::resolve(spec)
    }

    /// Apply cluster-level auth inheritance and collect every validation problem.
    pub(crate) fn resolve(spec: InfrastructureSpec) -> Result<Self, RaccoonError> {
        let mut errors = vec![];
        if spec.infrastructure.is_empty() {
            errors.push("No cluster were found on infrastructure file".to_string());
        }
        if spec.name.trim().is_empty() {
            errors.push("Infrastructure name can't be blank".to_string());
        }

        let mut clusters = Vec::with_capacity(spec.infrastructure.len());
        for mut cluster in spec.infrastructure {
            if cluster.name.trim().is_empty() {
                errors.push("Cluster name can't be blank".to_string());
            }
            if cluster.hosts.is_empty() {
                errors.push(format!(
                    "No hosts were found on cluster '{}' for tasks {:?}",
                    cluster.name, cluster.tasks
                ));
            }
            if cluster.tasks.is_empty() {
                errors.push(format!(
                    "No tasks were specified on cluster '{}'",
                    cluster.name
                ));
            }

            let entries = std::mem::take(&mut cluster.hosts);
            let mut hosts = Vec::with_capacity(entries.len());
            for HostEntry(mut host_spec) in entries {
                host_spec.inherit(&cluster);
                if let Some(host) = host_spec.into_host(&cluster.name, &mut errors) {
                    hosts.push(host);
                }
            }
            clusters.push(Cluster {
                name: cluster.name,
                tasks: cluster.tasks,
                hosts,
            });
        }

        if !errors.is_empty() {
            for error in &errors {
                tracing::error!(component = "parser", "{}", error);
            }
            return Err(RaccoonError::Invalid(errors));
        }
        Ok(Self {
            name: spec.name,
            clusters,
        })
    }
}
