//! Remote hosts.
//!
//! A `Host` is pure identity and credentials. The live SSH state for a host is kept
//! separately in a `Connection`, which is owned by the single worker that runs the
//! host's recipe.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// How to authenticate against a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Auth {
    Password(String),
    IdentityFile(PathBuf),
    /// Whatever the SSH client negotiates on its own (agent, default keys, prompts).
    Interactive,
}

impl Auth {
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::Password(_) => "password",
            Auth::IdentityFile(_) => "identity-file",
            Auth::Interactive => "interactive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Host {
    /// Network address (IP or hostname) to dial.
    pub address: String,
    pub port: u16,
    pub username: String,
    pub auth: Auth,
    /// Free-text label from the infrastructure file.
    pub description: Option<String>,
}

impl Host {
    pub fn new(address: impl Into<String>, username: impl Into<String>, auth: Auth) -> Self {
        Self {
            address: address.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            auth,
            description: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Values available to command templates.
    pub fn template_params(&self) -> BTreeMap<&'static str, String> {
        let mut params = BTreeMap::new();
        params.insert("address", self.address.clone());
        params.insert("port", self.port.to_string());
        params.insert("username", self.username.clone());
        params.insert(
            "description",
            self.description.clone().unwrap_or_default(),
        );
        params
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}@{}", self.username, self.address)?;
        if self.port != DEFAULT_SSH_PORT {
            write!(f, ":{}", self.port)?;
        }
        if let Some(description) = &self.description {
            write!(f, " ({})", description)?;
        }
        write!(f, "]")
    }
}
