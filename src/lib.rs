//! Raccoon: A Cluster-Wide SSH Recipe Runner.

// Serde helper module.
mod serde;
// Command line arguments and configuration.
pub mod config;
// Error handling.
pub mod error;
// How to represent hosts.
pub mod host;
// Host-attributed logging and color assignment.
pub mod logger;
// How to parse and validate the infrastructure file.
pub mod infra;
// Recipe instructions and their executors.
pub mod instruction;
// How to parse recipe files.
pub mod recipe;
// Jobs: clusters paired with recipes.
pub mod job;
// SSH client boundary and the OpenSSH backend.
pub mod transport;
// Remote channels and output streaming.
pub mod session;
// Per-host connection lifecycle.
pub mod connection;
// Synchronization primitives.
pub mod sync;
// Fan-out across hosts.
pub mod dispatcher;

pub use config::{Config, Mode};
pub use connection::Connection;
pub use dispatcher::{Dispatcher, FailedInstruction, Report};
pub use error::RaccoonError;
pub use host::{Auth, Host};
pub use infra::{Cluster, Infrastructure};
pub use instruction::{Instruction, Outcome};
pub use job::{build_jobs, Job, JobRequest};
pub use logger::{ColorAllocator, HostColor, HostLogger};
pub use recipe::{load_recipes, parse_recipes, Recipe};
pub use session::Session;
pub use sync::CompletionCounter;
pub use transport::{Dialer, OpensshDialer, RemoteProcess, Transport};
