use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum RaccoonError {
    #[error("Failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: BoxError,
    },
    #[error("SSH client for {0} was already closed")]
    AlreadyClosed(String),
    #[error("Failed to open session on {address}: {source}")]
    Channel {
        address: String,
        #[source]
        source: BoxError,
    },
    #[error("Failed to render template '{template}': {reason}")]
    Template { template: String, reason: String },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: BoxError,
    },
    #[error("Invalid description: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
