//! The boundary between the connection manager and the SSH client library.
//!
//! `Dialer` produces one `Transport` per host; a `Transport` can spawn any number of
//! remote processes over the same underlying connection. The production backend is
//! OpenSSH through a multiplexed master connection.

use std::future::Future;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use openssh::{KnownHosts, SessionBuilder, Stdio};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::error::RaccoonError;
use crate::host::{Auth, Host};

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// A process running on a remote host.
pub struct RemoteProcess {
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    /// Resolves once the remote process has exited and any input was delivered.
    pub exit: BoxFuture<'static, Result<ExitStatus, RaccoonError>>,
}

#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial and authenticate against `host`.
    async fn dial(&self, host: &Host) -> Result<Box<dyn Transport>, RaccoonError>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the underlying connection is still usable.
    async fn check(&self) -> Result<(), RaccoonError>;

    /// Run `command` under `sh -c`, optionally feeding `input` to its stdin.
    async fn spawn(
        &self,
        command: &str,
        input: Option<Vec<u8>>,
    ) -> Result<RemoteProcess, RaccoonError>;

    async fn close(self: Box<Self>) -> Result<(), RaccoonError>;
}

/// Quote `s` so that a POSIX shell reads it as a single word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[derive(Debug, Clone, Default)]
pub struct OpensshDialer {
    connect_timeout: Option<Duration>,
}

impl OpensshDialer {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for OpensshDialer {
    async fn dial(&self, host: &Host) -> Result<Box<dyn Transport>, RaccoonError> {
        let mut builder = SessionBuilder::default();
        builder
            .user(host.username.clone())
            .port(host.port)
            .known_hosts_check(KnownHosts::Add);
        if let Some(timeout) = self.connect_timeout {
            builder.connect_timeout(timeout);
        }
        match &host.auth {
            Auth::IdentityFile(path) => {
                builder.keyfile(path);
            }
            Auth::Password(_) => {
                tracing::warn!(
                    host = %host.address,
                    component = "connection",
                    "Password authentication is handed to the ssh client's own prompt"
                );
            }
            Auth::Interactive => {}
        }
        let session = builder
            .connect_mux(&host.address)
            .await
            .map_err(|e| RaccoonError::Dial {
                address: host.address.clone(),
                source: Box::new(e),
            })?;
        Ok(Box::new(OpensshTransport {
            address: host.address.clone(),
            session: Arc::new(session),
        }))
    }
}

struct OpensshTransport {
    address: String,
    session: Arc<openssh::Session>,
}

impl OpensshTransport {
    fn channel_error(&self, e: impl std::error::Error + Send + Sync + 'static) -> RaccoonError {
        RaccoonError::Channel {
            address: self.address.clone(),
            source: Box::new(e),
        }
    }
}

#[async_trait]
impl Transport for OpensshTransport {
    async fn check(&self) -> Result<(), RaccoonError> {
        self.session.check().await.map_err(|e| self.channel_error(e))
    }

    async fn spawn(
        &self,
        command: &str,
        input: Option<Vec<u8>>,
    ) -> Result<RemoteProcess, RaccoonError> {
        let mut cmd = Arc::clone(&self.session).arc_command("sh");
        cmd.arg("-c")
            .raw_arg(shell_quote(command))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if input.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        let mut child = cmd.spawn().await.map_err(|e| self.channel_error(e))?;

        let missing = || self.channel_error(std::io::Error::other("output pipe unavailable"));
        let stdout: OutputStream = Box::new(child.stdout().take().ok_or_else(missing)?);
        let stderr: OutputStream = Box::new(child.stderr().take().ok_or_else(missing)?);
        let stdin = child.stdin().take();

        let exit = Box::pin(feed_and_wait(
            self.address.clone(),
            stdin,
            input,
            child.wait(),
        ));
        Ok(RemoteProcess {
            stdout,
            stderr,
            exit,
        })
    }

    async fn close(self: Box<Self>) -> Result<(), RaccoonError> {
        let address = self.address;
        match Arc::try_unwrap(self.session) {
            Ok(session) => session.close().await.map_err(|e| RaccoonError::Channel {
                address,
                source: Box::new(e),
            }),
            // A process still holds the master connection; it is torn down once the
            // last process handle is dropped.
            Err(_) => Ok(()),
        }
    }
}

/// Deliver `input` to the remote stdin, close it, then wait for the process.
///
/// The exit status always wins over a failed delivery: a remote side that exits
/// early (say `cat` hitting a permission error) breaks the pipe, and its status is
/// what explains the failure. A broken pipe behind a clean exit is a channel error.
async fn feed_and_wait<W, F, E>(
    address: String,
    stdin: Option<W>,
    input: Option<Vec<u8>>,
    wait: F,
) -> Result<ExitStatus, RaccoonError>
where
    W: AsyncWrite + Unpin,
    F: Future<Output = Result<ExitStatus, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let delivered = match (stdin, input) {
        (Some(mut stdin), Some(input)) => match stdin.write_all(&input).await {
            Ok(()) => stdin.shutdown().await,
            Err(e) => Err(e),
        },
        _ => Ok(()),
    };
    let status = wait.await.map_err(|e| RaccoonError::Channel {
        address: address.clone(),
        source: Box::new(e),
    })?;
    match delivered {
        Err(e) if status.success() => Err(RaccoonError::Channel {
            address,
            source: Box::new(e),
        }),
        _ => Ok(status),
    }
}
