//! Connection lifecycle for one host.
//!
//! The transport handle moves through `Absent -> Live -> Closed`. Dialing happens
//! inside `connect` while the manager is exclusively borrowed, so no other caller can
//! observe a half-established connection. A failed dial leaves the slot `Absent`; a
//! closed connection is re-established lazily by the next `open_session`.

use std::sync::Arc;

use crate::error::RaccoonError;
use crate::host::Host;
use crate::logger::{HostColor, HostLogger};
use crate::session::Session;
use crate::transport::{Dialer, Transport};

enum Slot {
    Absent,
    Live(Box<dyn Transport>),
    Closed,
}

pub struct Connection {
    host: Host,
    logger: HostLogger,
    dialer: Arc<dyn Dialer>,
    slot: Slot,
    print_period: usize,
}

impl Connection {
    pub fn new(host: Host, color: HostColor, dialer: Arc<dyn Dialer>) -> Self {
        let logger = HostLogger::new(&host, color);
        Self {
            host,
            logger,
            dialer,
            slot: Slot::Absent,
            print_period: 1,
        }
    }

    /// Log every `print_period`-th line of remote output. Zero silences it.
    pub fn with_print_period(mut self, print_period: usize) -> Self {
        self.print_period = print_period;
        self
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn logger(&self) -> &HostLogger {
        &self.logger
    }

    pub fn is_live(&self) -> bool {
        matches!(self.slot, Slot::Live(_))
    }

    /// Make sure a usable transport handle exists, dialing if needed.
    ///
    /// An existing handle is health-checked first and replaced if it went stale.
    pub async fn connect(&mut self) -> Result<&dyn Transport, RaccoonError> {
        let healthy = match &self.slot {
            Slot::Live(transport) => match transport.check().await {
                Ok(()) => true,
                Err(e) => {
                    self.logger
                        .warn("connection", format!("Connection lost ({}), redialing.", e));
                    false
                }
            },
            Slot::Absent | Slot::Closed => false,
        };

        if !healthy {
            if let Slot::Live(stale) = std::mem::replace(&mut self.slot, Slot::Absent) {
                if let Err(e) = stale.close().await {
                    self.logger
                        .warn("connection", format!("Error closing stale connection: {}", e));
                }
            }
            self.logger.info(
                "connection",
                format!(
                    "Opening SSH connection on port {} ({} auth).",
                    self.host.port,
                    self.host.auth.kind()
                ),
            );
            let transport = self.dialer.dial(&self.host).await?;
            self.slot = Slot::Live(transport);
        }

        match &self.slot {
            Slot::Live(transport) => Ok(transport.as_ref()),
            Slot::Absent | Slot::Closed => {
                Err(RaccoonError::AlreadyClosed(self.host.address.clone()))
            }
        }
    }

    /// Open a channel for one remote process, connecting first if needed.
    ///
    /// Failures are returned, not logged; the caller reports them with its own context.
    pub async fn open_session(&mut self) -> Result<Session<'_>, RaccoonError> {
        let logger = self.logger.clone();
        let print_period = self.print_period;
        let transport = self.connect().await?;
        Ok(Session::new(transport, logger, print_period))
    }

    /// Close the live transport handle.
    ///
    /// Closing a connection that is not live is a caller bug and is reported as
    /// `AlreadyClosed` rather than ignored.
    pub async fn close(&mut self) -> Result<(), RaccoonError> {
        match std::mem::replace(&mut self.slot, Slot::Closed) {
            Slot::Live(transport) => {
                self.logger.info("connection", "Terminating connection.");
                transport.close().await
            }
            previous => {
                self.slot = previous;
                Err(RaccoonError::AlreadyClosed(self.host.address.clone()))
            }
        }
    }
}
