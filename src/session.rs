use std::process::ExitStatus;

use futures::future::join;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::error::RaccoonError;
use crate::logger::HostLogger;
use crate::transport::Transport;

/// One remote channel opened over a host's live connection.
///
/// A session runs exactly one remote process and is consumed by doing so, which
/// releases it on every exit path.
pub struct Session<'a> {
    transport: &'a dyn Transport,
    logger: HostLogger,
    print_period: usize,
}

impl<'a> Session<'a> {
    pub(crate) fn new(transport: &'a dyn Transport, logger: HostLogger, print_period: usize) -> Self {
        Self {
            transport,
            logger,
            print_period,
        }
    }

    /// Run `command` remotely, forwarding its stdout and stderr to the host logger.
    ///
    /// Both listeners run as their own tasks, so lines from the two streams may
    /// interleave. They are drained before this returns.
    pub async fn run(
        self,
        command: &str,
        input: Option<Vec<u8>>,
    ) -> Result<ExitStatus, RaccoonError> {
        let process = self.transport.spawn(command, input).await?;
        let stdout = tokio::spawn(stream(
            process.stdout,
            self.logger.clone(),
            "stdout",
            self.print_period,
        ));
        let stderr = tokio::spawn(stream(
            process.stderr,
            self.logger.clone(),
            "stderr",
            self.print_period,
        ));
        let result = process.exit.await;
        let _ = join(stdout, stderr).await;
        self.logger.debug("connection", "Session released.");
        result
    }
}

/// Log every `print_period`-th line of `stream` until EOF. A period of zero drains
/// the stream without logging.
async fn stream<B: AsyncRead + Unpin>(
    stream: B,
    logger: HostLogger,
    component: &'static str,
    print_period: usize,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(reader.buffer().len());
    loop {
        // Read into the buffer until either \r or \n is met.
        // Skip the first `print_period-1` occurrences.
        if let Err(e) = read_until2(&mut reader, b'\r', b'\n', &mut buf, print_period.max(1)).await
        {
            logger.warn(component, format!("Failed to read remote output: {}", e));
            break;
        }
        // An empty buffer means that EOF was reached.
        if buf.is_empty() {
            break;
        }
        if print_period != 0 {
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                logger.info(component, line);
            }
        }
        buf.clear();
    }
}

async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
    mut skip: usize,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                if skip == 1 {
                    buf.extend_from_slice(&available[..=i]);
                    (true, i + 1)
                } else {
                    skip -= 1;
                    buf.clear();
                    (false, i + 1)
                }
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}
