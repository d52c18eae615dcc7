//! Fan jobs out across hosts.
//!
//! Every (job, host) pair gets its own tokio task that runs the job's recipe against
//! that host strictly in order. All tasks run concurrently; `dispatch` returns once
//! every instruction on every host has completed, successfully or not.

use std::fmt::{self, Debug};
use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::{Mutex, Semaphore};

use crate::connection::Connection;
use crate::instruction::Outcome;
use crate::job::Job;
use crate::logger::ColorAllocator;
use crate::recipe::Recipe;
use crate::sync::{CompletionCounter, Pending};
use crate::transport::Dialer;

/// An instruction that failed on some host.
#[derive(Clone, PartialEq, Eq)]
pub struct FailedInstruction {
    pub host: String,
    pub instruction: String,
    pub error: String,
}

impl Debug for FailedInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.host, self.instruction, self.error)
    }
}

/// What a dispatch did.
#[derive(Debug, Default)]
pub struct Report {
    /// Instruction executions that ran to completion, failed or not.
    pub completed: usize,
    pub failed: Vec<FailedInstruction>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed.is_empty() {
            write!(f, "All {} instructions succeeded.", self.completed)
        } else {
            write!(
                f,
                "{} of {} instructions failed:\n{}",
                self.failed.len(),
                self.completed,
                self.failed.iter().map(|failed| format!("  {:?}", failed)).join("\n")
            )
        }
    }
}

pub struct Dispatcher {
    dialer: Arc<dyn Dialer>,
    print_period: usize,
    /// Cap on concurrently running host workers. `None` runs every worker at once.
    max_parallel: Option<usize>,
}

impl Dispatcher {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            print_period: 1,
            max_parallel: None,
        }
    }

    pub fn with_print_period(mut self, print_period: usize) -> Self {
        self.print_period = print_period;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel.filter(|n| *n > 0);
        self
    }

    /// Run every job's recipe on every one of its hosts and wait for all of them.
    pub async fn dispatch(&self, jobs: Vec<Job>) -> Report {
        let counter = Arc::new(CompletionCounter::new());
        let errored: Arc<Mutex<Vec<FailedInstruction>>> = Arc::new(Mutex::new(vec![]));
        let permits = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        let mut colors = ColorAllocator::default();
        let mut tasks = vec![];

        for job in jobs {
            tracing::info!(
                cluster = %job.cluster,
                group = %job.group,
                component = "dispatcher",
                "----> Launching '{}' on cluster '{}' ({} hosts, {} instructions in total)",
                job.group,
                job.cluster,
                job.hosts.len(),
                job.units()
            );
            for host in job.hosts {
                let pending = Pending::register(Arc::clone(&counter), job.recipe.len());
                let conn = Connection::new(host, colors.next_color(), Arc::clone(&self.dialer))
                    .with_print_period(self.print_period);
                let recipe = Arc::clone(&job.recipe);
                let errored = Arc::clone(&errored);
                let permits = permits.clone();
                tasks.push(tokio::spawn(async move {
                    let _permit = match permits {
                        Some(permits) => permits.acquire_owned().await.ok(),
                        None => None,
                    };
                    run_recipe(conn, &recipe, pending, errored).await;
                }));
            }
        }

        counter.wait().await;
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(component = "dispatcher", "Host worker panicked: {}", e);
            }
        }

        let failed = std::mem::take(&mut *errored.lock().await);
        Report {
            completed: counter.completed(),
            failed,
        }
    }
}

/// Run `recipe` in order on one host, then release the host's connection.
async fn run_recipe(
    mut conn: Connection,
    recipe: &Recipe,
    mut pending: Pending,
    errored: Arc<Mutex<Vec<FailedInstruction>>>,
) {
    for instruction in recipe {
        if let Outcome::Failed(error) = instruction.execute(&mut conn).await {
            errored.lock().await.push(FailedInstruction {
                host: conn.host().to_string(),
                instruction: instruction.to_string(),
                error,
            });
        }
        pending.complete_one();
    }

    // A host that never connected has nothing to close.
    if conn.is_live() {
        if let Err(e) = conn.close().await {
            conn.logger()
                .error("connection", format!("Error while terminating: {}", e));
        }
    }
}
