use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use raccoon::{
    load_recipes, Config, Dispatcher, Infrastructure, Job, JobRequest, Mode, OpensshDialer,
    RaccoonError,
};

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_request(cli: &Config) -> Result<JobRequest, RaccoonError> {
    if let Some(path) = &cli.job {
        tracing::info!(file = %path, "----> Reading job file");
        return JobRequest::load(path);
    }
    tracing::info!(file = %cli.infrastructure, "----> Reading infrastructure file");
    let infrastructure = Infrastructure::load(&cli.infrastructure)?;
    tracing::info!(file = %cli.recipes, "----> Reading recipes file");
    let recipes = load_recipes(&cli.recipes)?;
    Ok(JobRequest {
        infrastructure,
        recipes,
    })
}

fn load_jobs(cli: &Config) -> Result<Vec<Job>, RaccoonError> {
    let request = load_request(cli)?;
    tracing::info!(
        infrastructure = %request.infrastructure.name,
        "----> Infrastructure '{}': {} clusters, {} recipes",
        request.infrastructure.name,
        request.infrastructure.clusters.len(),
        request.recipes.len()
    );
    request.jobs()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Config::parse();
    init_logging(cli.log_level.as_deref());

    let jobs = match load_jobs(&cli) {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.mode {
        Mode::Check => {
            for job in &jobs {
                let maintainer = match job.recipe.maintainer.as_str() {
                    "" => String::new(),
                    name => format!(" by {}", name),
                };
                println!(
                    "{}: '{}'{} on {} hosts ({} instructions each, {} in total)",
                    job.cluster,
                    job.group,
                    maintainer,
                    job.hosts.len(),
                    job.recipe.len(),
                    job.units()
                );
            }
            println!("[Raccoon] {} jobs look good.", jobs.len());
        }
        Mode::Run => {
            let dialer = OpensshDialer::new(cli.connect_timeout.map(Duration::from_secs));
            let report = Dispatcher::new(Arc::new(dialer))
                .with_print_period(cli.print_period)
                .with_max_parallel(cli.parallel)
                .dispatch(jobs)
                .await;
            if report.is_success() {
                tracing::info!("[Raccoon] {}", report);
            } else {
                tracing::warn!("[Raccoon] {}", report);
            }
        }
    }

    ExitCode::SUCCESS
}
