use anyhow::{bail, Context, Result};
use batchsig::args::Args;
use batchsig::batch::BatchRunner;
use batchsig::config::Settings;
use batchsig::sign::pgp::PgpBackend;
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match (args.quiet, args.verbose) {
        (0, 0) => "warn,batchsig=info",
        (1, 0) => "warn",
        (_, 0) => "error",
        (_, 1) => "info,batchsig=debug",
        (_, 2) => "debug",
        (_, 3) => "debug,batchsig=trace",
        _ => "trace",
    };
    env_logger::init_from_env(Env::default().default_filter_or(log_level));

    let settings = Settings::load(args).context("Failed to load configuration")?;
    if settings.files.is_empty() {
        warn!("No files to sign");
    }

    let runner = BatchRunner::new(Arc::new(PgpBackend::new()), settings.options);
    info!("Signing {} file(s).", settings.files.len());
    let report = if settings.jobs > 1 {
        runner.run_parallel(&settings.files, settings.jobs).await
    } else {
        runner.run(&settings.files)
    }
    .context("Failed to sign files")?;

    let total = report.outcomes.len();
    let failed = report.failures().count();
    for outcome in report.outcomes {
        if let Some(err) = outcome.error {
            let err = anyhow::Error::from(err);
            error!("Failed to sign {:?}: {:#}", outcome.task.source, err);
        } else {
            info!(
                "Signed {:?} -> {:?}",
                outcome.task.source, outcome.task.destination
            );
        }
    }

    if failed > 0 {
        bail!("Failed to sign {} of {} file(s)", failed, total);
    }

    Ok(())
}
