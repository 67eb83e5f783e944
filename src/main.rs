use anyhow::Result;
use clap::Parser;
use common::{load_settings, Settings};
use console::cli::{dispatch, Operation};
use log::{debug, info, LevelFilter};
use site::{OperationContext, SiteError, SiteType};
use std::process::ExitCode;
use std::time::Duration;

const CLEANUP_GRACE: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[clap(
    name = "remote-manage",
    about = "Backup, restore and maintenance of hosted Drupal and Moodle sites",
    version
)]
struct Cli {
    /// Log at debug level and include every progress message in the result
    #[clap(short, long, global = true)]
    verbose: bool,

    /// Log progress to stderr while the operation runs
    #[clap(long, global = true)]
    log_stderr: bool,

    #[clap(subcommand)]
    operation: Operation,
}

/// Installs env_logger, wrapped by sentry when `SENTRY_DSN` is set. The
/// returned guard flushes pending events when dropped.
fn init_logging(cli: &Cli) -> Result<Option<sentry::ClientInitGuard>> {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.log_stderr {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    let logger = env_logger::Builder::new()
        .format_timestamp(None)
        .format_level(true)
        .format_module_path(false)
        .format_indent(Some(4))
        .filter_level(level)
        .parse_default_env()
        .build();
    let max_level = logger.filter();

    let dsn = std::env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty());
    let guard = match dsn {
        Some(dsn) => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ));
            log::set_boxed_logger(Box::new(sentry_log::SentryLogger::with_dest(logger)))?;
            Some(guard)
        }
        None => {
            log::set_boxed_logger(Box::new(logger))?;
            None
        }
    };
    log::set_max_level(max_level);
    Ok(guard)
}

fn settings() -> Result<Settings, SiteError> {
    let settings = load_settings().map_err(|e| SiteError::InvalidArgument(e.to_string()))?;
    if settings.app_name.is_none() {
        return Err(SiteError::InvalidArgument("APP_NAME is not set".into()));
    }
    Ok(settings)
}

async fn run(operation: Operation, ctx: &mut OperationContext) -> Result<(), SiteError> {
    let settings = settings()?;
    match SiteType::detect(&settings) {
        Some(site_type) => debug!("Detected {site_type} site"),
        None => debug!("No site detected"),
    }
    info!("Performing operation: {}", operation.name());

    // Backup and restore stop at the limit on their own and still clean up.
    // This outer deadline only catches what is left running after that.
    let limit = settings.operation.timeout;
    let deadline = limit + settings.operation.cleanup_timeout + CLEANUP_GRACE;
    tokio::time::timeout(deadline, dispatch(operation, &settings, ctx))
        .await
        .map_err(|_| SiteError::TimedOut(limit))?
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Variables already in the environment win over .env.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _sentry = init_logging(&cli)?;

    let mut ctx = OperationContext::new(cli.operation.name(), cli.verbose);
    let outcome = run(cli.operation, &mut ctx).await;
    if let Err(e) = &outcome {
        ctx.error(e.to_string());
    }
    ctx.record_elapsed();

    let report = ctx.into_report(outcome.as_ref().map(|_| ()));
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
