mod args;
mod init;
mod log;
mod version_info;

use std::io::Write as _;
use std::process::ExitCode;

use clap::Parser as _;
use nagare_core::error::{Error, Result};
use nagare_core::{
    CancelToken, ReleaseOutcome, ReleaseRequest, RetryOutcome, RetryRequest, RollbackRequest,
    security,
};
use tracing::{error, info, warn};

use crate::args::{CliArgs, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    log::init(args.log_level_filter());
    let debug = args.log_level_filter() == Some(tracing::level_filters::LevelFilter::DEBUG);
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e, debug);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

/// Single-line summary, remediation bullets, then the debug hint.
/// Secret-shaped substrings and absolute paths never reach the terminal.
fn print_error(e: &Error, debug: bool) {
    let summary = security::sanitize_error_message(&e.to_string(), debug);
    eprintln!("error[{}]: {summary}", e.code());
    for suggestion in e.suggestions() {
        eprintln!("  - {suggestion}");
    }
    eprintln!("run with `--log-level DEBUG` for details");
    if debug {
        error!("{e:?}");
    }
}

async fn run(args: CliArgs) -> Result<()> {
    if args.version_detailed {
        version_info::print_detailed();
        return Ok(());
    }
    if args.version_json {
        version_info::print_json();
        return Ok(());
    }
    let Some(command) = &args.command else {
        // clap prints usage for bare invocations; reaching here means no
        // subcommand and no version flag.
        return Err(Error::ConfigInvalid {
            reason: "no subcommand given; see `nagare --help`".to_string(),
        });
    };
    if args.lang != args::Lang::En {
        // Message catalogs other than English are not bundled.
        warn!("language {} is not available, using English", args.lang);
    }

    let cancel = CancelToken::new();
    spawn_cancel_handler(cancel.clone());
    let root = nagare_core::fs_utils::current_directory()?;

    match command {
        Command::Init => init::init(&root),
        Command::Release(release_args) => {
            let config = args::load_config(args.config.as_deref())?;
            if !args.dry_run && !confirm(&args, &format!("Release {}?", config.project.name))? {
                info!("aborted");
                return Ok(());
            }
            let request = ReleaseRequest::new(root, config)
                .with_forced_bump(release_args.forced_bump())
                .with_dry_run(args.dry_run)
                .with_cancel_token(cancel);
            let outcome = nagare_core::release(&request).await?;
            if release_args.json_output() {
                print_json_outcome(&outcome);
            } else {
                print_outcome(&outcome);
            }
            Ok(())
        }
        Command::Rollback(rollback_args) => {
            let config = args::load_config(args.config.as_deref())?;
            let version = security::validate_semver(&rollback_args.version)?;
            if args.dry_run {
                info!("dry run: would roll back {version}");
                return Ok(());
            }
            if !confirm(&args, &format!("Roll back {version}?"))? {
                info!("aborted");
                return Ok(());
            }
            let request =
                RollbackRequest::new(root, config, version).with_cancel_token(cancel);
            let outcome = nagare_core::rollback(&request).await?;
            if outcome.nothing_to_do {
                println!("tag {} not found — nothing to do", outcome.tag);
            } else {
                println!(
                    "rolled back {}: tag deleted: {}, commit reset: {}, files restored: {}",
                    outcome.version,
                    outcome.tag_deleted,
                    outcome.commit_reset,
                    outcome.files_restored
                );
            }
            Ok(())
        }
        Command::Retry(retry_args) => {
            let config = args::load_config(args.config.as_deref())?;
            let version = security::validate_semver(&retry_args.version)?;
            let request =
                RetryRequest::new(root.clone(), config.clone(), version).with_cancel_token(cancel.clone());
            match nagare_core::retry(&request).await? {
                RetryOutcome::Republished { version, tag, .. } => {
                    println!("published {version} ({tag})");
                    Ok(())
                }
                RetryOutcome::StateCleared { version } => {
                    warn!("{version} had no publish failure on record; running a full release");
                    let request = ReleaseRequest::new(root, config)
                        .with_dry_run(args.dry_run)
                        .with_cancel_token(cancel);
                    let outcome = nagare_core::release(&request).await?;
                    print_outcome(&outcome);
                    Ok(())
                }
            }
        }
    }
}

fn spawn_cancel_handler(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

/// One-line confirmation on stdin. `-y` and dry runs skip it.
fn confirm(args: &CliArgs, prompt: &str) -> Result<bool> {
    if args.skip_confirmation {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    std::io::stdout()
        .flush()
        .map_err(|e| anyhow::anyhow!("cannot flush stdout: {e}"))?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| anyhow::anyhow!("cannot read confirmation: {e}"))?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn print_outcome(outcome: &ReleaseOutcome) {
    if outcome.dry_run {
        println!(
            "dry run: would release {} (from {})",
            outcome.version,
            outcome.previous_version.as_deref().unwrap_or("no previous release")
        );
        for file in &outcome.files {
            let marker = if file.changed { "~" } else { "=" };
            println!("  {marker} {}", file.path);
            for change in &file.preview {
                println!("    line {}: {} -> {}", change.line, change.before, change.after);
            }
        }
        println!("  would commit, tag {} and publish", outcome.tag);
        return;
    }
    println!("released {} ({})", outcome.version, outcome.tag);
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
    if let Some(release) = &outcome.remote_release {
        println!("  remote release: {}", release.url);
    }
}

fn print_json_outcome(outcome: &ReleaseOutcome) {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("can't serialize the release outcome to json: {e}"),
    }
}
