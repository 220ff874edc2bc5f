//! Student Portal CLI
//!
//! Local execution entry point. Results are printed to stdout as JSON.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use portal_scraper::{
    cache::{ATTENDANCE_PREFIX, CONTENT_PREFIX, SCHEDULE_PREFIX, cache_key},
    context::PortalContext,
    error::{AppError, Result},
    models::{Config, Credentials},
    pipeline::{self, FetchOptions},
    utils::url::normalize_course_url,
};
use serde::Serialize;

/// Student portal scraper
#[derive(Parser, Debug)]
#[command(
    name = "portal",
    version,
    about = "Schedule, attendance and course content from the student portal"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Portal username
    #[arg(short, long, env = "PORTAL_USERNAME", global = true)]
    username: Option<String>,

    /// Portal password
    #[arg(short, long, env = "PORTAL_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Ignore cached results and fetch again
    #[arg(long, global = true)]
    refresh: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the weekly group schedule
    Schedule,

    /// Print per-course attendance
    Attendance,

    /// Print the announcement and weekly content of one course
    Content {
        /// Course page URL
        course_url: String,
    },

    /// Delete a cached result
    Forget {
        #[arg(value_enum)]
        kind: CachedKind,

        /// Course page URL (required for `content`)
        #[arg(long)]
        course_url: Option<String>,
    },

    /// Validate the configuration file
    Validate,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CachedKind {
    Schedule,
    Attendance,
    Content,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn credentials(cli: &Cli) -> Result<Credentials> {
    match (&cli.username, &cli.password) {
        (Some(username), Some(password)) if !username.trim().is_empty() => {
            Ok(Credentials::new(username.trim(), password))
        }
        _ => Err(AppError::config(
            "credentials required: pass --username/--password or set PORTAL_USERNAME/PORTAL_PASSWORD",
        )),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    log::debug!("Configuration source: {}", cli.config.display());

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("Config OK");
        return Ok(());
    }

    let options = FetchOptions {
        force_refresh: cli.refresh,
    };
    let ctx = PortalContext::from_config(config).await?;

    match &cli.command {
        Command::Schedule => {
            let creds = credentials(&cli)?;
            let schedule = pipeline::get_weekly_schedule_with(&ctx, &creds, options).await?;
            print_json(&schedule)?;
        }

        Command::Attendance => {
            let creds = credentials(&cli)?;
            let report = pipeline::get_attendance_with(&ctx, &creds, options).await?;
            print_json(&report)?;
        }

        Command::Content { course_url } => {
            let creds = credentials(&cli)?;
            let items =
                pipeline::get_combined_course_content_with(&ctx, &creds, course_url, options)
                    .await?;
            print_json(&items)?;
        }

        Command::Forget { kind, course_url } => {
            let username = cli
                .username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| AppError::config("--username or PORTAL_USERNAME is required"))?;

            let key = match kind {
                CachedKind::Schedule => cache_key(SCHEDULE_PREFIX, username, None),
                CachedKind::Attendance => cache_key(ATTENDANCE_PREFIX, username, None),
                CachedKind::Content => {
                    let url = course_url.as_deref().ok_or_else(|| {
                        AppError::validation("--course-url is required to forget course content")
                    })?;
                    let normalized = normalize_course_url(url)?;
                    cache_key(CONTENT_PREFIX, username, Some(&normalized))
                }
            };

            let removed = ctx.cache.delete(&key).await;
            if removed == 0 {
                log::info!("Nothing cached under '{}'", key);
            } else {
                log::info!("Removed cached entry '{}'", key);
            }
        }

        Command::Validate => {}
    }

    Ok(())
}
