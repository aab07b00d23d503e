use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use pagewright::build::{build_site, Error as BuildError};
use pagewright::config::Config;
use pagewright::projects;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Builds a static blog from a directory of Markdown posts.
#[derive(Parser)]
#[command(name = "pagewright", version, about)]
struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// The project directory. Defaults to the nearest directory, starting
    /// with the current one, containing `pagewright.yaml`.
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds the site.
    Build {
        /// Where to write the site. Defaults to `_site` in the project
        /// directory.
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Stop at the first failing stage and print its full error. Also
        /// enabled by setting `DEBUG`.
        #[arg(long)]
        debug: bool,
    },

    /// Fetches the project list and rewrites the local project snapshot.
    RefreshProjects,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            println!("[ERROR] {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let project = match cli.project {
        Some(project) => project,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Command::Build { output, debug } => {
            let debug = debug || std::env::var_os("DEBUG").is_some();
            let config = Config::from_directory(&project, output.as_deref(), debug)?;
            match build_site(&config) {
                Ok(report) => {
                    for failure in &report.failed {
                        println!("[ERROR] Unable to generate {}: {}", failure.stage, failure.error);
                    }
                    Ok(match report.is_success() {
                        true => ExitCode::SUCCESS,
                        false => ExitCode::FAILURE,
                    })
                }
                Err(err @ BuildError::Stage { .. }) => Err(anyhow::Error::new(err)),
                Err(err) => Err(anyhow!("Building site: {}", err)),
            }
        }
        Command::RefreshProjects => {
            let config = Config::from_directory(&project, None, false)?;
            let api = config.projects_api.as_ref().ok_or_else(|| {
                anyhow!("`projects_api` isn't set in the project file; nothing to refresh")
            })?;
            let client = projects::client()?;
            let snapshot =
                projects::refresh(&client, api, &config.projects_exclude, &config.projects_file)?;
            tracing::info!(
                projects = snapshot.len(),
                path = %config.projects_file.display(),
                "refreshed project snapshot"
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
