use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::Level;

use crate::handler::LoggingSink;
use crate::pipeline::{self, PipelineContext};
use crate::types::{ExpectedType, FullName, UpdateOptions};

#[derive(Parser)]
#[command(name = "taf", about = "Archival authentication for Git repositories")]
pub struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone an authentication repository and its authorized targets
    /// into a fresh library root.
    Clone {
        auth_repo_url: String,
        name: String,
        library_dir: PathBuf,
        #[arg(long, default_value = "either")]
        expected_type: String,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        out_of_band: Option<String>,
    },
    /// Fetch and verify new authentication repository commits, advancing
    /// local working copies on success.
    Update {
        auth_repo_url: String,
        name: String,
        library_dir: PathBuf,
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        forced: bool,
    },
    /// Verify without writing anything to disk.
    Validate {
        auth_repo_url: String,
        name: String,
        library_dir: PathBuf,
    },
}

pub fn handle_calls() -> Result<()> {
    let cli = Cli::parse();
    let logger_level = match cli.verbose {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(logger_level.as_str())).init();

    match cli.command {
        Commands::Clone {
            auth_repo_url,
            name,
            library_dir,
            expected_type,
            strict,
            out_of_band,
        } => {
            let name: FullName = name.parse().context("invalid repository name")?;
            let expected_type = match expected_type.as_str() {
                "test" => ExpectedType::Test,
                "official" => ExpectedType::Official,
                _ => ExpectedType::Either,
            };
            let options = UpdateOptions {
                strict,
                out_of_band: out_of_band.map(|c| c.parse()).transpose()?,
                ..Default::default()
            };
            run_clone(&auth_repo_url, &name, &library_dir, expected_type, &options)
        }
        Commands::Update {
            auth_repo_url,
            name,
            library_dir,
            strict,
            forced,
        } => {
            let name: FullName = name.parse().context("invalid repository name")?;
            let options = UpdateOptions {
                strict,
                forced,
                ..Default::default()
            };
            run_update(&auth_repo_url, &name, &library_dir, &options)
        }
        Commands::Validate {
            auth_repo_url,
            name,
            library_dir,
        } => {
            let name: FullName = name.parse().context("invalid repository name")?;
            run_validate(&auth_repo_url, &name, &library_dir)
        }
    }
}

fn conf_dir_root(library_dir: &std::path::Path) -> PathBuf {
    library_dir.join(".taf")
}

fn scratch_root() -> PathBuf {
    env::temp_dir().join(format!("taf-{}", std::process::id()))
}

fn run_clone(
    auth_repo_url: &str,
    name: &FullName,
    library_dir: &std::path::Path,
    expected_type: ExpectedType,
    options: &UpdateOptions,
) -> Result<()> {
    let conf_dir = conf_dir_root(library_dir);
    let scratch = scratch_root();
    let sink = LoggingSink;
    let ctx = PipelineContext {
        library_dir,
        conf_dir_root: &conf_dir,
        scratch_root: &scratch,
        sink: &sink,
    };
    let summary = pipeline::clone(&ctx, auth_repo_url, name, expected_type, options)?;
    log::info!("clone finished with outcome {:?}", summary.outcome);
    Ok(())
}

fn run_update(
    auth_repo_url: &str,
    name: &FullName,
    library_dir: &std::path::Path,
    options: &UpdateOptions,
) -> Result<()> {
    let conf_dir = conf_dir_root(library_dir);
    let scratch = scratch_root();
    let sink = LoggingSink;
    let ctx = PipelineContext {
        library_dir,
        conf_dir_root: &conf_dir,
        scratch_root: &scratch,
        sink: &sink,
    };
    let summary = pipeline::update(&ctx, auth_repo_url, name, options)?;
    log::info!("update finished with outcome {:?}", summary.outcome);
    Ok(())
}

fn run_validate(auth_repo_url: &str, name: &FullName, library_dir: &std::path::Path) -> Result<()> {
    let conf_dir = conf_dir_root(library_dir);
    let scratch = scratch_root();
    let sink = LoggingSink;
    let ctx = PipelineContext {
        library_dir,
        conf_dir_root: &conf_dir,
        scratch_root: &scratch,
        sink: &sink,
    };
    let options = UpdateOptions::default();
    let summary = pipeline::validate(&ctx, auth_repo_url, name, &options)?;
    log::info!("validate finished with outcome {:?}", summary.outcome);
    Ok(())
}
