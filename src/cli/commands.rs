//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use anyhow::{Context, Result};
use log::{error, info};
use std::path::PathBuf;

use crate::checkin::http::HttpCheckInSubmitter;
use crate::checkin::{CheckInRequest, CheckInSubmitter};
use crate::cli::progress::{print_error, print_header, print_info, print_success, request_spinner};
use crate::cli::{Args, Commands};
use crate::core::config::{get_config_path, init_config, Config, TOKEN_ENV_VAR};
use crate::testdb::{self, RunnerConfig, ScenarioRunner};

/// Dispatch the parsed command
pub fn run_command(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Some(Commands::Simulate {
            names,
            tag,
            fail_fast,
            verbose,
        }) => simulate(names, tag.as_deref(), *fail_fast, *verbose),
        Some(Commands::Scenarios) => {
            testdb::print_available_scenarios();
            Ok(())
        }
        Some(Commands::CheckIn { event_id, payload }) => check_in(config, event_id, payload),
        Some(Commands::Config { path }) => handle_config_command(*path),
        Some(Commands::GenerateConfig { output }) => generate_config_file(output.clone()),
        Some(Commands::ShowConfig) => {
            show_config(config);
            Ok(())
        }
        None => {
            info!("No command given; running all scanner scenarios");
            info!("Run 'checkin-scanner --help' to see every command.");
            simulate(&[], None, false, true)
        }
    }
}

/// Run lifecycle scenarios against the mock platform
pub fn simulate(names: &[String], tag: Option<&str>, fail_fast: bool, verbose: bool) -> Result<()> {
    let config = RunnerConfig {
        verbose,
        fail_fast,
        tag_filter: tag.map(|t| vec![t.to_string()]),
        ..Default::default()
    };
    let mut runner = ScenarioRunner::with_config(config);

    let summary = if names.is_empty() {
        runner.run_all()
    } else {
        let unknown: Vec<&String> = names
            .iter()
            .filter(|n| testdb::ScenarioLibrary::by_name(n).is_none())
            .collect();
        if !unknown.is_empty() {
            anyhow::bail!(
                "unknown scenario(s): {:?}; run 'checkin-scanner scenarios' for the list",
                unknown
            );
        }
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        runner.run_by_names(&names)
    };

    println!(
        "\n✓ Scenarios complete: {}/{} passed",
        summary.passed, summary.total
    );
    if !summary.all_passed() {
        for result in summary.results.iter().filter(|r| !r.passed) {
            error!("{} failed: {}", result.name, result.failures.join("; "));
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Submit one check-in through the configured API
pub fn check_in(config: &Config, event_id: &str, payload: &str) -> Result<()> {
    let submitter = HttpCheckInSubmitter::from_config(&config.api)
        .context("failed to create the check-in client")?;
    let request = CheckInRequest::new(event_id, payload);
    request.validate()?;
    if config.api.effective_token().is_none() {
        info!(
            "No API token configured; set {} or [api] token if the server requires one",
            TOKEN_ENV_VAR
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let spinner = request_spinner(&format!("Checking in to event {}...", event_id));
    let result = runtime.block_on(submitter.submit(&request));
    spinner.finish_and_clear();

    print_header("CHECK-IN");
    match result {
        Ok(outcome) => {
            print_success(&outcome.message);
            Ok(())
        }
        Err(e) => {
            print_error(&e.user_message());
            print_info(&format!("Kind: {}", e.kind()));
            Err(e.into())
        }
    }
}

/// Show the config path, creating a default config if none exists
pub fn handle_config_command(show_path: bool) -> Result<()> {
    if show_path {
        let path = Config::get_active_config_path();
        println!("{}", path.display());
        if path.exists() {
            info!("Config file exists at: {}", path.display());
        } else {
            info!("Config file would be created at: {}", path.display());
        }
        return Ok(());
    }

    let path = init_config()?;
    info!("Config file: {}", path.display());
    info!("Edit this file, then run 'checkin-scanner show-config' to verify your settings.");
    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            std::fs::write(&path, Config::generate_default_config())
                .with_context(|| format!("failed to write {}", path.display()))?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to point the scanner at your events API.");
    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    if let Some(path) = get_config_path() {
        info!("User config location: {}", path.display());
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[api]");
    info!("  base_url = \"{}\"", config.api.base_url);
    info!(
        "  token = {}",
        if config.api.effective_token().is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    info!("  timeout_secs = {}", config.api.timeout_secs);
    info!("");
    info!("[scanner]");
    info!("  fps = {}", config.scanner.fps);
    info!(
        "  detection_region = {}x{}",
        config.scanner.detection_width, config.scanner.detection_height
    );
    info!("  resume_delay_ms = {}", config.scanner.resume_delay_ms);
    info!(
        "  keep_last_frame_on_pause = {}",
        config.scanner.keep_last_frame_on_pause
    );
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}
