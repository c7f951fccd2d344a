mod cli;

use std::path::{Path, PathBuf};

use clap::Parser;

use xmit_core::commands::{download, teams, upload};
use xmit_core::{keyfile, Config};
use xmit_types::{Result, XmitError};

use crate::cli::{split_target, Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::SetKey { key }) => run_set_key(key),
        Some(Commands::Download {
            target,
            destination,
        }) => {
            let config = Config::from_env()?;
            let (domain, id) = split_target(&target);
            download::run(&config, domain, id, Path::new(&destination))?;
            Ok(())
        }
        Some(Commands::Teams) => run_teams(),
        None => {
            let Some(domain) = cli.domain else {
                return Err(XmitError::Config(
                    "missing domain; run 'xmit --help' for usage".into(),
                ));
            };
            let config = Config::from_env()?;
            let directory = find_directory(cli.directory.as_deref())?;
            let stats = upload::run(&config, &domain, &directory)?;
            println!(
                "Published {domain}: {} file(s), {} bytes, {} part(s) uploaded",
                stats.files, stats.total_bytes, stats.parts_uploaded
            );
            Ok(())
        }
    }
}

fn run_set_key(key: Option<String>) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => {
            println!(
                "API keys are provisioned after logging into the service's admin console.\n\
                 User keys are best on personal machines, team keys for CI systems."
            );
            rpassword::prompt_password("Enter your API key (no echo): ")
                .map_err(|e| XmitError::Config(format!("reading key: {e}")))?
        }
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(XmitError::Config("refusing to store an empty key".into()));
    }
    keyfile::store(key)?;
    println!("Key stored.");
    Ok(())
}

fn run_teams() -> Result<()> {
    let config = Config::from_env()?;
    let listing = teams::run(&config)?;
    if listing.teams.is_empty() {
        println!("No teams.");
    } else {
        for team in &listing.teams {
            println!(
                "{:<24} {}",
                team.id.as_deref().unwrap_or("-"),
                team.name.as_deref().unwrap_or("-")
            );
        }
    }
    if let Some(url) = listing.management_url {
        println!("Manage teams at: {url}");
    }
    Ok(())
}

/// Pick the upload directory: the explicit argument, else `dist` when it
/// exists, else the working directory; always absolute.
fn find_directory(arg: Option<&str>) -> Result<PathBuf> {
    let chosen = match arg {
        Some(dir) => PathBuf::from(dir),
        None => {
            if Path::new("dist").is_dir() {
                PathBuf::from("dist")
            } else {
                PathBuf::from(".")
            }
        }
    };
    chosen
        .canonicalize()
        .map_err(|e| XmitError::Config(format!("invalid directory '{}': {e}", chosen.display())))
}
