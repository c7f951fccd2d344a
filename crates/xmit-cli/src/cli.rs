use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "xmit",
    version,
    about = "Publish static sites with content-addressed, deduplicated uploads",
    args_conflicts_with_subcommands = true,
    after_help = "\
Environment variables:
  XMIT_KEY              API key (overrides the stored key file)
  XMIT_URL              Discovery base URL (default: https://xmit.co)
  UPLOAD_PARALLELISM    Concurrent chunk uploads (default: 3)
  DOWNLOAD_PARALLELISM  Concurrent part downloads (default: 3)"
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Domain to publish to
    pub domain: Option<String>,

    /// Directory to publish (default: ./dist if present, else .)
    pub directory: Option<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Store the API key under the user configuration directory
    SetKey {
        /// The key; omit to be prompted without echo
        key: Option<String>,
    },

    /// Retrieve a published snapshot into a local directory
    Download {
        /// DOMAIN or DOMAIN@ID (omit ID for the latest snapshot)
        target: String,

        /// Destination directory
        destination: String,
    },

    /// List the teams your key belongs to
    Teams,
}

/// Split a `DOMAIN[@ID]` argument.
pub(crate) fn split_target(target: &str) -> (&str, Option<&str>) {
    match target.split_once('@') {
        Some((domain, id)) if !id.is_empty() => (domain, Some(id)),
        Some((domain, _)) => (domain, None),
        None => (target, None),
    }
}
