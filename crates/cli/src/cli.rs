use clap::{Parser, Subcommand};

/// Contributor client for a multi-party zKey ceremony.
#[derive(Parser, Debug)]
#[command(name = "ceremony-cli", about = "Contribute to a zKey trusted-setup ceremony")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store the OAuth token obtained from the identity provider's
    /// authorization-code flow (completed in a browser outside this CLI).
    Login {
        /// OAuth token with the paste/gist publish scope.
        #[arg(long)]
        token: String,
    },
    /// Forget the stored session.
    Logout,
    /// Join the ceremony's contribution queue and run to completion.
    Contribute {
        /// Ceremony id; overrides CEREMONY_ID from the environment.
        #[arg(long)]
        ceremony_id: Option<String>,
    },
}
