use super::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sessionguard", about = "Session tokens and request throttling")]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the HTTP API (default).
    Serve,
    /// Mint a token pair for a user and print it as JSON.
    Issue {
        #[arg(long)]
        user_id: uuid::Uuid,
        #[arg(long, default_value = "user")]
        role: String,
    },
}
