use clap::Parser;
use std::path::PathBuf;

/// Roster bulk-edit sidecar. Speaks JSON lines on stdin/stdout; logs go to stderr.
#[derive(Parser, Debug, Clone)]
#[command(name = "rosterd", version, about)]
pub struct Args {
    /// Workspace directory to open at startup
    #[arg(long, env = "ROSTERD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
