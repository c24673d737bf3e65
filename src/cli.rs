use std::path::PathBuf;

use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cell-bridge", about = "Multi-language cell execution bridge", version)]
#[command(group(ArgGroup::new("shortcut").args(["list_projects", "list_secrets"]).multiple(false)))]
pub struct Cli {
    /// Path to a KEY=VALUE config file (default: <config dir>/cell_bridge/.bridgerc).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind the WebSocket server to.
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Shared token every message must carry.
    #[arg(long)]
    pub token: Option<String>,

    /// Directory holding project files, the secrets file and exports.
    #[arg(long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the remote execution service.
    #[arg(long = "delegate-url")]
    pub delegate_url: Option<String>,

    /// Enable trusted local execution: cells starting with `!` run as host
    /// shell commands.
    ///
    /// Anyone holding the token gets unrestricted command execution on this host.
    #[arg(long = "allow-shell")]
    pub allow_shell: bool,

    /// List projects in the data directory and exit.
    #[arg(long = "list-projects", visible_alias = "lp")]
    pub list_projects: bool,

    /// List secrets (masked) and exit.
    #[arg(long = "list-secrets", visible_alias = "ls")]
    pub list_secrets: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
