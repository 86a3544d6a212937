use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "hy2", about = "Hysteria 2 installer and manager", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<String>,

    /// Server config directory
    #[arg(long, env = "HY2_CONFIG_DIR", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Client config directory
    #[arg(long, env = "HY2_CLIENT_DIR", global = true)]
    pub client_dir: Option<PathBuf>,

    /// Where the hysteria binary is installed
    #[arg(long, env = "HY2_BINARY_PATH", global = true)]
    pub binary_path: Option<PathBuf>,
}

impl Cli {
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_dir: self.config_dir.clone(),
            client_dir: self.client_dir.clone(),
            binary_path: self.binary_path.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Interactive menu (default)
    Menu,

    /// Download, configure and start Hysteria 2
    Install,

    /// Run the configuration wizard for an already downloaded binary
    Configure,

    /// Stop the service and remove the binary and unit file
    Uninstall,

    /// Start and enable the service
    Start,

    /// Stop the service
    Stop,

    /// Restart the service
    Restart,

    /// Show systemd status
    Status,

    /// Follow the service journal
    Logs,

    /// Change port, password, certificate or masquerade site
    ChangeConfig,

    /// Print the share link and its QR code
    ShowConfig,
}
