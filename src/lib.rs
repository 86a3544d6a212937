// hy2 library crate
//
// Everything behind the binary: the installer workflows plus the narrow
// seams (commands, network, prompts) they run through.

// Infrastructure
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod net;
pub mod shell;
pub mod signals;
pub mod term;

// Provisioning
pub mod cert;
pub mod client;
pub mod collect;
pub mod firewall;
pub mod server_config;
pub mod service;
pub mod status;
pub mod system;

// Workflows
pub mod installer;
pub mod menu;

#[cfg(test)]
mod testing;
