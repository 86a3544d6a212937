//! Host preparation: privileges, distribution, packages, binary, BBR.

use std::fs;

use nix::unistd::Uid;
use tracing::{info, warn};

use crate::config::{self, Settings};
use crate::error::{AppError, Result};
use crate::shell::{self, Cmd, Runner};
use crate::term::{self, Prompt};

const PACKAGES: [&str; 6] = ["curl", "wget", "qrencode", "openssl", "socat", "cron"];
const BBR_SYSCTL: &str = "net.core.default_qdisc=fq\nnet.ipv4.tcp_congestion_control=bbr\n";

/// Who the process runs as.
pub trait Privilege {
    fn is_root(&self) -> bool;
}

/// The real effective uid.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectiveUser;

impl Privilege for EffectiveUser {
    fn is_root(&self) -> bool {
        Uid::effective().is_root()
    }
}

pub fn require_root(privilege: &dyn Privilege) -> Result<()> {
    if privilege.is_root() {
        Ok(())
    } else {
        Err(AppError::NotRoot)
    }
}

/// Warns on anything but Ubuntu and lets the operator decide. Returns whether
/// to go on.
pub fn check_distribution(settings: &Settings, prompt: &mut dyn Prompt) -> Result<bool> {
    match fs::read_to_string(&settings.os_release) {
        Ok(content) if content.to_ascii_lowercase().contains("ubuntu") => Ok(true),
        Ok(_) => {
            term::red("Warning: this tool targets Ubuntu");
            term::confirm(prompt, "Continue anyway? [y/N]: ", false)
        }
        Err(err) => {
            warn!(path = ?settings.os_release.display().to_string(), error = %err, "os_release_unreadable");
            term::red("Could not detect the distribution");
            Ok(true)
        }
    }
}

pub fn install_dependencies(runner: &dyn Runner) {
    term::green("Updating package lists...");
    shell::best_effort(runner, &Cmd::new("apt-get", &["update", "-y"]));

    term::green("Installing dependencies...");
    let mut args = vec!["install", "-y"];
    args.extend(PACKAGES);
    shell::best_effort(
        runner,
        &Cmd::new("apt-get", &args).env("DEBIAN_FRONTEND", "noninteractive"),
    );
}

/// Release asset suffix for a Rust target architecture.
#[must_use]
pub fn release_arch(arch: &str) -> &'static str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => "amd64",
    }
}

pub fn download_binary(runner: &dyn Runner, settings: &Settings) -> Result<()> {
    let url = settings.release_url(release_arch(std::env::consts::ARCH));
    term::green(format!("Downloading Hysteria 2 {}...", settings.release_version));
    term::yellow(format!("  from {}", url));

    if let Some(parent) = settings.binary_path.parent() {
        config::ensure_dir(parent)?;
    }
    let target = settings.binary_path.display().to_string();
    let cmd = Cmd::new(
        "wget",
        &["--progress=bar:force", "-O", target.as_str(), url.as_str()],
    )
    .inherit();
    shell::checked(runner, &cmd).map_err(|err| {
        term::red("Download failed; check the network and retry");
        AppError::Download(err.to_string())
    })?;

    if !settings.binary_path.is_file() {
        return Err(AppError::Download(format!("{} missing after download", target)));
    }
    config::set_mode(&settings.binary_path, 0o755)?;
    let size = fs::metadata(&settings.binary_path)?.len();
    term::green(format!("  done, {:.1} KiB", size as f64 / 1024.0));
    info!(path = ?target, bytes = size, "binary_downloaded");
    Ok(())
}

/// Switches congestion control to BBR unless already active.
pub fn enable_bbr(runner: &dyn Runner, settings: &Settings) -> Result<()> {
    term::yellow("Configuring BBR...");
    let current = shell::probe(runner, &Cmd::new("sysctl", &["net.ipv4.tcp_congestion_control"]));
    if current.contains("bbr") {
        term::green("BBR already enabled");
        return Ok(());
    }

    if let Some(parent) = settings.bbr_config_file.parent() {
        config::ensure_dir(parent)?;
    }
    fs::write(&settings.bbr_config_file, BBR_SYSCTL)?;
    let file = settings.bbr_config_file.display().to_string();
    shell::best_effort(runner, &Cmd::new("sysctl", &["-p", file.as_str()]));
    term::green("BBR enabled");
    term::yellow("Takes full effect after a reboot");
    info!(path = ?file, "bbr_enabled");
    Ok(())
}
