use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const RELEASE_VERSION: &str = "app/v2.7.0";
pub const RELEASE_REPO: &str = "apernet/hysteria";

pub const SERVICE_NAME: &str = "hysteria-server";
const SERVICE_FILE: &str = "/etc/systemd/system/hysteria-server.service";
const BBR_CONFIG_FILE: &str = "/etc/sysctl.d/99-hy2-bbr.conf";

const DEFAULT_CONFIG_DIR: &str = "/etc/hysteria";
const DEFAULT_BINARY_PATH: &str = "/usr/local/bin/hysteria";
const DEFAULT_CLIENT_DIR_NAME: &str = "hy";

/// Decoy site used when the operator leaves the masquerade prompt blank.
pub const DEFAULT_PROXY_SITE: &str = "maimai.sega.jp";
/// Common name of the self-signed certificate, also used as the client SNI.
pub const DEFAULT_CERT_DOMAIN: &str = "www.bing.com";
pub const ACME_EMAIL: &str = "acme@hy2.local";

/// Locations overridable from the command line or the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_dir: Option<PathBuf>,
    pub client_dir: Option<PathBuf>,
    pub binary_path: Option<PathBuf>,
}

/// Every path and constant the tool works with, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
    pub client_dir: PathBuf,
    pub binary_path: PathBuf,
    pub service_file: PathBuf,
    pub service_name: String,
    pub bbr_config_file: PathBuf,
    pub acme_script: PathBuf,
    pub os_release: PathBuf,
    pub release_repo: String,
    pub release_version: String,
}

impl Settings {
    #[must_use]
    pub fn resolve(overrides: Overrides) -> Self {
        let home = home_dir();
        Self {
            config_dir: overrides
                .config_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
            client_dir: overrides
                .client_dir
                .unwrap_or_else(|| home.join(DEFAULT_CLIENT_DIR_NAME)),
            binary_path: overrides
                .binary_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY_PATH)),
            service_file: PathBuf::from(SERVICE_FILE),
            service_name: SERVICE_NAME.to_string(),
            bbr_config_file: PathBuf::from(BBR_CONFIG_FILE),
            acme_script: home.join(".acme.sh").join("acme.sh"),
            os_release: PathBuf::from("/etc/os-release"),
            release_repo: RELEASE_REPO.to_string(),
            release_version: RELEASE_VERSION.to_string(),
        }
    }

    /// All paths rooted under `root`; used by tests and dry runs.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            config_dir: root.join("etc/hysteria"),
            client_dir: root.join("client"),
            binary_path: root.join("bin/hysteria"),
            service_file: root.join("systemd/hysteria-server.service"),
            service_name: SERVICE_NAME.to_string(),
            bbr_config_file: root.join("sysctl.d/99-hy2-bbr.conf"),
            acme_script: root.join(".acme.sh/acme.sh"),
            os_release: root.join("os-release"),
            release_repo: RELEASE_REPO.to_string(),
            release_version: RELEASE_VERSION.to_string(),
        }
    }

    /// Server config: <config_dir>/config.yaml
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.yaml")
    }

    #[must_use]
    pub fn backup_file(&self) -> PathBuf {
        self.config_dir.join("config.yaml.backup")
    }

    #[must_use]
    pub fn cert_file(&self) -> PathBuf {
        self.config_dir.join("cert.crt")
    }

    #[must_use]
    pub fn key_file(&self) -> PathBuf {
        self.config_dir.join("private.key")
    }

    #[must_use]
    pub fn client_yaml(&self) -> PathBuf {
        self.client_dir.join("hy-client.yaml")
    }

    #[must_use]
    pub fn client_json(&self) -> PathBuf {
        self.client_dir.join("hy-client.json")
    }

    #[must_use]
    pub fn share_link_file(&self) -> PathBuf {
        self.client_dir.join("url.txt")
    }

    /// Download URL of the release binary for the given architecture.
    #[must_use]
    pub fn release_url(&self, arch: &str) -> String {
        format!(
            "https://github.com/{}/releases/download/{}/hysteria-linux-{}",
            self.release_repo, self.release_version, arch
        )
    }
}

fn home_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => PathBuf::from("/root"),
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}
