//! The daemon's server config file.
//!
//! Written from a typed [`ServerConfig`] and read back into one, so edits
//! from the change-config menu never rewrite text in place.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::info;

use crate::cert::CertificateBundle;
use crate::config::{self, Settings};
use crate::error::{AppError, Result};

pub const HOP_PORT_MIN: u16 = 10000;
pub const HOP_INTERVAL: &str = "30s";

/// Port-hopping range, `start:end` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopRange {
    pub start: u16,
    pub end: u16,
}

impl HopRange {
    /// Both ends within [10000, 65535] and `start < end`.
    #[must_use]
    pub fn new(start: u16, end: u16) -> Option<Self> {
        (start >= HOP_PORT_MIN && end >= HOP_PORT_MIN && start < end).then_some(Self { start, end })
    }

    /// One end of a range: a digit string within [10000, 65535].
    #[must_use]
    pub fn parse_bound(value: &str) -> Option<u16> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value
            .parse::<u32>()
            .ok()
            .filter(|p| (u32::from(HOP_PORT_MIN)..=65535).contains(p))
            .map(|p| p as u16)
    }
}

impl fmt::Display for HopRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl FromStr for HopRange {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || AppError::InvalidConfig(format!("bad hop port range {:?}", s));
        let (start, end) = s.trim().split_once(':').ok_or_else(invalid)?;
        let start = Self::parse_bound(start).ok_or_else(invalid)?;
        let end = Self::parse_bound(end).ok_or_else(invalid)?;
        Self::new(start, end).ok_or_else(invalid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub password: String,
}

impl UserCredential {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_port: u16,
    pub hop_ports: Option<HopRange>,
    /// Never empty; the first entry is the primary user.
    pub users: Vec<UserCredential>,
    pub masquerade_site: String,
    pub tls: CertificateBundle,
}

impl ServerConfig {
    #[must_use]
    pub fn primary_password(&self) -> &str {
        self.users
            .first()
            .map(|u| u.password.as_str())
            .unwrap_or_default()
    }

    pub fn set_primary_password(&mut self, password: &str) {
        match self.users.first_mut() {
            Some(user) => user.password = password.to_string(),
            None => self.users.push(UserCredential::new(password)),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        render_server_config(
            &self.tls,
            self.listen_port,
            self.hop_ports,
            &self.users,
            &self.masquerade_site,
        )
    }

    /// Parse a file this tool wrote. The SNI domain is not part of the file,
    /// so the caller supplies it.
    pub fn parse(text: &str, domain: &str) -> Result<Self> {
        let raw: RawConfig = serde_yaml::from_str(text)?;

        let listen_port = raw
            .listen
            .rsplit(':')
            .next()
            .and_then(|p| p.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
            .ok_or_else(|| AppError::InvalidConfig(format!("bad listen value {:?}", raw.listen)))?;

        let users = match raw.auth.kind.as_str() {
            "password" => raw
                .auth
                .password
                .map(|p| vec![UserCredential::new(p)])
                .unwrap_or_default(),
            "userpass" => raw.auth.userpass.into_iter().map(UserCredential::new).collect(),
            other => {
                return Err(AppError::InvalidConfig(format!(
                    "unsupported auth type {:?}",
                    other
                )))
            }
        };
        if users.is_empty() {
            return Err(AppError::InvalidConfig("no users configured".to_string()));
        }

        let hop_ports = raw.hop_ports.first().map(|r| r.parse()).transpose()?;

        let url = raw.masquerade.proxy.url;
        let masquerade_site = url.strip_prefix("https://").unwrap_or(&url).to_string();

        Ok(Self {
            listen_port,
            hop_ports,
            users,
            masquerade_site,
            tls: CertificateBundle {
                cert_path: raw.tls.cert.into(),
                key_path: raw.tls.key.into(),
                domain: domain.to_string(),
            },
        })
    }

    pub fn load(settings: &Settings, domain: &str) -> Result<Self> {
        let path = settings.config_file();
        if !path.exists() {
            return Err(AppError::ConfigMissing(path));
        }
        let text = fs::read_to_string(&path)?;
        Self::parse(&text, domain)
    }

    /// Overwrites the config file; nothing from a previous file is merged.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        config::ensure_dir(&settings.config_dir)?;
        let path = settings.config_file();
        fs::write(&path, self.render())?;
        info!(path = ?path.display().to_string(), "server_config_written");
        Ok(())
    }
}

/// Copies config.yaml to config.yaml.backup when present.
pub fn backup(settings: &Settings) -> Result<Option<std::path::PathBuf>> {
    let path = settings.config_file();
    if !path.exists() {
        return Ok(None);
    }
    let backup = settings.backup_file();
    fs::copy(&path, &backup)?;
    info!(path = ?backup.display().to_string(), "server_config_backed_up");
    Ok(Some(backup))
}

pub fn render_server_config(
    tls: &CertificateBundle,
    port: u16,
    hop_ports: Option<HopRange>,
    users: &[UserCredential],
    masquerade_site: &str,
) -> String {
    let mut out = format!(
        "listen: :{port}\ntls:\n  cert: {cert}\n  key: {key}\nauth:\n",
        port = port,
        cert = yaml_scalar(&display_path(&tls.cert_path)),
        key = yaml_scalar(&display_path(&tls.key_path)),
    );

    if let [user] = users {
        out.push_str("  type: password\n");
        out.push_str(&format!("  password: {}\n", yaml_scalar(&user.password)));
    } else {
        out.push_str("  type: userpass\n  userpass:\n");
        for user in users {
            out.push_str(&format!("  - {}\n", double_quoted(&user.password)));
        }
    }

    out.push_str(&format!(
        "masquerade:\n  type: proxy\n  proxy:\n    url: {}\n    rewriteHost: true\n",
        yaml_scalar(&format!("https://{}", masquerade_site))
    ));

    if let Some(range) = hop_ports {
        out.push_str(&format!(
            "transport:\n  udp:\n    hopInterval: {}\nhopPorts:\n  - {}\n",
            HOP_INTERVAL, range
        ));
    }
    out
}

// Flow indicators are only special at the start, which the leading-character
// rule already excludes.
const YAML_INDICATORS: &str = "#\"'\\`&*!|>%@";
const YAML_RESERVED: [&str; 11] = [
    "null", "true", "false", "yes", "no", "on", "off", "y", "n", "inf", "nan",
];

/// `value` as a YAML scalar that reads back as the same string: plain when
/// that is unambiguous, double-quoted otherwise.
#[must_use]
pub fn yaml_scalar(value: &str) -> String {
    if is_plain_safe(value) {
        value.to_string()
    } else {
        double_quoted(value)
    }
}

fn is_plain_safe(value: &str) -> bool {
    let Some(first) = value.chars().next() else {
        return false;
    };
    // Digit-led values only stay plain as host:port; anything else may be a number.
    let leads = first.is_ascii_alphabetic()
        || first == '/'
        || (first.is_ascii_digit() && value.contains(':'));
    leads
        && !value.ends_with(':')
        && value
            .chars()
            .all(|c| c.is_ascii_graphic() && !YAML_INDICATORS.contains(c))
        && !YAML_RESERVED.iter().any(|w| value.eq_ignore_ascii_case(w))
        && value.parse::<f64>().is_err()
}

fn double_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    listen: String,
    tls: RawTls,
    auth: RawAuth,
    masquerade: RawMasquerade,
    #[serde(rename = "hopPorts", default)]
    hop_ports: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTls {
    cert: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct RawAuth {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    userpass: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMasquerade {
    proxy: RawProxy,
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    url: String,
}
