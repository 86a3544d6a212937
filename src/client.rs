//! Client-side artifacts: YAML config, JSON mirror and the share link.

use std::fs;

use serde::Serialize;
use tracing::info;

use crate::config::{self, Settings};
use crate::error::Result;
use crate::net;
use crate::server_config::{yaml_scalar, HopRange};
use crate::shell::{self, Cmd, Runner};
use crate::term;

const SOCKS5_LISTEN: &str = "127.0.0.1:5080";

/// Everything a client needs to reach the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientArtifacts {
    pub server_ip: String,
    pub port: u16,
    pub hop_ports: Option<HopRange>,
    pub password: String,
    pub sni: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientJson<'a> {
    server: String,
    auth: &'a str,
    tls: TlsJson<'a>,
    fast_open: bool,
    socks5: Socks5Json,
}

#[derive(Serialize)]
struct TlsJson<'a> {
    sni: &'a str,
    insecure: bool,
}

#[derive(Serialize)]
struct Socks5Json {
    listen: &'static str,
}

impl ClientArtifacts {
    /// The server address as it appears before `:port`.
    #[must_use]
    pub fn host(&self) -> String {
        if net::is_ipv6(&self.server_ip) {
            format!("[{}]", self.server_ip)
        } else {
            self.server_ip.clone()
        }
    }

    /// `host:port`, plus `,start:end` when hopping.
    #[must_use]
    pub fn server_field(&self) -> String {
        match self.hop_ports {
            Some(range) => format!("{}:{},{}", self.host(), self.port, range),
            None => format!("{}:{}", self.host(), self.port),
        }
    }

    #[must_use]
    pub fn render_yaml(&self) -> String {
        format!(
            "server: {}\nauth: {}\ntls:\n  sni: {}\n  insecure: true\nfastOpen: true\nsocks5:\n  listen: {}\n",
            yaml_scalar(&self.server_field()),
            yaml_scalar(&self.password),
            yaml_scalar(&self.sni),
            SOCKS5_LISTEN
        )
    }

    pub fn render_json(&self) -> Result<String> {
        let doc = ClientJson {
            server: self.server_field(),
            auth: &self.password,
            tls: TlsJson {
                sni: &self.sni,
                insecure: true,
            },
            fast_open: true,
            socks5: Socks5Json {
                listen: SOCKS5_LISTEN,
            },
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Carries the main port only; hop ranges live in the client config.
    #[must_use]
    pub fn share_link(&self) -> String {
        format!(
            "hysteria2://{}@{}:{}/?insecure=1&sni={}#HY2",
            urlencoding::encode(&self.password),
            self.host(),
            self.port,
            self.sni
        )
    }

    /// Writes all three files into the client directory; returns the link.
    pub fn write(&self, settings: &Settings) -> Result<String> {
        config::ensure_dir(&settings.client_dir)?;
        fs::write(settings.client_yaml(), self.render_yaml())?;
        fs::write(settings.client_json(), self.render_json()?)?;
        let link = self.share_link();
        fs::write(settings.share_link_file(), &link)?;
        info!(
            dir = ?settings.client_dir.display().to_string(),
            server = ?self.server_field(),
            "client_artifacts_written"
        );
        Ok(link)
    }
}

/// The `sni` query value of a share link.
#[must_use]
pub fn share_link_sni(link: &str) -> Option<String> {
    let start = link.find("sni=")? + "sni=".len();
    let rest = &link[start..];
    let end = rest.find(['#', '&']).unwrap_or(rest.len());
    let sni = &rest[..end];
    (!sni.is_empty()).then(|| sni.to_string())
}

/// SNI recorded in the existing share link, if any.
pub fn current_sni(settings: &Settings) -> Option<String> {
    let link = fs::read_to_string(settings.share_link_file()).ok()?;
    share_link_sni(link.trim())
}

/// ANSI QR code of `text`, or `None` when qrencode is unavailable.
pub fn qrcode(runner: &dyn Runner, text: &str) -> Option<String> {
    let cmd = Cmd::new("qrencode", &["-t", "ANSIUTF8"]).stdin(format!("{}\n", text));
    let out = shell::probe(runner, &cmd);
    (!out.is_empty()).then_some(out)
}

pub fn show_config(settings: &Settings, runner: &dyn Runner) -> Result<()> {
    let path = settings.share_link_file();
    if !path.exists() {
        term::red("Client config not found");
        return Ok(());
    }
    let link = fs::read_to_string(&path)?;
    let link = link.trim();

    println!();
    term::rule('=');
    term::yellow("Share link:");
    println!("{}", link);
    println!("\nQR code:");
    if let Some(code) = qrcode(runner, link) {
        println!("{}", code);
    }
    term::rule('=');
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    fn artifacts() -> ClientArtifacts {
        ClientArtifacts {
            server_ip: "203.0.113.7".to_string(),
            port: 8443,
            hop_ports: None,
            password: "s3cretPW".to_string(),
            sni: "www.bing.com".to_string(),
        }
    }

    #[test]
    fn yaml_matches_client_format() {
        let expected = "\
server: 203.0.113.7:8443
auth: s3cretPW
tls:
  sni: www.bing.com
  insecure: true
fastOpen: true
socks5:
  listen: 127.0.0.1:5080
";
        assert_eq!(artifacts().render_yaml(), expected);
    }

    #[test]
    fn yaml_quotes_what_would_not_read_back() {
        let mut a = artifacts();
        a.server_ip = "2001:db8::1".to_string();
        a.password = "#no comment".to_string();
        let value: serde_yaml::Value = serde_yaml::from_str(&a.render_yaml()).unwrap();
        assert_eq!(value["server"].as_str(), Some("[2001:db8::1]:8443"));
        assert_eq!(value["auth"].as_str(), Some("#no comment"));

        a.hop_ports = HopRange::new(20000, 30000);
        assert!(a
            .render_yaml()
            .starts_with("server: \"[2001:db8::1]:8443,20000:30000\"\n"));
    }

    #[test]
    fn json_mirrors_yaml_fields() {
        let mut a = artifacts();
        a.hop_ports = HopRange::new(20000, 30000);
        let json = a.render_json().unwrap();
        assert!(json.starts_with("{\n  \"server\": "));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["server"], "203.0.113.7:8443,20000:30000");
        assert_eq!(value["auth"], "s3cretPW");
        assert_eq!(value["tls"]["sni"], "www.bing.com");
        assert_eq!(value["tls"]["insecure"], true);
        assert_eq!(value["fastOpen"], true);
        assert_eq!(value["socks5"]["listen"], "127.0.0.1:5080");
    }

    #[test]
    fn ipv6_hosts_are_bracketed_and_hop_range_stays_out_of_link() {
        let mut a = artifacts();
        a.server_ip = "2001:db8::7".to_string();
        a.hop_ports = HopRange::new(20000, 30000);
        assert_eq!(a.server_field(), "[2001:db8::7]:8443,20000:30000");
        assert_eq!(
            a.share_link(),
            "hysteria2://s3cretPW@[2001:db8::7]:8443/?insecure=1&sni=www.bing.com#HY2"
        );
    }

    #[test]
    fn share_link_percent_encodes_password() {
        let mut a = artifacts();
        a.password = "p@ss/w rd".to_string();
        let link = a.share_link();
        assert!(link.starts_with("hysteria2://p%40ss%2Fw%20rd@203.0.113.7:8443/"));
        let encoded = &link["hysteria2://".len()..link.find('@').unwrap()];
        assert_eq!(urlencoding::decode(encoded).unwrap(), "p@ss/w rd");
    }

    #[test]
    fn sni_is_read_back_from_link() {
        assert_eq!(
            share_link_sni(&artifacts().share_link()).as_deref(),
            Some("www.bing.com")
        );
        assert_eq!(share_link_sni("hysteria2://x@h:1/?sni=a.example&insecure=1").as_deref(), Some("a.example"));
        assert_eq!(share_link_sni("hysteria2://x@h:1/?insecure=1#HY2"), None);
    }

    #[test]
    fn write_creates_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let link = artifacts().write(&settings).unwrap();

        assert_eq!(fs::read_to_string(settings.share_link_file()).unwrap(), link);
        assert!(settings.client_yaml().is_file());
        assert!(settings.client_json().is_file());
        assert_eq!(current_sni(&settings).as_deref(), Some("www.bing.com"));
    }

    #[test]
    fn qrcode_feeds_link_on_stdin() {
        let runner = FakeRunner::new().respond("qrencode", 0, "█▀▀█");
        assert_eq!(qrcode(&runner, "hysteria2://x").as_deref(), Some("█▀▀█"));
        assert_eq!(runner.calls()[0].stdin.as_deref(), Some(&b"hysteria2://x\n"[..]));

        let missing = FakeRunner::new().missing("qrencode");
        assert_eq!(qrcode(&missing, "x"), None);
    }
}
