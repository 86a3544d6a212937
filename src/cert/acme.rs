//! Let's Encrypt issuance through acme.sh in standalone HTTP-01 mode.

use std::fmt;
use std::path::Path;

use tracing::{info, warn};

use super::CertificateBundle;
use crate::app::App;
use crate::config::{self, ACME_EMAIL};
use crate::error::Result;
use crate::net::{self, Net};
use crate::shell::{self, Cmd, Runner, PROBE_TIMEOUT};
use crate::term::{self, Spinner};

const INSTALLER_URL: &str = "https://get.acme.sh";
const CA_SERVER: &str = "letsencrypt";
const KEY_TYPE: &str = "ec-256";
/// Daily at midnight.
const RENEWAL_SCHEDULE: &str = "0 0 * * *";
const CRON_MARKER: &str = "acme.sh";

/// Why an ACME attempt gave up and sent the operator back to the start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcmeFailure {
    EmptyDomain,
    IpMismatch { server_ip: String, domain_ip: String },
    ClientMissing,
    IssueFailed,
    InstallFailed,
}

impl fmt::Display for AcmeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyDomain => write!(f, "empty domain"),
            Self::IpMismatch {
                server_ip,
                domain_ip,
            } => write!(f, "domain resolves to {:?}, server is {:?}", domain_ip, server_ip),
            Self::ClientMissing => write!(f, "acme.sh not installed"),
            Self::IssueFailed => write!(f, "issuance failed"),
            Self::InstallFailed => write!(f, "certificate files missing after install"),
        }
    }
}

#[derive(Debug)]
pub enum AcmeOutcome {
    Issued(CertificateBundle),
    Restart(AcmeFailure),
}

/// acme.sh as installed under the operator's home directory.
pub struct AcmeIssuer<'a> {
    runner: &'a dyn Runner,
    script: &'a Path,
}

impl<'a> AcmeIssuer<'a> {
    pub fn new(runner: &'a dyn Runner, script: &'a Path) -> Self {
        Self { runner, script }
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.script.is_file()
    }

    /// Pipe the upstream installer into `sh`. Best effort; check
    /// [`is_installed`](Self::is_installed) afterwards.
    pub fn install(&self, net: &dyn Net) {
        let script = match net.fetch_text(INSTALLER_URL) {
            Ok(script) => script,
            Err(err) => {
                warn!(url = INSTALLER_URL, error = %err, "acme_installer_download_failed");
                return;
            }
        };
        let email = format!("email={}", ACME_EMAIL);
        shell::best_effort(
            self.runner,
            &Cmd::new("sh", &["-s", email.as_str()]).stdin(script),
        );
    }

    fn cmd(&self, args: &[&str]) -> Cmd {
        Cmd::new(&self.script.display().to_string(), args)
    }

    pub fn set_default_ca(&self) {
        shell::best_effort(
            self.runner,
            &self.cmd(&["--set-default-ca", "--server", CA_SERVER]),
        );
    }

    /// Standalone issuance on port 80. Success is judged from the tool's text.
    pub fn issue(&self, domain: &str) -> bool {
        let cmd = self.cmd(&[
            "--issue",
            "-d",
            domain,
            "--standalone",
            "-k",
            KEY_TYPE,
            "--insecure",
        ]);
        match self.runner.run(&cmd) {
            Ok(output) if output.timed_out => false,
            Ok(output) => !issue_failed(&output.combined()),
            Err(err) => {
                warn!(error = %err, "acme_issue_spawn_failed");
                false
            }
        }
    }

    pub fn install_cert(&self, domain: &str, cert: &Path, key: &Path) {
        let cert = cert.display().to_string();
        let key = key.display().to_string();
        shell::best_effort(
            self.runner,
            &self.cmd(&[
                "--install-cert",
                "-d",
                domain,
                "--ecc",
                "--fullchain-file",
                &cert,
                "--key-file",
                &key,
            ]),
        );
    }

    /// Replace any previous acme.sh cron entry with a daily renewal.
    pub fn register_renewal(&self) {
        let current = shell::probe(self.runner, &Cmd::new("crontab", &["-l"]));
        let table = renewal_crontab(&current, self.script);
        shell::best_effort(
            self.runner,
            &Cmd::new("crontab", &["-"]).stdin(table).timeout(PROBE_TIMEOUT),
        );
    }
}

/// acme.sh reports most failures on a zero exit; look at what it printed.
#[must_use]
pub fn issue_failed(output: &str) -> bool {
    output.contains("Domain not") || output.to_ascii_lowercase().contains("error")
}

/// `existing` without acme.sh lines, plus one renewal entry.
#[must_use]
pub fn renewal_crontab(existing: &str, script: &Path) -> String {
    let mut table: String = existing
        .lines()
        .filter(|line| !line.contains(CRON_MARKER))
        .map(|line| format!("{}\n", line))
        .collect();
    table.push_str(&format!(
        "{} {} --cron -f >/dev/null 2>&1\n",
        RENEWAL_SCHEDULE,
        script.display()
    ));
    table
}

/// One ACME attempt. Anything short of installed certificate files asks the
/// caller to restart certificate selection.
pub fn obtain(app: &mut App<'_>) -> Result<AcmeOutcome> {
    term::yellow("\nACME issuance needs:");
    println!("  - the domain resolving to this server's IP");
    println!("  - port 80 free and reachable");

    let domain = app.prompt.ask("\nDomain: ")?;
    if domain.is_empty() {
        term::red("Domain must not be empty");
        return Ok(AcmeOutcome::Restart(AcmeFailure::EmptyDomain));
    }

    term::green("Checking domain resolution...");
    let spinner = Spinner::start("resolving");
    let server_ip = net::server_ip(app.net);
    let domain_ip = app.net.resolve_domain(&domain).unwrap_or_default();
    spinner.finish();

    if domain_ip != server_ip {
        term::red(format!(
            "Domain {} resolves to {} but this server is {}",
            domain,
            if domain_ip.is_empty() { "nothing" } else { domain_ip.as_str() },
            server_ip
        ));
        return Ok(AcmeOutcome::Restart(AcmeFailure::IpMismatch {
            server_ip,
            domain_ip,
        }));
    }
    term::green("Domain resolution verified");

    let issuer = AcmeIssuer::new(app.runner, &app.settings.acme_script);
    if !issuer.is_installed() {
        term::green("\nInstalling acme.sh...");
        issuer.install(app.net);
    }
    if !issuer.is_installed() {
        term::red("acme.sh installation failed");
        return Ok(AcmeOutcome::Restart(AcmeFailure::ClientMissing));
    }

    let cert_path = app.settings.cert_file();
    let key_path = app.settings.key_file();

    term::green(format!("Requesting certificate for {}", domain));
    term::yellow("(this can take 30-60 seconds)");
    issuer.set_default_ca();
    let spinner = Spinner::start("issuing");
    let issued = issuer.issue(&domain);
    spinner.finish();
    if !issued {
        term::red("Certificate request failed. Possible causes:");
        term::yellow("  - the domain does not resolve to this server");
        term::yellow("  - port 80 is in use");
        term::yellow("  - a firewall blocks port 80");
        return Ok(AcmeOutcome::Restart(AcmeFailure::IssueFailed));
    }

    issuer.install_cert(&domain, &cert_path, &key_path);
    if !(cert_path.is_file() && key_path.is_file()) {
        term::red("Certificate installation failed");
        return Ok(AcmeOutcome::Restart(AcmeFailure::InstallFailed));
    }
    config::set_mode(&key_path, 0o600)?;
    config::set_mode(&cert_path, 0o644)?;
    term::green("Certificate issued");

    issuer.register_renewal();
    info!(domain = ?domain, "acme_certificate_installed");

    Ok(AcmeOutcome::Issued(CertificateBundle {
        cert_path,
        key_path,
        domain,
    }))
}
