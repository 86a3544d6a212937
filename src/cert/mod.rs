//! TLS certificate acquisition: self-signed, operator-supplied, or ACME.

pub mod acme;
pub mod custom;
pub mod self_signed;

use std::path::PathBuf;

use tracing::{info, warn};

use crate::app::App;
use crate::config;
use crate::error::Result;
use crate::term;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// SNI presented by clients.
    pub domain: String,
}

impl CertificateBundle {
    /// Non-empty fields and both files on disk.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.domain.is_empty()
            && !self.cert_path.as_os_str().is_empty()
            && !self.key_path.as_os_str().is_empty()
            && self.cert_path.is_file()
            && self.key_path.is_file()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStrategy {
    SelfSigned,
    Custom,
    Acme,
}

impl CertStrategy {
    /// Anything but "2" or "3" selects the self-signed default.
    #[must_use]
    pub fn from_choice(choice: &str) -> Self {
        match choice.trim() {
            "2" => Self::Custom,
            "3" => Self::Acme,
            _ => Self::SelfSigned,
        }
    }
}

fn print_strategy_menu() {
    println!();
    term::rule('=');
    term::green("Certificate source:");
    println!("  1. Self-signed certificate (default)");
    println!("  2. Custom certificate files");
    println!("  3. ACME / Let's Encrypt (requires a domain)");
    term::rule('=');
}

/// Ask for a strategy and run it. ACME failures start over from the strategy
/// menu, as often as it takes; only the operator ends the loop.
pub fn provision(app: &mut App<'_>) -> Result<CertificateBundle> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        print_strategy_menu();
        let strategy = CertStrategy::from_choice(&app.prompt.ask("Choose [1-3]: ")?);
        config::ensure_dir(&app.settings.config_dir)?;
        info!(strategy = ?strategy, attempt = attempt, "certificate_strategy_selected");

        let bundle = match strategy {
            CertStrategy::SelfSigned => self_signed::generate(app.runner, app.settings)?,
            CertStrategy::Custom => custom::prompt_for_files(app.prompt)?,
            CertStrategy::Acme => match acme::obtain(app)? {
                acme::AcmeOutcome::Issued(bundle) => bundle,
                acme::AcmeOutcome::Restart(reason) => {
                    warn!(reason = %reason, attempt = attempt, "acme_restart");
                    continue;
                }
            },
        };
        return Ok(bundle);
    }
}
