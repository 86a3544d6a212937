use std::path::PathBuf;

use super::CertificateBundle;
use crate::error::Result;
use crate::term::{self, Prompt};

/// Re-asks for all three values until both files exist and the domain is set.
pub fn prompt_for_files(prompt: &mut dyn Prompt) -> Result<CertificateBundle> {
    loop {
        let cert = prompt.ask("Certificate path [.crt]: ")?;
        let key = prompt.ask("Private key path [.key]: ")?;
        let domain = prompt.ask("Certificate domain: ")?;

        if cert.is_empty() || !PathBuf::from(&cert).is_file() {
            term::red(format!("Certificate file not found: {}", cert));
            continue;
        }
        if key.is_empty() || !PathBuf::from(&key).is_file() {
            term::red(format!("Private key file not found: {}", key));
            continue;
        }
        if domain.is_empty() {
            term::red("Domain must not be empty");
            continue;
        }

        return Ok(CertificateBundle {
            cert_path: PathBuf::from(cert),
            key_path: PathBuf::from(key),
            domain,
        });
    }
}
