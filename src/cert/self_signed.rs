use tracing::info;

use super::CertificateBundle;
use crate::config::{self, Settings, DEFAULT_CERT_DOMAIN};
use crate::error::Result;
use crate::shell::{self, Cmd, Runner};
use crate::term;

const CURVE: &str = "prime256v1";
/// Roughly a hundred years.
const VALIDITY_DAYS: &str = "36500";

/// EC key + self-signed certificate in the config directory. openssl failures
/// are fatal.
pub fn generate(runner: &dyn Runner, settings: &Settings) -> Result<CertificateBundle> {
    let cert_path = settings.cert_file();
    let key_path = settings.key_file();
    let cert = cert_path.display().to_string();
    let key = key_path.display().to_string();

    term::yellow("Generating self-signed certificate...");
    term::yellow("  - private key");
    shell::checked(
        runner,
        &Cmd::new("openssl", &["ecparam", "-genkey", "-name", CURVE, "-out", &key]),
    )?;
    config::set_mode(&key_path, 0o600)?;

    term::yellow("  - certificate");
    let subject = format!("/CN={}", DEFAULT_CERT_DOMAIN);
    shell::checked(
        runner,
        &Cmd::new(
            "openssl",
            &[
                "req", "-new", "-x509", "-days", VALIDITY_DAYS, "-key", &key, "-out", &cert,
                "-subj", &subject,
            ],
        ),
    )?;
    config::set_mode(&cert_path, 0o644)?;

    info!(cert = ?cert, key = ?key, "self_signed_certificate_generated");
    term::green("Certificate generated");
    Ok(CertificateBundle {
        cert_path,
        key_path,
        domain: DEFAULT_CERT_DOMAIN.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::generate;
    use crate::config::Settings;
    use crate::error::AppError;
    use crate::testing::{write_out_arg, FakeRunner};

    #[test]
    fn generates_key_then_cert_with_restricted_key_mode() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        std::fs::create_dir_all(&settings.config_dir).unwrap();
        let runner = FakeRunner::new()
            .on("openssl ecparam", write_out_arg)
            .on("openssl req", write_out_arg);

        let bundle = generate(&runner, &settings).unwrap();

        let lines = runner.command_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("openssl ecparam -genkey -name prime256v1 -out "));
        assert!(lines[1].contains("-days 36500"));
        assert!(lines[1].ends_with("-subj /CN=www.bing.com"));

        let mode = |p: &std::path::Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&bundle.key_path), 0o600);
        assert_eq!(mode(&bundle.cert_path), 0o644);
        assert_eq!(bundle.domain, "www.bing.com");
        assert!(bundle.is_usable());
    }

    #[test]
    fn openssl_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let runner = FakeRunner::new().respond_full("openssl ecparam", 1, "", "unknown curve");
        let err = generate(&runner, &settings).unwrap_err();
        assert!(matches!(err, AppError::CommandFailed { .. }));
        assert_eq!(runner.count("openssl req"), 0);
    }
}
