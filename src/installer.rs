//! Install, configure, uninstall and change-config workflows.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::app::App;
use crate::cert;
use crate::client::{self, ClientArtifacts};
use crate::collect::{self, PASSWORD_LEN};
use crate::config::DEFAULT_CERT_DOMAIN;
use crate::error::Result;
use crate::firewall;
use crate::net;
use crate::server_config::{self, ServerConfig};
use crate::service::Systemd;
use crate::status::InstallStatus;
use crate::system;
use crate::term;

/// Full install: dependencies and binary when missing, then the wizard.
pub fn install(app: &mut App<'_>) -> Result<()> {
    term::print_header();
    system::require_root(app.privilege)?;
    if !system::check_distribution(app.settings, app.prompt)? {
        term::yellow("Cancelled");
        return Ok(());
    }

    match InstallStatus::detect(app.settings) {
        InstallStatus::NotInstalled => {
            term::print_step(1, 2, "Dependencies and download");
            system::install_dependencies(app.runner);
            if app.settings.binary_path.exists() {
                term::green("Hysteria 2 binary present, skipping download");
            } else {
                system::download_binary(app.runner, app.settings)?;
            }
            wizard(app)
        }
        InstallStatus::BinaryOnly => {
            term::yellow("Hysteria 2 is downloaded but not configured");
            term::yellow("Starting configuration...");
            wizard(app)
        }
        InstallStatus::Installed => {
            term::yellow("Hysteria 2 is already installed");
            reconfigure(app)
        }
    }
}

/// Drops the binary and installs from scratch.
pub fn reinstall(app: &mut App<'_>) -> Result<()> {
    system::require_root(app.privilege)?;
    remove_if_present(&app.settings.binary_path)?;
    info!(path = ?app.settings.binary_path.display().to_string(), "binary_removed_for_reinstall");
    install(app)
}

/// Runs the wizard on top of an existing binary.
pub fn configure(app: &mut App<'_>) -> Result<()> {
    system::require_root(app.privilege)?;
    wizard(app)
}

pub fn reconfigure(app: &mut App<'_>) -> Result<()> {
    system::require_root(app.privilege)?;
    if term::confirm(app.prompt, "Reconfigure? [y/N]: ", false)? {
        wizard(app)
    } else {
        term::yellow("Cancelled");
        Ok(())
    }
}

/// Certificate, answers, config files, firewall, service; then the summary.
pub fn wizard(app: &mut App<'_>) -> Result<()> {
    term::print_step(2, 2, "Configure Hysteria 2");

    let tls = cert::provision(app)?;
    let answers = collect::collect(app.prompt, app.runner)?;

    if term::confirm(app.prompt, "\nEnable BBR? [Y/n]: ", true)? {
        system::enable_bbr(app.runner, app.settings)?;
    }

    let server = ServerConfig {
        listen_port: answers.port,
        hop_ports: answers.hop_ports,
        users: answers.users,
        masquerade_site: answers.masquerade_site,
        tls,
    };
    server.save(app.settings)?;
    term::yellow(format!("Server config written: {}", app.settings.config_file().display()));

    let artifacts = ClientArtifacts {
        server_ip: net::server_ip(app.net),
        port: server.listen_port,
        hop_ports: server.hop_ports,
        password: server.primary_password().to_string(),
        sni: server.tls.domain.clone(),
    };
    let link = artifacts.write(app.settings)?;
    term::green("Config files generated");

    firewall::open_ports(app.runner, server.listen_port, server.hop_ports);

    term::green("Creating systemd service...");
    let systemd = Systemd::new(app.runner, app.settings);
    systemd.register()?;

    println!();
    term::rule('-');
    term::blue("Starting service");
    term::rule('-');
    systemd.enable_and_restart();

    if systemd.wait_for_active() {
        info!(port = server.listen_port, sni = ?server.tls.domain, "install_complete");
        print_result(app, &artifacts, &link);
    } else {
        warn!(service = ?app.settings.service_name, "service_not_active_after_install");
        term::red(format!(
            "Service failed to start; check the log: journalctl -u {}",
            app.settings.service_name
        ));
    }
    Ok(())
}

fn print_result(app: &App<'_>, artifacts: &ClientArtifacts, link: &str) {
    println!();
    term::rule('=');
    term::green("Hysteria 2 installed");
    term::rule('=');

    println!("\nServer:   {}", artifacts.host());
    println!("Port:     {}", artifacts.port);
    println!("Password: {}", artifacts.password);
    println!("SNI:      {}", artifacts.sni);

    println!();
    term::rule('-');
    term::yellow("Share link:");
    println!("{}", link);

    println!();
    term::rule('-');
    term::yellow("QR code (scan to import):");
    match client::qrcode(app.runner, link) {
        Some(code) => println!("{}", code),
        None => term::red("QR code unavailable; enter the share link by hand"),
    }

    println!();
    term::rule('-');
    term::yellow(format!("Client files: {}", app.settings.client_dir.display()));
    println!("  - hy-client.yaml  (client config)");
    println!("  - hy-client.json  (JSON)");
    println!("  - url.txt         (share link)");
    term::rule('=');
}

pub fn uninstall(app: &mut App<'_>) -> Result<()> {
    system::require_root(app.privilege)?;
    if !term::confirm(app.prompt, "Uninstall Hysteria 2? [y/N]: ", false)? {
        return Ok(());
    }

    let systemd = Systemd::new(app.runner, app.settings);
    systemd.deactivate();
    remove_if_present(&app.settings.service_file)?;
    remove_if_present(&app.settings.binary_path)?;

    if term::confirm(app.prompt, "Remove config and client files? [y/N]: ", false)? {
        for dir in [&app.settings.config_dir, &app.settings.client_dir] {
            if let Err(err) = fs::remove_dir_all(dir) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(path = ?dir.display().to_string(), error = %err, "remove_dir_failed");
                }
            }
        }
    }

    systemd.daemon_reload();
    info!("uninstalled");
    term::green("Uninstalled");
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

/// Edits one setting of the installed config. The file is parsed into a
/// [`ServerConfig`], changed and written back whole; the service restarts.
pub fn change_config(app: &mut App<'_>) -> Result<()> {
    system::require_root(app.privilege)?;

    println!();
    term::rule('=');
    term::green("Change configuration");
    term::rule('=');
    println!("1. Port");
    println!("2. Password");
    println!("3. Certificate");
    println!("4. Masquerade site");

    let choice = app.prompt.ask("\nChoose [1-4]: ")?;

    if !app.settings.config_file().exists() {
        term::red("Config file not found; install Hysteria 2 first");
        return Ok(());
    }
    if let Some(path) = server_config::backup(app.settings)? {
        term::green(format!("Config backed up to {}", path.display()));
    }

    let domain = client::current_sni(app.settings).unwrap_or_else(|| {
        warn!("share_link_sni_missing");
        DEFAULT_CERT_DOMAIN.to_string()
    });
    let mut server = ServerConfig::load(app.settings, &domain)?;

    match choice.as_str() {
        "1" => {
            server.listen_port = ask_new_port(app)?;
            server.save(app.settings)?;
            term::green(format!("Port changed to {}", server.listen_port));
            firewall::open_ports(app.runner, server.listen_port, server.hop_ports);
            refresh_client(app, &server)?;
        }
        "2" => {
            let mut password = app.prompt.ask("\nNew password (Enter for random): ")?;
            if password.is_empty() {
                password = collect::generate_password(PASSWORD_LEN);
            }
            server.set_primary_password(&password);
            server.save(app.settings)?;
            term::green(format!("Password changed to {}", password));
            refresh_client(app, &server)?;
        }
        "3" => {
            server.tls = cert::provision(app)?;
            server.save(app.settings)?;
            term::green("Certificate updated");
            refresh_client(app, &server)?;
        }
        "4" => {
            let site = app.prompt.ask("\nNew masquerade site: ")?;
            if site.is_empty() {
                term::yellow("Unchanged");
                return Ok(());
            }
            server.masquerade_site = site;
            server.save(app.settings)?;
            term::green(format!("Masquerade site changed to {}", server.masquerade_site));
        }
        _ => {
            term::red("Invalid choice");
            return Ok(());
        }
    }

    info!(choice = ?choice, "config_changed");
    Systemd::new(app.runner, app.settings)
        .restart()
        .report("Service restarted with the new config");
    Ok(())
}

fn ask_new_port(app: &mut App<'_>) -> Result<u16> {
    loop {
        let port = term::ask_parsed(
            app.prompt,
            "\nNew port [1-65535]: ",
            None,
            collect::parse_port,
            "Port range: 1-65535",
        )?;
        if collect::is_port_available(app.runner, port) {
            return Ok(port);
        }
        term::red(format!("Port {} is already in use", port));
    }
}

/// Rewrites the client files from the saved server config.
fn refresh_client(app: &App<'_>, server: &ServerConfig) -> Result<()> {
    let artifacts = ClientArtifacts {
        server_ip: net::server_ip(app.net),
        port: server.listen_port,
        hop_ports: server.hop_ports,
        password: server.primary_password().to_string(),
        sni: server.tls.domain.clone(),
    };
    let link = artifacts.write(app.settings)?;
    term::yellow("\nNew share link:");
    println!("{}", link);
    Ok(())
}
