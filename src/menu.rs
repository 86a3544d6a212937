use tracing::debug;

use crate::app::App;
use crate::client;
use crate::error::Result;
use crate::installer;
use crate::service::Systemd;
use crate::status::InstallStatus;
use crate::term;

/// Status line text; queries systemd only when installed.
pub fn status_text(app: &App<'_>) -> String {
    match InstallStatus::detect(app.settings) {
        InstallStatus::Installed => {
            match Systemd::new(app.runner, app.settings).active_state().as_str() {
                "active" => "Installed - running".to_string(),
                "inactive" => "Installed - stopped".to_string(),
                other => format!("Installed - {}", other),
            }
        }
        status => status.to_string(),
    }
}

/// The install-related entries for the current status.
#[must_use]
pub fn options(status: InstallStatus) -> &'static [&'static str] {
    match status {
        InstallStatus::NotInstalled => &["1. Install Hysteria 2"],
        InstallStatus::BinaryOnly => &["1. Continue configuration", "2. Reinstall"],
        InstallStatus::Installed => &["1. Reconfigure", "2. Uninstall"],
    }
}

fn print_menu(app: &App<'_>) {
    term::clear_screen();
    term::rule('=');
    term::green("Hysteria 2 installer");
    term::rule('=');
    term::yellow(format!("Status: {}", status_text(app)));
    term::rule('=');

    for line in options(InstallStatus::detect(app.settings)) {
        println!("{}", line);
    }
    term::rule('-');
    println!("3. Start service");
    println!("4. Stop service");
    println!("5. Restart service");
    println!("6. Service status");
    println!("7. Service logs");
    term::rule('-');
    println!("8. Change config");
    println!("9. Show config");
    term::rule('-');
    println!("0. Quit");
}

/// One menu action. Returns false when the operator quits.
fn dispatch(app: &mut App<'_>, choice: &str) -> Result<bool> {
    // Re-read after the prompt: the previous action may have changed it.
    let status = InstallStatus::detect(app.settings);
    debug!(choice = ?choice, status = ?status, "menu_choice");

    match choice {
        "1" => match status {
            InstallStatus::NotInstalled => installer::install(app)?,
            InstallStatus::BinaryOnly => installer::configure(app)?,
            InstallStatus::Installed => installer::reconfigure(app)?,
        },
        "2" => match status {
            InstallStatus::NotInstalled => term::red("Not installed, nothing to remove"),
            InstallStatus::BinaryOnly => installer::reinstall(app)?,
            InstallStatus::Installed => installer::uninstall(app)?,
        },
        "3" => {
            Systemd::new(app.runner, app.settings).start().report("Started");
        }
        "4" => {
            Systemd::new(app.runner, app.settings).stop().report("Stopped");
        }
        "5" => {
            Systemd::new(app.runner, app.settings).restart().report("Restarted");
        }
        "6" => Systemd::new(app.runner, app.settings).show_status(),
        "7" => Systemd::new(app.runner, app.settings).show_logs(),
        "8" | "9" if status != InstallStatus::Installed => {
            term::red("Install and configure Hysteria 2 first");
        }
        "8" => installer::change_config(app)?,
        "9" => client::show_config(app.settings, app.runner)?,
        "0" | "q" | "Q" => {
            println!("\nBye!");
            return Ok(false);
        }
        _ => term::red("Invalid choice"),
    }
    Ok(true)
}

/// The interactive loop; runs until the operator quits or input ends.
pub fn run(app: &mut App<'_>) -> Result<()> {
    loop {
        print_menu(app);
        let choice = app.prompt.ask("\nChoose [0-9]: ")?;
        if !dispatch(app, &choice)? {
            return Ok(());
        }
        term::pause(app.prompt)?;
    }
}
