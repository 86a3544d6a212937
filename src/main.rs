use clap::Parser;
use tracing::{debug, error};

use hy2::app::App;
use hy2::cli::{Cli, Command};
use hy2::client;
use hy2::config::Settings;
use hy2::error::AppError;
use hy2::installer;
use hy2::logging;
use hy2::menu;
use hy2::net::HttpNet;
use hy2::service::Systemd;
use hy2::shell::SystemRunner;
use hy2::signals;
use hy2::system::EffectiveUser;
use hy2::term::{self, StdinPrompt};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("failed to open log file: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = signals::install_interrupt_handler() {
        error!(error = %e, "signal_handler_install_failed");
    }

    let settings = Settings::resolve(cli.overrides());
    debug!(settings = ?settings, "settings_resolved");

    let command = cli.command.unwrap_or(Command::Menu);
    let code = match run(command, &settings) {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<AppError>() {
            Some(err) if err.is_cancellation() => {
                println!("\n\nCancelled");
                0
            }
            _ => {
                error!(error = %e, "command_failed");
                term::red(format!("Error: {:#}", e));
                1
            }
        },
    };
    logging::shutdown();
    std::process::exit(code);
}

fn init_logging(verbose: bool, log_file: Option<&str>) -> anyhow::Result<()> {
    match log_file {
        Some(path) => logging::init_file(path, verbose),
        None => {
            logging::init_terminal(verbose);
            Ok(())
        }
    }
}

fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    let runner = SystemRunner;
    let net = HttpNet;
    let privilege = EffectiveUser;
    let mut prompt = StdinPrompt;
    let mut app = App {
        settings,
        runner: &runner,
        net: &net,
        privilege: &privilege,
        prompt: &mut prompt,
    };
    let systemd = Systemd::new(&runner, settings);

    match command {
        Command::Menu => menu::run(&mut app)?,
        Command::Install => installer::install(&mut app)?,
        Command::Configure => installer::configure(&mut app)?,
        Command::Uninstall => installer::uninstall(&mut app)?,
        Command::Start => {
            if !systemd.start().report("Started") {
                return Err(AppError::ServiceAction("start").into());
            }
        }
        Command::Stop => {
            if !systemd.stop().report("Stopped") {
                return Err(AppError::ServiceAction("stop").into());
            }
        }
        Command::Restart => {
            if !systemd.restart().report("Restarted") {
                return Err(AppError::ServiceAction("restart").into());
            }
        }
        Command::Status => systemd.show_status(),
        Command::Logs => systemd.show_logs(),
        Command::ChangeConfig => installer::change_config(&mut app)?,
        Command::ShowConfig => client::show_config(settings, &runner)?,
    }
    Ok(())
}
