//! systemd registration and control of the daemon.

use std::fs;

use tracing::info;

use crate::config::{self, Settings};
use crate::error::Result;
use crate::shell::{self, Cmd, Runner};
use crate::term;

const STARTUP_WAIT_SECS: u64 = 3;

#[must_use]
pub fn render_unit(settings: &Settings) -> String {
    format!(
        "[Unit]\n\
         Description=Hysteria 2 Service\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={} server -c {}\n\
         Restart=always\n\
         RestartSec=3\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        settings.binary_path.display(),
        settings.config_file().display()
    )
}

/// Result of a start, stop or restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceOutcome {
    Done,
    /// Unit file or binary missing; the operator has been told which.
    NotInstalled,
    /// The first `systemctl` invocation that did not succeed.
    Failed(String),
}

impl ServiceOutcome {
    /// Prints `done` on success or what failed. Returns whether it succeeded.
    pub fn report(&self, done: &str) -> bool {
        match self {
            Self::Done => {
                term::green(done);
                true
            }
            Self::NotInstalled => false,
            Self::Failed(command) => {
                term::red(format!("`{}` failed; check the service logs", command));
                false
            }
        }
    }
}

/// The daemon's systemd unit.
pub struct Systemd<'a> {
    runner: &'a dyn Runner,
    settings: &'a Settings,
}

impl<'a> Systemd<'a> {
    pub fn new(runner: &'a dyn Runner, settings: &'a Settings) -> Self {
        Self { runner, settings }
    }

    fn systemctl(&self, action: &str) -> Cmd {
        Cmd::new("systemctl", &[action, self.settings.service_name.as_str()])
    }

    /// Writes the unit file and reloads systemd.
    pub fn register(&self) -> Result<()> {
        if let Some(parent) = self.settings.service_file.parent() {
            config::ensure_dir(parent)?;
        }
        fs::write(&self.settings.service_file, render_unit(self.settings))?;
        term::yellow("  - unit file written");
        self.daemon_reload();
        term::yellow("  - systemd reloaded");
        info!(path = ?self.settings.service_file.display().to_string(), "unit_registered");
        Ok(())
    }

    pub fn daemon_reload(&self) {
        shell::best_effort(self.runner, &Cmd::new("systemctl", &["daemon-reload"]));
    }

    fn has_unit(&self) -> bool {
        if self.settings.service_file.exists() {
            return true;
        }
        term::red("Service file not found; install Hysteria 2 first");
        false
    }

    fn is_registered(&self) -> bool {
        if !self.has_unit() {
            return false;
        }
        if self.settings.binary_path.exists() {
            return true;
        }
        term::red("Hysteria 2 is not installed");
        false
    }

    /// Runs every action even after a failure, then reports the first one.
    fn control(&self, actions: &[&str]) -> ServiceOutcome {
        if !self.is_registered() {
            return ServiceOutcome::NotInstalled;
        }
        let mut failed = None;
        for action in actions {
            let cmd = self.systemctl(action);
            if !shell::best_effort(self.runner, &cmd) && failed.is_none() {
                failed = Some(cmd.to_string());
            }
        }
        let outcome = failed.map_or(ServiceOutcome::Done, ServiceOutcome::Failed);
        info!(actions = ?actions, outcome = ?outcome, "service_control");
        outcome
    }

    /// Start now and on boot.
    pub fn start(&self) -> ServiceOutcome {
        self.control(&["start", "enable"])
    }

    pub fn stop(&self) -> ServiceOutcome {
        self.control(&["stop"])
    }

    pub fn restart(&self) -> ServiceOutcome {
        self.control(&["restart"])
    }

    /// Enable and restart without failing the caller; `wait_for_active`
    /// reports the outcome.
    pub fn enable_and_restart(&self) {
        shell::best_effort(self.runner, &self.systemctl("enable"));
        shell::best_effort(self.runner, &self.systemctl("restart"));
    }

    /// Stop and disable, ignoring failures.
    pub fn deactivate(&self) {
        shell::best_effort(self.runner, &self.systemctl("stop"));
        shell::best_effort(self.runner, &self.systemctl("disable"));
    }

    /// `systemctl is-active` output, `unknown` when empty.
    pub fn active_state(&self) -> String {
        let state = shell::probe(self.runner, &self.systemctl("is-active"));
        if state.is_empty() {
            "unknown".to_string()
        } else {
            state
        }
    }

    /// Visible countdown, then one is-active check.
    pub fn wait_for_active(&self) -> bool {
        term::yellow("Waiting for the service to start...");
        term::countdown("Waiting for the service", STARTUP_WAIT_SECS);
        self.active_state() == "active"
    }

    pub fn show_status(&self) {
        if !self.is_registered() {
            return;
        }
        shell::best_effort(self.runner, &self.systemctl("status").interactive());
    }

    /// Follows the journal until interrupted; Ctrl-C returns to the caller.
    pub fn show_logs(&self) {
        if !self.has_unit() {
            return;
        }
        let cmd = Cmd::new(
            "journalctl",
            &["-u", self.settings.service_name.as_str(), "-f", "--lines", "50"],
        )
        .interactive();
        shell::best_effort(self.runner, &cmd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::OutputMode;
    use crate::testing::FakeRunner;

    fn registered(settings: &Settings) {
        for path in [&settings.service_file, &settings.binary_path] {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x").unwrap();
        }
    }

    #[test]
    fn unit_points_at_binary_and_config() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let unit = render_unit(&settings);
        let exec = format!(
            "ExecStart={} server -c {}\n",
            settings.binary_path.display(),
            settings.config_file().display()
        );
        assert!(unit.starts_with("[Unit]\nDescription=Hysteria 2 Service\nAfter=network.target\n\n[Service]\n"));
        assert!(unit.contains(&exec));
        assert!(unit.contains("Restart=always\nRestartSec=3\n"));
        assert!(unit.ends_with("[Install]\nWantedBy=multi-user.target\n"));
    }

    #[test]
    fn register_writes_unit_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let runner = FakeRunner::new();
        Systemd::new(&runner, &settings).register().unwrap();

        assert!(settings.service_file.is_file());
        assert_eq!(runner.command_lines(), vec!["systemctl daemon-reload"]);
    }

    #[test]
    fn start_also_enables() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        registered(&settings);
        let runner = FakeRunner::new();
        assert_eq!(Systemd::new(&runner, &settings).start(), ServiceOutcome::Done);
        assert_eq!(
            runner.command_lines(),
            vec!["systemctl start hysteria-server", "systemctl enable hysteria-server"]
        );
    }

    #[test]
    fn failed_start_still_enables_and_reports_start() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        registered(&settings);
        let runner = FakeRunner::new().respond_full("systemctl start", 5, "", "Unit not loaded.");
        let outcome = Systemd::new(&runner, &settings).start();
        assert_eq!(
            outcome,
            ServiceOutcome::Failed("systemctl start hysteria-server".to_string())
        );
        assert!(!outcome.report("Started"));
        assert!(runner.ran("systemctl enable hysteria-server"));
    }

    #[test]
    fn missing_unit_or_binary_skips_systemctl() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let runner = FakeRunner::new();
        let systemd = Systemd::new(&runner, &settings);
        assert_eq!(systemd.start(), ServiceOutcome::NotInstalled);
        assert_eq!(systemd.stop(), ServiceOutcome::NotInstalled);
        systemd.show_status();
        systemd.show_logs();
        assert!(runner.calls().is_empty());

        fs::create_dir_all(settings.service_file.parent().unwrap()).unwrap();
        fs::write(&settings.service_file, "x").unwrap();
        assert_eq!(systemd.restart(), ServiceOutcome::NotInstalled);
        systemd.show_status();
        assert!(runner.calls().is_empty());
        systemd.show_logs();
        assert_eq!(runner.command_lines(), vec!["journalctl -u hysteria-server -f --lines 50"]);
    }

    #[test]
    fn wait_for_active_checks_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let runner = FakeRunner::new().respond("systemctl is-active", 0, "active");
        assert!(Systemd::new(&runner, &settings).wait_for_active());
        assert_eq!(runner.count("systemctl is-active"), 1);

        let failed = FakeRunner::new().respond("systemctl is-active", 3, "failed");
        assert!(!Systemd::new(&failed, &settings).wait_for_active());
    }

    #[test]
    fn logs_and_status_share_the_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        registered(&settings);
        let runner = FakeRunner::new();
        let systemd = Systemd::new(&runner, &settings);
        systemd.show_logs();
        systemd.show_status();

        let calls = runner.calls();
        assert_eq!(calls[0].to_string(), "journalctl -u hysteria-server -f --lines 50");
        assert!(calls.iter().all(|c| c.mode == OutputMode::Inherit && c.timeout.is_none()));
    }

    #[test]
    fn empty_state_reads_as_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::rooted_at(dir.path());
        let runner = FakeRunner::new().missing("systemctl");
        assert_eq!(Systemd::new(&runner, &settings).active_state(), "unknown");
    }
}
