use std::fmt;

use tracing::info;

use crate::server_config::HopRange;
use crate::shell::{self, Cmd, Runner};
use crate::term;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirewallBackend {
    Ufw,
    Firewalld,
    None,
}

impl FirewallBackend {
    /// ufw wins when both tools are installed.
    pub fn detect(runner: &dyn Runner) -> Self {
        if shell::tool_exists(runner, "ufw") {
            Self::Ufw
        } else if shell::tool_exists(runner, "firewall-cmd") {
            Self::Firewalld
        } else {
            Self::None
        }
    }
}

impl fmt::Display for FirewallBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ufw => write!(f, "ufw"),
            Self::Firewalld => write!(f, "firewalld"),
            Self::None => write!(f, "none"),
        }
    }
}

fn udp_rules(port: u16, hop_ports: Option<HopRange>) -> Vec<String> {
    let mut rules = vec![format!("{}/udp", port)];
    if let Some(range) = hop_ports {
        rules.push(format!("{}/udp", range));
    }
    rules
}

/// Opens the UDP port (and hop range) on whichever firewall is present.
/// Every command is best effort.
pub fn open_ports(runner: &dyn Runner, port: u16, hop_ports: Option<HopRange>) -> FirewallBackend {
    term::yellow("Configuring firewall...");
    let backend = FirewallBackend::detect(runner);
    let rules = udp_rules(port, hop_ports);

    match backend {
        FirewallBackend::Ufw => {
            term::yellow("ufw detected, adding rules...");
            for rule in &rules {
                shell::best_effort(runner, &Cmd::new("ufw", &["allow", rule.as_str()]));
                term::green(format!("Opened {}", rule));
            }
        }
        FirewallBackend::Firewalld => {
            term::yellow("firewalld detected, adding rules...");
            for rule in &rules {
                let arg = format!("--add-port={}", rule);
                shell::best_effort(runner, &Cmd::new("firewall-cmd", &["--permanent", arg.as_str()]));
                term::green(format!("Opened {}", rule));
            }
            shell::best_effort(runner, &Cmd::new("firewall-cmd", &["--reload"]));
        }
        FirewallBackend::None => {
            term::yellow("Neither ufw nor firewalld found");
            for rule in &rules {
                term::red(format!("Open {} manually", rule));
            }
        }
    }
    info!(backend = %backend, rules = ?rules, "firewall_configured");
    backend
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;

    #[test]
    fn ufw_preferred_when_both_present() {
        let runner = FakeRunner::new()
            .respond("which ufw", 0, "/usr/sbin/ufw")
            .respond("which firewall-cmd", 0, "/usr/bin/firewall-cmd");
        let backend = open_ports(&runner, 8443, HopRange::new(20000, 30000));

        assert_eq!(backend, FirewallBackend::Ufw);
        assert!(runner.ran("ufw allow 8443/udp"));
        assert!(runner.ran("ufw allow 20000:30000/udp"));
        assert!(!runner.ran("firewall-cmd"));
        assert!(!runner.ran("ufw reload"));
    }

    #[test]
    fn firewalld_adds_permanent_rules_then_reloads() {
        let runner = FakeRunner::new().respond("which firewall-cmd", 0, "/usr/bin/firewall-cmd");
        let backend = open_ports(&runner, 8443, None);

        assert_eq!(backend, FirewallBackend::Firewalld);
        let firewall: Vec<String> = runner
            .command_lines()
            .into_iter()
            .filter(|c| c.starts_with("firewall-cmd"))
            .collect();
        assert_eq!(
            firewall,
            vec!["firewall-cmd --permanent --add-port=8443/udp", "firewall-cmd --reload"]
        );
    }

    #[test]
    fn no_firewall_runs_nothing_but_detection() {
        let runner = FakeRunner::new();
        assert_eq!(open_ports(&runner, 8443, None), FirewallBackend::None);
        assert!(runner.command_lines().iter().all(|c| c.starts_with("which ")));
    }
}
