//! The configuration wizard: port, hop range, users and masquerade site.

use std::collections::BTreeSet;

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{debug, info};

use crate::config::DEFAULT_PROXY_SITE;
use crate::error::Result;
use crate::server_config::{HopRange, UserCredential};
use crate::shell::{self, Cmd, Runner};
use crate::term::{self, Prompt};

pub const PASSWORD_LEN: usize = 8;
const RANDOM_PORT_MIN: u16 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardAnswers {
    pub port: u16,
    pub hop_ports: Option<HopRange>,
    /// Primary user first.
    pub users: Vec<UserCredential>,
    pub masquerade_site: String,
}

/// A digit string within 1..=65535.
#[must_use]
pub fn parse_port(value: &str) -> Option<u16> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<u32>().ok().filter(|p| (1..=65535).contains(p)).map(|p| p as u16)
}

#[must_use]
/// Alphanumeric password from the OS random source.
#[must_use]
pub fn generate_password(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[must_use]
pub fn random_default_port() -> u16 {
    rand::thread_rng().gen_range(RANDOM_PORT_MIN..=65535)
}

/// Local UDP ports from `ss -uln` output: the port after the last ':' of the
/// first address column on each line.
#[must_use]
pub fn udp_ports_in_use(ss_output: &str) -> BTreeSet<u16> {
    ss_output
        .lines()
        .filter_map(|line| line.split_whitespace().find(|token| token.contains(':')))
        .filter_map(|addr| addr.rsplit(':').next())
        .filter_map(|port| port.parse::<u16>().ok())
        .collect()
}

/// An unreadable socket table counts as free.
pub fn is_port_available(runner: &dyn Runner, port: u16) -> bool {
    let listing = shell::probe(runner, &Cmd::new("ss", &["-uln"]));
    let busy = udp_ports_in_use(&listing).contains(&port);
    debug!(port = port, busy = busy, "udp_port_checked");
    !busy
}

/// Asks until the answer is a valid port that nothing listens on. Blank takes
/// a fresh random default on every round.
pub fn ask_free_port(prompt: &mut dyn Prompt, runner: &dyn Runner, question: &str) -> Result<u16> {
    loop {
        let default = random_default_port().to_string();
        let port = term::ask_parsed(
            prompt,
            question,
            Some(&default),
            parse_port,
            "Port range: 1-65535",
        )?;
        if is_port_available(runner, port) {
            return Ok(port);
        }
        term::red(format!("Port {} is already in use", port));
    }
}

fn ask_hop_range(prompt: &mut dyn Prompt) -> Result<HopRange> {
    let start = term::ask_parsed(
        prompt,
        "Hop start port [10000-65535]: ",
        None,
        HopRange::parse_bound,
        "Port range: 10000-65535",
    )?;
    let end_error = format!("Port range: 10000-65535, above the start port ({})", start);
    term::ask_parsed(
        prompt,
        "Hop end port [10000-65535]: ",
        None,
        |v| HopRange::parse_bound(v).and_then(|end| HopRange::new(start, end)),
        &end_error,
    )
}

pub fn collect(prompt: &mut dyn Prompt, runner: &dyn Runner) -> Result<WizardAnswers> {
    println!();
    term::rule('=');
    term::yellow("Configuration");
    term::rule('=');

    let port = ask_free_port(prompt, runner, "\nPort [1-65535] (Enter for random): ")?;
    term::yellow(format!("Port: {}", port));

    let mut hop_ports = None;
    if term::confirm(prompt, "\nEnable port hopping? [y/N]: ", false)? {
        let range = ask_hop_range(prompt)?;
        term::yellow(format!("Hop range: {}", range));
        hop_ports = Some(range);
    }

    let mut password = prompt.ask("\nPassword (Enter for random): ")?;
    if password.is_empty() {
        password = generate_password(PASSWORD_LEN);
        term::yellow(format!("Random password: {}", password));
    }

    let masquerade_site =
        term::ask_default(prompt, "\nMasquerade site (Enter for default): ", DEFAULT_PROXY_SITE)?;

    let mut users = vec![UserCredential::new(password)];
    if term::confirm(prompt, "\nAdd more users? [y/N]: ", false)? {
        loop {
            let extra = prompt.ask("User password (Enter to finish): ")?;
            if extra.is_empty() {
                break;
            }
            users.push(UserCredential::new(extra));
            term::green(format!("User added, {} users total", users.len()));
        }
    }

    info!(
        port = port,
        hop_ports = ?hop_ports.map(|r| r.to_string()),
        users = users.len(),
        masquerade_site = ?masquerade_site,
        "wizard_answers_collected"
    );
    Ok(WizardAnswers {
        port,
        hop_ports,
        users,
        masquerade_site,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRunner, ScriptedPrompt};

    const SS_SAMPLE: &str = "\
State  Recv-Q Send-Q      Local Address:Port   Peer Address:Port Process
UNCONN 0      0           127.0.0.53%lo:53          0.0.0.0:*
UNCONN 0      0                 0.0.0.0:8443        0.0.0.0:*
UNCONN 0      0                    [::]:443            [::]:*
UNCONN 0      0                       *:5353              *:*
";

    #[test]
    fn port_validation_accepts_only_plain_digits_in_range() {
        assert_eq!(parse_port("1"), Some(1));
        assert_eq!(parse_port("65535"), Some(65535));
        assert_eq!(parse_port("0"), None);
        assert_eq!(parse_port("65536"), None);
        assert_eq!(parse_port("-1"), None);
        assert_eq!(parse_port("44a"), None);
        assert_eq!(parse_port(""), None);
    }

    #[test]
    fn generated_password_is_alphanumeric() {
        let pw = generate_password(PASSWORD_LEN);
        assert_eq!(pw.len(), 8);
        assert!(pw.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_password(32), generate_password(32));
    }

    #[test]
    fn random_default_port_stays_in_range() {
        for _ in 0..200 {
            assert!(random_default_port() >= RANDOM_PORT_MIN);
        }
    }

    #[test]
    fn ss_parsing_covers_ipv4_ipv6_and_wildcards() {
        let ports = udp_ports_in_use(SS_SAMPLE);
        assert_eq!(ports.into_iter().collect::<Vec<_>>(), vec![53, 443, 5353, 8443]);
    }

    #[test]
    fn missing_ss_treats_port_as_free() {
        let runner = FakeRunner::new().missing("ss");
        assert!(is_port_available(&runner, 443));
    }

    #[test]
    fn blank_answers_produce_single_random_user() {
        let runner = FakeRunner::new().respond("ss -uln", 0, "");
        let mut prompt = ScriptedPrompt::new(&["", "", "", "", ""]);
        let answers = collect(&mut prompt, &runner).unwrap();

        assert!(answers.port >= RANDOM_PORT_MIN);
        assert_eq!(answers.hop_ports, None);
        assert_eq!(answers.users.len(), 1);
        assert_eq!(answers.users[0].password.len(), PASSWORD_LEN);
        assert_eq!(answers.masquerade_site, "maimai.sega.jp");
        assert!(prompt.is_exhausted());
    }

    #[test]
    fn hop_end_must_parse_and_exceed_start() {
        let mut prompt = ScriptedPrompt::new(&["9999", "20000", "abc", "20000", "15000", "20001"]);
        let range = ask_hop_range(&mut prompt).unwrap();
        assert_eq!(range, HopRange { start: 20000, end: 20001 });
        assert!(prompt.is_exhausted());
    }

    #[test]
    fn occupied_port_is_asked_again() {
        let runner = FakeRunner::new().respond("ss -uln", 0, SS_SAMPLE);
        let mut prompt = ScriptedPrompt::new(&[
            "8443", "9000", "y", "20000", "15000", "30000", "pw1", "", "y", "pw2", "pw3", "",
        ]);
        let answers = collect(&mut prompt, &runner).unwrap();

        assert_eq!(answers.port, 9000);
        assert_eq!(answers.hop_ports, HopRange::new(20000, 30000));
        let passwords: Vec<&str> = answers.users.iter().map(|u| u.password.as_str()).collect();
        assert_eq!(passwords, vec!["pw1", "pw2", "pw3"]);
        assert_eq!(runner.count("ss -uln"), 2);
        assert!(prompt.is_exhausted());
    }
}
