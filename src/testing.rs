//! Scripted stand-ins for the runner, the network and the operator.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use crate::error::{AppError, Result};
use crate::net::{IpFamily, Net};
use crate::shell::{Cmd, CmdOutput, Runner};
use crate::system::Privilege;
use crate::term::Prompt;

enum Reply {
    Output(CmdOutput),
    Missing,
    Timeout,
}

struct Rule {
    prefix: String,
    reply: Reply,
    effect: Option<Box<dyn Fn(&Cmd)>>,
}

/// Matches commands by the prefix of their rendered command line; the first
/// matching rule wins. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct FakeRunner {
    rules: Vec<Rule>,
    calls: RefCell<Vec<Cmd>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, prefix: &str, reply: Reply) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            reply,
            effect: None,
        });
        self
    }

    pub fn respond(self, prefix: &str, code: i32, stdout: &str) -> Self {
        self.respond_full(prefix, code, stdout, "")
    }

    pub fn respond_full(self, prefix: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        let output = CmdOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        };
        self.push(prefix, Reply::Output(output))
    }

    pub fn missing(self, prefix: &str) -> Self {
        self.push(prefix, Reply::Missing)
    }

    pub fn time_out(self, prefix: &str) -> Self {
        self.push(prefix, Reply::Timeout)
    }

    /// Run `effect` whenever a command with this prefix executes successfully.
    pub fn on<F: Fn(&Cmd) + 'static>(mut self, prefix: &str, effect: F) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            reply: Reply::Output(CmdOutput {
                code: Some(0),
                ..CmdOutput::default()
            }),
            effect: Some(Box::new(effect)),
        });
        self
    }

    pub fn calls(&self) -> Vec<Cmd> {
        self.calls.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn ran(&self, prefix: &str) -> bool {
        self.command_lines().iter().any(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl Runner for FakeRunner {
    fn run(&self, cmd: &Cmd) -> Result<CmdOutput> {
        self.calls.borrow_mut().push(cmd.clone());
        let line = cmd.to_string();
        for rule in &self.rules {
            if !line.starts_with(&rule.prefix) {
                continue;
            }
            return match &rule.reply {
                Reply::Missing => Err(AppError::Spawn {
                    command: line,
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                }),
                Reply::Timeout => Ok(CmdOutput {
                    timed_out: true,
                    ..CmdOutput::default()
                }),
                Reply::Output(output) => {
                    if let Some(effect) = &rule.effect {
                        effect(cmd);
                    }
                    Ok(output.clone())
                }
            };
        }
        Ok(CmdOutput {
            code: Some(0),
            ..CmdOutput::default()
        })
    }
}

/// Replays canned answers; running out reads as closed input.
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            asked: Vec::new(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .map(|a| a.trim().to_string())
            .ok_or(AppError::InputClosed)
    }
}

#[derive(Default)]
pub struct FakeNet {
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub domains: HashMap<String, String>,
    pub pages: HashMap<String, String>,
    pub lookups: RefCell<Vec<String>>,
}

impl FakeNet {
    pub fn with_ipv4(ip: &str) -> Self {
        Self {
            ipv4: Some(ip.to_string()),
            ..Self::default()
        }
    }

    pub fn domain(mut self, domain: &str, ip: &str) -> Self {
        self.domains.insert(domain.to_string(), ip.to_string());
        self
    }

    pub fn page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

impl Net for FakeNet {
    fn public_ip(&self, family: IpFamily) -> Option<String> {
        match family {
            IpFamily::V4 => self.ipv4.clone(),
            IpFamily::V6 => self.ipv6.clone(),
        }
    }

    fn resolve_domain(&self, domain: &str) -> Option<String> {
        self.lookups.borrow_mut().push(domain.to_string());
        self.domains.get(domain).cloned()
    }

    fn fetch_text(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Download(format!("no page scripted for {}", url)))
    }
}

/// Passes every root check.
pub struct AsRoot;

impl Privilege for AsRoot {
    fn is_root(&self) -> bool {
        true
    }
}

/// Fails every root check.
pub struct AsUser;

impl Privilege for AsUser {
    fn is_root(&self) -> bool {
        false
    }
}

/// Effect for `openssl ...`: create the file named after `-out`.
pub fn write_out_arg(cmd: &Cmd) {
    write_after_flag(cmd, "-out");
}

/// Effect for `acme.sh --install-cert`: create both target files.
pub fn write_installed_cert(cmd: &Cmd) {
    write_after_flag(cmd, "--fullchain-file");
    write_after_flag(cmd, "--key-file");
}

fn write_after_flag(cmd: &Cmd, flag: &str) {
    if let Some(pos) = cmd.args.iter().position(|a| a == flag) {
        if let Some(path) = cmd.args.get(pos + 1) {
            let path = std::path::Path::new(path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, flag).unwrap();
        }
    }
}
