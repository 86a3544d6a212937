//! Terminal output and operator input.

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colored::Colorize;

use crate::error::{AppError, Result};
use crate::signals;

pub fn red(msg: impl Display) {
    println!("{}", msg.to_string().red());
}

pub fn green(msg: impl Display) {
    println!("{}", msg.to_string().green());
}

pub fn yellow(msg: impl Display) {
    println!("{}", msg.to_string().yellow());
}

pub fn blue(msg: impl Display) {
    println!("{}", msg.to_string().blue());
}

pub fn rule(ch: char) {
    println!("{}", ch.to_string().repeat(60));
}

pub fn clear_screen() {
    // ANSI clear + home; harmless on terminals that ignore it.
    print!("\x1b[2J\x1b[H");
    let _ = io::stdout().flush();
}

pub fn print_header() {
    println!();
    rule('=');
    green("Hysteria 2 installer");
    rule('=');
}

pub fn print_step(num: u32, total: u32, title: &str) {
    println!();
    rule('-');
    blue(format!("Step {}/{}: {}", num, total, title));
    rule('-');
}

/// Source of operator answers. Answers come back trimmed.
pub trait Prompt {
    fn ask(&mut self, prompt: &str) -> Result<String>;
}

/// Reads answers from stdin. End of input is reported as [`AppError::InputClosed`],
/// Ctrl-C as [`AppError::Interrupted`].
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{}", prompt)?;
        stdout.flush()?;

        read_answer(&mut io::stdin().lock(), &signals::interrupted)
    }
}

/// One line from `input`. A read cut short by a signal is retried unless
/// `interrupted` says the operator pressed Ctrl-C.
fn read_answer<R: BufRead>(input: &mut R, interrupted: &dyn Fn() -> bool) -> Result<String> {
    let mut line = Vec::new();
    loop {
        if interrupted() {
            return Err(AppError::Interrupted);
        }
        let available = match input.fill_buf() {
            Ok(buf) => buf,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if available.is_empty() {
            if line.is_empty() {
                return Err(AppError::InputClosed);
            }
            break;
        }
        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };
        line.extend_from_slice(&available[..used]);
        input.consume(used);
        if done {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&line).trim().to_string())
}

/// Blank answer yields `default`.
pub fn ask_default(prompt: &mut dyn Prompt, question: &str, default: &str) -> Result<String> {
    let answer = prompt.ask(question)?;
    if answer.is_empty() {
        Ok(default.to_string())
    } else {
        Ok(answer)
    }
}

/// Re-asks until `parse` accepts the answer and returns the parsed value. A
/// blank answer stands for `default` when one is given.
pub fn ask_parsed<T, F>(
    prompt: &mut dyn Prompt,
    question: &str,
    default: Option<&str>,
    parse: F,
    error_msg: &str,
) -> Result<T>
where
    F: Fn(&str) -> Option<T>,
{
    loop {
        let answer = prompt.ask(question)?;
        let answer = match default {
            Some(default) if answer.is_empty() => default.to_string(),
            _ => answer,
        };
        if let Some(value) = parse(&answer) {
            return Ok(value);
        }
        red(error_msg);
    }
}

/// `[y/N]` (or `[Y/n]` when `default_yes`) question.
pub fn confirm(prompt: &mut dyn Prompt, question: &str, default_yes: bool) -> Result<bool> {
    let answer = prompt.ask(question)?.to_ascii_lowercase();
    Ok(if default_yes {
        answer != "n"
    } else {
        answer == "y"
    })
}

pub fn pause(prompt: &mut dyn Prompt) -> Result<()> {
    prompt.ask("\nPress Enter to return...")?;
    Ok(())
}

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Cosmetic progress indicator on stderr. Stops when finished or dropped.
pub struct Spinner {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let message = message.to_string();
        let handle = thread::Builder::new()
            .name("hy2-spinner".to_string())
            .spawn(move || {
                let mut stderr = io::stderr();
                let mut frame = 0usize;
                while !flag.load(Ordering::Relaxed) {
                    let _ = write!(
                        stderr,
                        "\r{} {}",
                        SPINNER_FRAMES[frame % SPINNER_FRAMES.len()].yellow(),
                        message
                    );
                    let _ = stderr.flush();
                    frame += 1;
                    thread::sleep(Duration::from_millis(100));
                }
                let _ = write!(stderr, "\r{}\r", " ".repeat(message.chars().count() + 2));
                let _ = stderr.flush();
            })
            .ok();
        Self { stop, handle }
    }

    pub fn finish(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Overwrites one line with a per-second countdown.
pub fn countdown(message: &str, secs: u64) {
    let mut stdout = io::stdout();
    for remaining in (1..=secs).rev() {
        let _ = write!(
            stdout,
            "\r{}",
            format!("{}... {}s", message, remaining).yellow()
        );
        let _ = stdout.flush();
        thread::sleep(Duration::from_secs(1));
    }
    println!();
}
