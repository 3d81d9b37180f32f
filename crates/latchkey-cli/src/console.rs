//! Operator console on stdin.
//!
//! Drives the mock devices and queries the runtime while no real hardware is
//! attached. One command per line:
//!
//! ```text
//! tag 04a1b2c3        present a tag to the reader
//! press unlock|lock   press and release a button
//! fault <message>     make the next reader poll fail
//! status              print a status snapshot as JSON
//! recent [n]          print the last n access events
//! refresh             request a badge list refresh
//! help
//! ```

use std::time::Duration;

use latchkey_controller::{EventFeed, RefreshTrigger, StatusReporter};
use latchkey_hardware::Button;
use latchkey_hardware::mock::{MockButtonPanelHandle, MockTagReaderHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Long enough for one button poll plus the confirmation read.
const PRESS_HOLD: Duration = Duration::from_millis(300);

const HELP: &str = "commands: tag <hex uid> | press unlock|lock | fault <message> | status | recent [n] | refresh | help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Tag(Vec<u8>),
    Press(Button),
    Fault(String),
    Status,
    Recent(usize),
    Refresh,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err("empty command".to_string());
        };
        let rest: Vec<&str> = words.collect();

        match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
            ("tag", [uid]) => parse_hex(uid).map(Command::Tag),
            ("press", ["unlock"]) => Ok(Command::Press(Button::Unlock)),
            ("press", ["lock"]) => Ok(Command::Press(Button::Lock)),
            ("fault", words) if !words.is_empty() => Ok(Command::Fault(words.join(" "))),
            ("status", []) => Ok(Command::Status),
            ("recent", []) => Ok(Command::Recent(10)),
            ("recent", [n]) => n
                .parse()
                .map(Command::Recent)
                .map_err(|_| format!("not a count: {n}")),
            ("refresh", []) => Ok(Command::Refresh),
            ("help", _) => Ok(Command::Help),
            _ => Err(format!("unknown command: {line}")),
        }
    }
}

fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    if text.is_empty() || text.len() % 2 != 0 || !text.is_ascii() {
        return Err(format!("not a hex UID: {text}"));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16))
        .collect::<Result<_, _>>()
        .map_err(|_| format!("not a hex UID: {text}"))
}

/// Handles the console acts on.
#[derive(Debug)]
pub struct Console {
    pub reader: MockTagReaderHandle,
    pub buttons: MockButtonPanelHandle,
    pub status: StatusReporter,
    pub feed: EventFeed,
    pub refresh: RefreshTrigger,
}

impl Console {
    /// Read commands until stdin closes or `stop` is cancelled.
    pub async fn run(self, stop: CancellationToken) {
        let mut lines = spawn_stdin_reader();
        println!("{HELP}");
        loop {
            let line = tokio::select! {
                _ = stop.cancelled() => break,
                line = lines.recv() => line,
            };
            match line {
                Some(Ok(line)) if line.trim().is_empty() => {}
                Some(Ok(line)) => match Command::parse(&line) {
                    Ok(command) => self.execute(command).await,
                    Err(e) => println!("{e}"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Console read failed");
                    break;
                }
                None => {
                    debug!("Console input closed");
                    break;
                }
            }
        }
    }

    async fn execute(&self, command: Command) {
        match command {
            Command::Tag(uid) => {
                if self.reader.present_tag(uid).await.is_err() {
                    println!("reader is gone");
                }
            }
            Command::Press(button) => {
                info!(%button, "Console button press");
                self.buttons.press(button);
                tokio::time::sleep(PRESS_HOLD).await;
                self.buttons.release(button);
            }
            Command::Fault(message) => {
                if self.reader.inject_fault(message).await.is_err() {
                    println!("reader is gone");
                }
            }
            Command::Status => print_json(&self.status.snapshot()),
            Command::Recent(limit) => print_json(&self.feed.recent(limit)),
            Command::Refresh => match self.refresh.request() {
                Ok(()) => println!("refresh requested"),
                Err(e) => println!("{e}"),
            },
            Command::Help => println!("{HELP}"),
        }
    }
}

/// Stdin reads cannot be cancelled, so they run on a detached thread that
/// never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Could not render JSON"),
    }
}
