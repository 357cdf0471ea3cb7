//! `kindred chat` -- text conversation.
//!
//! Each typed line is one turn. The reply is echoed to stdout as it
//! streams; Ctrl+C interrupts a running turn and exits at the prompt.
//!
//! ```text
//! kindred chat
//! > I just lost my dog, I'm devastated
//! [SAD] I'm so sorry for your loss. That's incredibly hard.
//! > /exit
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio::task::JoinHandle;

use kindred_core::TurnOutcome;
use kindred_platform::NativePlatform;
use kindred_types::InputMode;
use kindred_types::config::Config;
use kindred_voice::UnavailableSynthesizer;

use super::{Coordinator, build_coordinator, print_emotion_log, print_profile};

/// How often the streaming reply is re-read while a turn runs.
const ECHO_INTERVAL: Duration = Duration::from_millis(40);

/// Run the text REPL until `/exit`, EOF or Ctrl+C at the prompt.
pub async fn run(platform: Arc<NativePlatform>, cfg: Config) -> anyhow::Result<()> {
    let coord = build_coordinator(platform, &cfg, Arc::new(UnavailableSynthesizer), None).await?;
    coord.set_input_mode(InputMode::Text).await;

    println!("kindred chat -- type /help for commands");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        std::io::stderr().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/help" => {
                print_help();
                continue;
            }
            "/profile" => {
                print_profile(&coord.profile());
                continue;
            }
            "/log" => {
                print_emotion_log(&coord.emotion_log());
                continue;
            }
            "/forget" => {
                coord.clear_profile();
                println!("[profile cleared]");
                continue;
            }
            "/clear" => {
                coord.clear_transcript();
                println!("[conversation cleared]");
                continue;
            }
            _ => {}
        }

        let turn_index = coord.transcript().len() + 1;
        let handle = {
            let coord = Arc::clone(&coord);
            let text = input.to_string();
            tokio::spawn(async move { coord.submit_text(&text).await })
        };
        let outcome = follow_turn(&coord, turn_index, handle).await?;
        report(&outcome);
    }

    coord.interrupt();
    println!("Goodbye.");
    Ok(())
}

/// Echo the agent turn at `turn_index` until the turn finishes.
async fn follow_turn(
    coord: &Coordinator,
    turn_index: usize,
    mut handle: JoinHandle<TurnOutcome>,
) -> anyhow::Result<TurnOutcome> {
    let mut echo = ReplyEcho::default();
    let mut tick = tokio::time::interval(ECHO_INTERVAL);
    let mut interrupted = false;

    let outcome = loop {
        tokio::select! {
            outcome = &mut handle => break outcome?,
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = coord.interrupt();
            }
            _ = tick.tick() => echo.show(coord, turn_index),
        }
    };
    echo.show(coord, turn_index);
    if echo.started() {
        println!();
    }
    Ok(outcome)
}

fn report(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Cancelled => eprintln!("[interrupted]"),
        TurnOutcome::Failed { category, .. } => {
            tracing::debug!(?category, "turn failed");
        }
        TurnOutcome::Completed | TurnOutcome::Ignored => {}
    }
}

/// Tracks how much of the streaming reply the terminal already shows.
#[derive(Debug, Default)]
struct ReplyEcho {
    printed: String,
    header: bool,
}

impl ReplyEcho {
    fn started(&self) -> bool {
        self.header
    }

    fn show(&mut self, coord: &Coordinator, turn_index: usize) {
        let transcript = coord.transcript();
        let Some(turn) = transcript.turns().get(turn_index).filter(|t| t.is_agent()) else {
            return;
        };
        let mut out = std::io::stdout();
        if !self.header {
            if let Some(emotion) = turn.emotion {
                let _ = write!(out, "[{emotion}] ");
            }
            self.header = true;
        }
        if let Some(delta) = self.catch_up(&turn.text) {
            let _ = write!(out, "{delta}");
            let _ = out.flush();
        }
    }

    /// Text to print so the terminal matches `current`.
    ///
    /// A reply that was replaced rather than extended (a failure message
    /// overwriting partial text) is printed again on a fresh line.
    fn catch_up(&mut self, current: &str) -> Option<String> {
        if current == self.printed {
            return None;
        }
        let delta = match current.strip_prefix(self.printed.as_str()) {
            Some(rest) => rest.to_string(),
            None => format!("\n{current}"),
        };
        self.printed = current.to_string();
        Some(delta)
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /profile -- Show what kindred remembers about you");
    println!("  /log     -- Show the emotion log");
    println!("  /forget  -- Clear the profile");
    println!("  /clear   -- Clear the conversation");
    println!("  /exit    -- Quit");
    println!("Ctrl+C interrupts a reply in progress.");
    println!();
}
