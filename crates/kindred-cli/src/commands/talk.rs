//! `kindred talk` -- voice conversation in the terminal.
//!
//! Typed lines stand in for speech: each one is fed to the recognizer and
//! a pause finalizes the turn, exactly as a microphone would. Replies are
//! "spoken" by printing them at speaking pace. Typing while kindred is
//! talking interrupts it.
//!
//! ```text
//! kindred talk --voice console-fr
//! [listening]
//! Bonjour, je m'appelle Ann
//! [thinking]
//! [JOYFUL] Bonjour Ann ! Ravie de faire ta connaissance.
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use comfy_table::{Table, presets::UTF8_FULL};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast::error::RecvError;

use kindred_core::Notice;
use kindred_platform::NativePlatform;
use kindred_types::AppState;
use kindred_types::config::Config;
use kindred_voice::{
    ConsoleSynthesizer, LineFeed, LineRecognizer, SpeechCapture, SpeechSynthesizer, Voice,
    resolve_voice,
};

use super::{Coordinator, build_coordinator, print_emotion_log, print_profile};

/// Run the voice session until `/exit`, EOF or Ctrl+C while idle.
pub async fn run(
    platform: Arc<NativePlatform>,
    cfg: Config,
    voice: Option<String>,
) -> anyhow::Result<()> {
    let (recognizer, feed) = LineRecognizer::new();
    let (capture, events) = SpeechCapture::new(
        Arc::new(recognizer),
        Duration::from_millis(cfg.voice.pause_ms),
    );
    let synthesizer = Arc::new(ConsoleSynthesizer::new(Duration::from_millis(
        cfg.voice.console_char_ms,
    )));
    let coord = build_coordinator(platform, &cfg, synthesizer.clone(), Some(capture)).await?;
    if voice.is_some() {
        coord.set_voice(voice);
    }

    let capture_task = tokio::spawn(Arc::clone(&coord).run_capture(events));
    let status_task = tokio::spawn(show_status(Arc::clone(&coord)));

    println!("kindred talk -- type what you would say, /help for commands");
    let voices = synthesizer.voices().await.unwrap_or_default();
    if let Some(v) = resolve_voice(
        &voices,
        coord.voice_id().as_deref(),
        Some(&cfg.voice.default_language),
        cfg.voice.prefer_network_voices,
    ) {
        println!("Voice: {} ({})", v.name, v.id);
    }
    println!();
    coord.toggle_recording().await;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                if coord.interrupt() {
                    continue;
                }
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/exit" | "/quit" => break,
            "/help" => print_help(),
            "/stop" => coord.toggle_recording().await,
            "/profile" => print_profile(&coord.profile()),
            "/log" => print_emotion_log(&coord.emotion_log()),
            "/forget" => {
                coord.clear_profile();
                println!("[profile cleared]");
            }
            "/voices" => {
                let language = coord
                    .language()
                    .unwrap_or_else(|| cfg.voice.default_language.clone());
                let selected = resolve_voice(
                    &voices,
                    coord.voice_id().as_deref(),
                    Some(&language),
                    cfg.voice.prefer_network_voices,
                );
                println!("{}", voice_table(&voices, selected));
            }
            cmd if cmd.starts_with("/voice") => {
                let id = cmd.trim_start_matches("/voice").trim();
                coord.set_voice((!id.is_empty()).then(|| id.to_string()));
                match coord.voice_id() {
                    Some(id) => println!("[voice: {id}]"),
                    None => println!("[voice: automatic]"),
                }
            }
            _ => say(&coord, &feed, input).await,
        }
    }

    coord.interrupt();
    if coord.app_state() == AppState::Listening {
        coord.toggle_recording().await;
    }
    capture_task.abort();
    status_task.abort();
    println!();
    println!("Goodbye.");
    Ok(())
}

/// Hand one typed line to the recognizer, barging in on a reply and
/// starting to listen first if needed.
async fn say(coord: &Coordinator, feed: &LineFeed, text: &str) {
    if coord.app_state().is_busy() {
        coord.interrupt();
    }
    if coord.app_state() != AppState::Listening {
        coord.toggle_recording().await;
    }
    if !feed.send(text).await {
        eprintln!("[not listening]");
    }
}

/// Mirror state transitions and notices onto the terminal.
async fn show_status(coord: Arc<Coordinator>) {
    let mut states = coord.subscribe();
    let mut notices = coord.notices();
    let mut previous = *states.borrow();

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                announce(&coord, previous, state);
                previous = state;
            }
            notice = notices.recv() => match notice {
                Ok(Notice::CaptureUnavailable(reason)) => {
                    eprintln!("[voice input unavailable: {reason}]");
                }
                Ok(Notice::CaptureFailed(reason)) => {
                    eprintln!("[listening stopped: {reason}]");
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn announce(coord: &Coordinator, previous: AppState, state: AppState) {
    match state {
        AppState::Listening => eprintln!("[listening]"),
        AppState::Thinking => eprintln!("[thinking]"),
        AppState::Speaking => {
            if let Some(emotion) = coord.transcript().last().and_then(|t| t.emotion) {
                print!("[{emotion}] ");
                std::io::stdout().flush().ok();
            }
        }
        AppState::Error => {
            if let Some(turn) = coord.transcript().last() {
                eprintln!("[{}]", turn.text);
            }
        }
        AppState::Idle => {
            if previous == AppState::Speaking {
                println!();
            }
        }
    }
}

/// Available voices, marking the one replies will use.
fn voice_table(voices: &[Voice], selected: Option<&Voice>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["", "ID", "NAME", "LANGUAGE"]);
    for voice in voices {
        let mark = if selected.is_some_and(|s| s.id == voice.id) {
            "*"
        } else {
            ""
        };
        table.add_row([mark, voice.id.as_str(), voice.name.as_str(), voice.language.as_str()]);
    }
    table
}

fn print_help() {
    println!("Type a line to say it; a pause ends your turn.");
    println!("Commands:");
    println!("  /stop       -- Pause or resume listening");
    println!("  /voices     -- List voices (* marks the current one)");
    println!("  /voice <id> -- Choose a voice; no id returns to automatic");
    println!("  /profile    -- Show what kindred remembers about you");
    println!("  /log        -- Show the emotion log");
    println!("  /forget     -- Clear the profile");
    println!("  /exit       -- Quit");
    println!("Ctrl+C interrupts a reply in progress.");
    println!();
}
