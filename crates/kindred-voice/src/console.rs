//! Terminal stand-ins for speech engines.
//!
//! [`LineRecognizer`] turns typed lines into recognizer events, revealing
//! each line word by word as interim results before finalizing it.
//! [`ConsoleSynthesizer`] "speaks" by printing text at a steady pace so
//! interruption is observable.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use kindred_types::{KindredError, Result};

use crate::capture::{RecognizerEvent, SpeechRecognizer};
use crate::playback::{SpeechSynthesizer, Voice};

type SlotSender = Arc<Mutex<Option<mpsc::Sender<RecognizerEvent>>>>;

/// Recognizer driven by a [`LineFeed`].
#[derive(Debug)]
pub struct LineRecognizer {
    slot: SlotSender,
}

/// Input side of a [`LineRecognizer`].
#[derive(Debug, Clone)]
pub struct LineFeed {
    slot: SlotSender,
}

impl LineRecognizer {
    pub fn new() -> (Self, LineFeed) {
        let slot: SlotSender = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            LineFeed { slot },
        )
    }
}

impl LineFeed {
    /// Feed one typed line. Returns `false` if recognition is not running.
    pub async fn send(&self, line: &str) -> bool {
        let Some(tx) = self.slot.lock().clone() else {
            return false;
        };
        let mut partial = String::new();
        for word in line.split_whitespace() {
            if !partial.is_empty() {
                partial.push(' ');
            }
            partial.push_str(word);
            if tx.send(RecognizerEvent::Interim(partial.clone())).await.is_err() {
                return false;
            }
        }
        tx.send(RecognizerEvent::Final(line.to_string())).await.is_ok()
    }

    /// Report an engine failure.
    pub async fn fail(&self, reason: &str) -> bool {
        let Some(tx) = self.slot.lock().clone() else {
            return false;
        };
        tx.send(RecognizerEvent::Error(KindredError::Speech(reason.to_string())))
            .await
            .is_ok()
    }
}

#[async_trait]
impl SpeechRecognizer for LineRecognizer {
    async fn start(&self) -> Result<mpsc::Receiver<RecognizerEvent>> {
        let (tx, rx) = mpsc::channel(64);
        *self.slot.lock() = Some(tx);
        Ok(rx)
    }

    async fn stop(&self) {
        self.slot.lock().take();
    }
}

/// Prints utterances to stdout one character at a time.
#[derive(Debug)]
pub struct ConsoleSynthesizer {
    char_delay: Duration,
    epoch: AtomicU64,
}

impl ConsoleSynthesizer {
    pub fn new(char_delay: Duration) -> Self {
        Self {
            char_delay,
            epoch: AtomicU64::new(0),
        }
    }
}

fn console_voice(id: &str, language: &str) -> Voice {
    Voice {
        id: id.into(),
        name: format!("Console ({language})"),
        language: language.into(),
        network: false,
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleSynthesizer {
    async fn voices(&self) -> Result<Vec<Voice>> {
        Ok(vec![
            console_voice("console-en", "en-US"),
            console_voice("console-es", "es-ES"),
            console_voice("console-fr", "fr-FR"),
            console_voice("console-de", "de-DE"),
        ])
    }

    async fn speak(&self, text: &str, _voice: Option<&Voice>) -> Result<()> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut out = std::io::stdout();
        for ch in text.chars() {
            if self.epoch.load(Ordering::SeqCst) != epoch {
                writeln!(out, " …")?;
                return Ok(());
            }
            write!(out, "{ch}")?;
            out.flush()?;
            if !self.char_delay.is_zero() {
                tokio::time::sleep(self.char_delay).await;
            }
        }
        write!(out, " ")?;
        out.flush()?;
        Ok(())
    }

    fn stop(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}
