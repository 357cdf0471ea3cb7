//! Turn coordinator scenarios.
//!
//! Each test scripts the language intelligence fake, drives the coordinator
//! through its public events and checks transcript, profile, playback and
//! state afterwards.

mod support;

use std::path::Path;

use kindred_core::TurnOutcome;
use kindred_llm::{ErrorCategory, IntelligenceError, ProviderError};
use kindred_types::{AppState, Emotion, InputMode, Speaker};

use support::{Harness, MemPlatform, PROFILE_PATH, RecordingVoice, eventually, facts};

const DOG: &str = "I just lost my dog, I'm devastated";

#[tokio::test]
async fn sad_message_end_to_end() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.classify_ok(Emotion::Sad, "en-US");
    h.brain
        .reply(&["I'm so sorry", " for your loss.", " That's incredibly hard."]);
    h.brain.extract(Ok(None));

    let outcome = h.coord.submit_text(DOG).await;
    assert_eq!(outcome, TurnOutcome::Completed);

    let transcript = h.coord.transcript();
    assert_eq!(transcript.len(), 2);
    let turns = transcript.turns();
    assert_eq!(turns[0].speaker, Speaker::User);
    assert_eq!(turns[0].text, DOG);
    assert_eq!(turns[1].speaker, Speaker::Agent);
    assert_eq!(turns[1].emotion, Some(Emotion::Sad));
    assert_eq!(
        turns[1].text,
        "I'm so sorry for your loss. That's incredibly hard."
    );

    // First group after the second fragment, the rest once it completed.
    let spoken = h.voice.spoken();
    assert_eq!(spoken[0], "I'm so sorry for your loss.");
    assert_eq!(spoken.concat(), turns[1].text);

    let log = h.coord.emotion_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].user_message, DOG);
    assert_eq!(log[0].emotion, Emotion::Sad);

    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(h.coord.working_emotion(), Emotion::Neutral);
    assert_eq!(
        h.brain.calls(),
        vec![
            format!("classify:{DOG}"),
            format!("stream:{DOG}"),
            format!("extract:{DOG}"),
        ]
    );
}

#[tokio::test]
async fn unterminated_reply_is_spoken_at_the_end() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.reply(&["Sounds", " like a", " great day"]);

    assert_eq!(h.coord.submit_text("I went hiking").await, TurnOutcome::Completed);
    assert_eq!(h.voice.spoken(), vec!["Sounds like a great day"]);
}

#[tokio::test]
async fn text_mode_never_speaks() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.coord.set_input_mode(InputMode::Text).await;
    h.brain.reply(&["Hi there.", " How are you?"]);

    assert_eq!(h.coord.submit_text("hello").await, TurnOutcome::Completed);
    assert!(h.voice.spoken().is_empty());
    assert_eq!(h.coord.transcript().last().unwrap().text, "Hi there. How are you?");
}

#[tokio::test]
async fn blank_text_is_ignored() {
    let h = Harness::new(RecordingVoice::default()).await;
    assert_eq!(h.coord.submit_text("   \n").await, TurnOutcome::Ignored);
    assert!(h.coord.transcript().is_empty());
    assert!(h.brain.calls().is_empty());
}

// ── Interrupts ──────────────────────────────────────────────────────────

#[tokio::test]
async fn interrupt_while_speaking() {
    let h = Harness::new(RecordingVoice::holding()).await;
    h.brain.classify_ok(Emotion::Joyful, "en-US");
    let reply = h.brain.reply_live();

    let turn = h.spawn_submit("I got the job!");
    reply.send(Ok("Congratulations!".into())).await.unwrap();
    reply.send(Ok(" That's wonderful".into())).await.unwrap();
    eventually(|| h.voice.spoken().len() == 1).await;
    assert_eq!(h.coord.app_state(), AppState::Speaking);
    assert!(h.coord.is_speaking());

    assert!(h.coord.interrupt());
    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(h.coord.working_emotion(), Emotion::Neutral);
    assert!(!h.coord.is_speaking());

    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
    assert!(!h.brain.called("extract:I got the job!"));

    // Partial text received before the interrupt stays.
    eventually(|| h.coord.transcript().len() == 2).await;
    let last = h.coord.transcript().last().cloned().unwrap();
    assert!(last.text.starts_with("Congratulations!"));
    assert_eq!(h.voice.spoken(), vec!["Congratulations!"]);
}

#[tokio::test]
async fn interrupt_before_first_fragment_leaves_no_empty_agent_turn() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.classify_ok(Emotion::Calm, "en-US");
    let reply = h.brain.reply_live();

    let turn = h.spawn_submit("Tell me something");
    eventually(|| h.coord.app_state() == AppState::Speaking).await;
    assert!(h.coord.interrupt());
    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);

    // Late fragments are ignored.
    let _ = reply.send(Ok("Too late.".into())).await;
    let transcript = h.coord.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript.turns()[0].speaker, Speaker::User);
    assert!(h.voice.spoken().is_empty());
}

#[tokio::test]
async fn interrupt_during_classification() {
    let h = Harness::new(RecordingVoice::default()).await;
    let _gate = h.brain.classify_gated(Emotion::Sad, "en-US");

    let turn = h.spawn_submit("hmm");
    eventually(|| h.brain.called("classify:hmm")).await;
    assert_eq!(h.coord.app_state(), AppState::Thinking);

    assert!(h.coord.interrupt());
    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
    assert!(!h.brain.called("stream:hmm"));
    assert_eq!(h.coord.transcript().len(), 1);
}

#[tokio::test]
async fn interrupt_when_idle_is_a_no_op() {
    let h = Harness::new(RecordingVoice::default()).await;
    assert!(!h.coord.interrupt());
    assert_eq!(h.coord.app_state(), AppState::Idle);
}

#[tokio::test]
async fn toggle_while_thinking_interrupts() {
    let h = Harness::new(RecordingVoice::default()).await;
    let _gate = h.brain.classify_gated(Emotion::Neutral, "en-US");

    let turn = h.spawn_submit("are you there");
    eventually(|| h.coord.app_state() == AppState::Thinking).await;
    h.coord.toggle_recording().await;
    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
}

#[tokio::test]
async fn interrupt_during_extraction_skips_merge() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.reply(&["Nice to meet you, Ann."]);
    let gate = h.brain.extract_gated(Ok(Some(facts(&[("name", "Ann")]))));

    let turn = h.spawn_submit("I'm Ann");
    eventually(|| h.brain.called("extract:I'm Ann")).await;
    assert!(h.coord.interrupt());
    let _ = gate.send(());

    assert_eq!(turn.await.unwrap(), TurnOutcome::Cancelled);
    assert!(h.coord.profile().is_empty());
    assert!(h.saved_profile().is_none());
}

// ── Superseding turns ───────────────────────────────────────────────────

#[tokio::test]
async fn language_follows_the_last_classification() {
    let h = Harness::new(RecordingVoice::default()).await;
    assert_eq!(h.coord.language(), None);

    h.brain.classify_ok(Emotion::Joyful, "fr-FR");
    h.brain.reply(&["Bonjour !"]);
    h.coord.submit_text("Bonjour").await;
    assert_eq!(h.coord.language().as_deref(), Some("fr-FR"));

    h.brain.classify_ok(Emotion::Calm, "en-GB");
    h.brain.reply(&["Hello again."]);
    h.coord.submit_text("Hello").await;
    assert_eq!(h.coord.language().as_deref(), Some("en-GB"));
}

#[tokio::test]
async fn second_submit_cancels_first() {
    let h = Harness::new(RecordingVoice::default()).await;
    let gate = h.brain.classify_gated(Emotion::Angry, "en-US");
    h.brain.classify_ok(Emotion::Calm, "en-US");
    h.brain.reply(&["Second answer."]);

    let first = h.spawn_submit("first");
    eventually(|| h.brain.called("classify:first")).await;

    assert_eq!(h.coord.submit_text("second").await, TurnOutcome::Completed);
    let _ = gate.send(());
    assert_eq!(first.await.unwrap(), TurnOutcome::Cancelled);

    let texts: Vec<String> = h
        .coord
        .transcript()
        .turns()
        .iter()
        .map(|t| t.text.clone())
        .collect();
    assert_eq!(texts, vec!["first", "second", "Second answer."]);
    assert!(!h.brain.called("stream:first"));
    assert!(!h.brain.called("extract:first"));
    assert_eq!(h.voice.spoken(), vec!["Second answer."]);
}

#[tokio::test]
async fn superseding_a_reply_resets_the_emotion() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.classify_ok(Emotion::Angry, "en-US");
    let first_reply = h.brain.reply_live();
    let gate = h.brain.classify_gated(Emotion::Calm, "en-US");
    h.brain.reply(&["Let's take a breath."]);

    let first = h.spawn_submit("this is unacceptable");
    first_reply.send(Ok("I hear you.".into())).await.unwrap();
    eventually(|| h.coord.app_state() == AppState::Speaking).await;
    assert_eq!(h.coord.working_emotion(), Emotion::Angry);

    let second = h.spawn_submit("sorry, long day");
    eventually(|| h.brain.called("classify:sorry, long day")).await;
    assert_eq!(h.coord.app_state(), AppState::Thinking);
    assert_eq!(h.coord.working_emotion(), Emotion::Neutral);

    let _ = gate.send(());
    assert_eq!(second.await.unwrap(), TurnOutcome::Completed);
    assert_eq!(first.await.unwrap(), TurnOutcome::Cancelled);
    assert_eq!(h.coord.working_emotion(), Emotion::Neutral);
}

#[tokio::test]
async fn superseded_stream_writes_nothing_more() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.classify_ok(Emotion::Neutral, "en-US");
    let first_reply = h.brain.reply_live();
    h.brain.classify_ok(Emotion::Joyful, "en-GB");
    h.brain.reply(&["Brilliant!"]);

    let first = h.spawn_submit("one");
    first_reply.send(Ok("Part one.".into())).await.unwrap();
    eventually(|| {
        h.coord
            .transcript()
            .last()
            .is_some_and(|t| t.text == "Part one.")
    })
    .await;

    assert_eq!(h.coord.submit_text("two").await, TurnOutcome::Completed);
    let _ = first_reply.send(Ok(" Part two.".into())).await;
    drop(first_reply);
    assert_eq!(first.await.unwrap(), TurnOutcome::Cancelled);

    let transcript = h.coord.transcript();
    let texts: Vec<&str> = transcript.turns().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "Part one.", "two", "Brilliant!"]);
    assert!(!h.brain.called("extract:one"));
    assert_eq!(h.coord.app_state(), AppState::Idle);
}

// ── Profile ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn extracted_facts_merge_and_persist() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.extract(Ok(Some(facts(&[("name", "Ann"), ("dog_name", "Rex")]))));
    h.brain.extract(Ok(Some(facts(&[("name", "Anne")]))));

    h.coord.submit_text("I'm Ann and my dog is Rex").await;
    assert_eq!(h.coord.profile().get("name"), Some("Ann"));

    h.coord.submit_text("Actually it's Anne with an e").await;
    let profile = h.coord.profile();
    assert_eq!(profile.get("name"), Some("Anne"));
    assert_eq!(profile.get("dog_name"), Some("Rex"));

    eventually(|| {
        h.saved_profile()
            .is_some_and(|raw| raw.contains("Anne") && raw.contains("Rex"))
    })
    .await;
}

#[tokio::test]
async fn empty_extraction_leaves_profile_alone() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.extract(Ok(None));

    assert_eq!(h.coord.submit_text("hmm, okay").await, TurnOutcome::Completed);
    assert!(h.coord.profile().is_empty());
    tokio::task::yield_now().await;
    assert!(h.saved_profile().is_none());
}

#[tokio::test]
async fn extraction_failure_is_not_an_error_state() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain.reply(&["Okay."]);
    h.brain
        .extract(Err(IntelligenceError::Extraction("not an object".into())));

    assert_eq!(h.coord.submit_text("whatever").await, TurnOutcome::Completed);
    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(h.coord.transcript().last().unwrap().text, "Okay.");
}

#[tokio::test]
async fn saved_profile_conditions_replies() {
    let platform = MemPlatform::default();
    platform
        .fs
        .put(Path::new(PROFILE_PATH), r#"{"name": "Ann", "home_city": "Oslo"}"#);
    let h = Harness::with_platform(RecordingVoice::default(), platform).await;

    assert_eq!(h.coord.profile().len(), 2);
    h.coord.submit_text("good morning").await;
    let seen = h.brain.profiles_seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].get("home_city"), Some("Oslo"));
}

#[tokio::test]
async fn clear_profile_forgets_everything() {
    let platform = MemPlatform::default();
    platform.fs.put(Path::new(PROFILE_PATH), r#"{"name": "Ann"}"#);
    let h = Harness::with_platform(RecordingVoice::default(), platform).await;

    h.coord.clear_profile();
    assert!(h.coord.profile().is_empty());
    eventually(|| h.saved_profile().is_none()).await;
}

// ── Failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn classification_failure_writes_placeholder_turn() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain
        .classify_err(IntelligenceError::Analysis("missing emotion".into()));

    let outcome = h.coord.submit_text("hello?").await;
    let expected = ErrorCategory::Connectivity.user_message();
    assert_eq!(
        outcome,
        TurnOutcome::Failed {
            category: ErrorCategory::Connectivity,
            message: expected.to_string(),
        }
    );
    assert_eq!(h.coord.app_state(), AppState::Error);

    let transcript = h.coord.transcript();
    assert_eq!(transcript.len(), 2);
    let agent = transcript.last().unwrap();
    assert_eq!(agent.speaker, Speaker::Agent);
    assert_eq!(agent.emotion, None);
    assert_eq!(agent.text, expected);
    assert!(h.coord.emotion_log().is_empty());
}

#[tokio::test]
async fn rejected_key_clears_session_credential() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.store
        .set_credential(kindred_types::secret::SecretString::new("sk-wrong"));
    h.brain.classify_ok(Emotion::Neutral, "en-US");
    h.brain.reply_err(
        ProviderError::AuthFailed("Incorrect API key provided".into()).into(),
    );

    let outcome = h.coord.submit_text("hi").await;
    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            category: ErrorCategory::InvalidCredential,
            ..
        }
    ));
    assert!(h.store.credential().is_none());

    // The agent turn created after classification carries the message.
    let agent = h.coord.transcript().last().cloned().unwrap();
    assert_eq!(agent.emotion, Some(Emotion::Neutral));
    assert_eq!(agent.text, ErrorCategory::InvalidCredential.user_message());
}

#[tokio::test]
async fn mid_stream_failure_replaces_partial_text() {
    let h = Harness::new(RecordingVoice::default()).await;
    let reply = h.brain.reply_live();
    let turn = h.spawn_submit("tell me a story");

    reply.send(Ok("Once upon".into())).await.unwrap();
    reply
        .send(Err(ProviderError::RateLimited { retry_after_ms: 1000 }.into()))
        .await
        .unwrap();

    let outcome = turn.await.unwrap();
    assert!(matches!(
        outcome,
        TurnOutcome::Failed {
            category: ErrorCategory::RateLimited,
            ..
        }
    ));
    assert_eq!(
        h.coord.transcript().last().unwrap().text,
        ErrorCategory::RateLimited.user_message()
    );
    assert!(!h.brain.called("extract:tell me a story"));
}

#[tokio::test]
async fn new_turn_recovers_from_error() {
    let h = Harness::new(RecordingVoice::default()).await;
    h.brain
        .classify_err(ProviderError::RequestFailed("connection reset".into()).into());
    h.brain.reply(&["I'm here."]);

    h.coord.submit_text("first try").await;
    assert_eq!(h.coord.app_state(), AppState::Error);

    assert_eq!(h.coord.submit_text("second try").await, TurnOutcome::Completed);
    assert_eq!(h.coord.app_state(), AppState::Idle);
    assert_eq!(h.coord.transcript().len(), 4);
}

#[tokio::test]
async fn state_changes_are_observable() {
    let h = Harness::new(RecordingVoice::default()).await;
    let mut states = h.coord.subscribe();
    let _gate = h.brain.classify_gated(Emotion::Neutral, "en-US");

    let _turn = h.spawn_submit("watch me");
    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), AppState::Thinking);

    h.coord.interrupt();
    states.changed().await.unwrap();
    assert_eq!(*states.borrow(), AppState::Idle);
}
