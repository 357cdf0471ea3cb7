//! Prompt text and output schemas for the three intelligence requests.

use serde_json::{Value, json};

use kindred_types::{Emotion, UserProfile};

pub const CLASSIFY_SYSTEM: &str = "\
You analyse a single message from a user talking to a supportive companion. \
Identify the dominant emotion expressed and the language the message is written in. \
Reply with JSON only: {\"emotion\": <one of NEUTRAL, JOYFUL, CALM, ANGRY, SAD, SURPRISED>, \
\"languageCode\": <BCP-47 tag such as en-US or es-ES>}.";

pub const EXTRACT_SYSTEM: &str = "\
You maintain a memory of durable personal facts about the user: their name, relationships, \
pets, places, preferences, work, important events. From the user's message, extract any such \
facts as a flat JSON object of string keys to string values. Keys are short, lowercase and \
underscore_delimited (for example \"dog_name\" or \"home_city\"). Do not record feelings of the \
moment or anything the message does not state. If there is nothing new, reply with {}.";

/// Schema constraining classification output.
pub fn classification_schema() -> Value {
    let emotions: Vec<&str> = Emotion::ALL.iter().map(|e| e.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "emotion": { "type": "string", "enum": emotions },
            "languageCode": { "type": "string" }
        },
        "required": ["emotion", "languageCode"],
        "additionalProperties": false
    })
}

/// Schema constraining extraction output to an open string map.
pub fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": { "type": "string" }
    })
}

/// System prompt for the streamed reply.
pub fn response_system(emotion: Emotion, language_code: &str, profile: &UserProfile) -> String {
    let mut prompt = format!(
        "You are a warm, empathetic companion having a spoken conversation. \
The user currently sounds {tone}. Respond in the language identified by '{language_code}'. \
Keep replies short and natural to say aloud: two to four sentences, no lists, no markdown, \
no emoji.",
        tone = tone_word(emotion),
    );

    if !profile.is_empty() {
        prompt.push_str("\n\nWhat you know about the user:\n");
        for (key, value) in profile.facts() {
            prompt.push_str(&format!("- {}: {value}\n", key.replace('_', " ")));
        }
        prompt.push_str("Use these facts only where they naturally fit.");
    }
    prompt
}

fn tone_word(emotion: Emotion) -> &'static str {
    match emotion {
        Emotion::Neutral => "neutral",
        Emotion::Joyful => "joyful",
        Emotion::Calm => "calm",
        Emotion::Angry => "angry or frustrated",
        Emotion::Sad => "sad",
        Emotion::Surprised => "surprised",
    }
}
