use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Message, Role};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorRequest {
    pub message: String,
    /// Language being learned, e.g. `"spanish"`.
    #[serde(default)]
    pub language: String,
    /// Learner's native language; English when absent.
    #[serde(default)]
    pub user_language: Option<String>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorReply {
    pub response: String,
    pub translation: String,
    pub corrections: Vec<String>,
    pub suggestions: Vec<String>,
}

pub fn language_name(code: &str) -> Option<&'static str> {
    let name = match code.to_lowercase().as_str() {
        "spanish" => "Spanish",
        "french" => "French",
        "german" => "German",
        "italian" => "Italian",
        "portuguese" => "Portuguese",
        "russian" => "Russian",
        "japanese" => "Japanese",
        "korean" => "Korean",
        "chinese" => "Chinese",
        "arabic" => "Arabic",
        "english" => "English",
        _ => return None,
    };
    Some(name)
}

fn topic_context(topic: &str) -> &'static str {
    match topic {
        "introductions" => "introductions, meeting new people, personal information, greetings, and basic conversation starters",
        "restaurant" => "restaurant dining, ordering food, asking about menu items, making reservations, and food-related vocabulary",
        "travel" => "traveling, asking for directions, booking accommodations, transportation, and travel-related situations",
        "business" => "professional communication, meetings, presentations, workplace etiquette, and business terminology",
        _ => "general conversation",
    }
}

fn level_instructions(level: &str) -> &'static str {
    match level {
        "intermediate" => "Use more complex vocabulary and grammar. Introduce idiomatic expressions and cultural context.",
        "advanced" => "Use sophisticated vocabulary, complex grammar structures, and discuss nuanced topics. Challenge the learner appropriately.",
        _ => "Use simple vocabulary, basic grammar structures, and provide clear explanations. Be patient and encouraging.",
    }
}

/// Assemble the tutor prompt from the learner's turn and the selected history.
pub fn build_tutor_prompt(request: &TutorRequest, history: &[Message]) -> Result<String> {
    if request.message.trim().is_empty() {
        bail!("Message is required");
    }

    let target = language_name(&request.language).unwrap_or("Spanish");
    let native = request
        .user_language
        .as_deref()
        .and_then(language_name)
        .unwrap_or("English");
    let level = if request.level.is_empty() {
        "beginner"
    } else {
        request.level.as_str()
    };

    let transcript = history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Student",
                Role::Assistant => "Tutor",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(format!(
        "You are an AI language tutor specializing in {target}. You are having a conversation with a {level} level student about {topic}.

The student's native language is {native}, and they are learning {target}.

INSTRUCTIONS:
1. Respond primarily in {target}
2. {instructions}
3. If the student makes errors, gently correct them by showing the correct version
4. Ask follow-up questions to keep the conversation engaging
5. Be encouraging and supportive
6. Include cultural context when relevant
7. Focus on practical, real-world language use
8. Provide a translation of your response in {native}

CONVERSATION HISTORY:
{transcript}

STUDENT'S LATEST MESSAGE: {message}

Respond ONLY with valid JSON in exactly this format (no additional text, no \"json\" prefix):
{{
  \"response\": \"Your main response to the student in {target}\",
  \"translation\": \"Translation of your response in {native}\",
  \"corrections\": [\"List of corrections if any\"],
  \"suggestions\": [\"Helpful suggestions or alternative ways to express the same idea\"]
}}",
        topic = topic_context(&request.topic),
        instructions = level_instructions(&request.level),
        message = request.message,
    ))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Interpret the model's free-text answer as a [`TutorReply`].
///
/// Tolerates a leading `json` tag and prose around the object. Text that is
/// not a JSON object becomes both the response and the translation.
pub fn parse_tutor_reply(raw: &str) -> TutorReply {
    let mut text = raw.trim();
    if text.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("json")) {
        text = text[4..].trim_start();
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            text = &text[start..=end];
        }
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            let response = non_empty_str(map.get("response")).unwrap_or_else(|| text.to_string());
            let translation =
                non_empty_str(map.get("translation")).unwrap_or_else(|| response.clone());
            TutorReply {
                response,
                translation,
                corrections: string_list(map.get("corrections")),
                suggestions: string_list(map.get("suggestions")),
            }
        }
        _ => TutorReply {
            response: text.to_string(),
            translation: text.to_string(),
            corrections: Vec::new(),
            suggestions: Vec::new(),
        },
    }
}
