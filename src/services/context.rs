use crate::models::Message;

const SUMMARY_WINDOW: usize = 20;

/// Render retrieved messages as a transcript block for the tutor prompt.
/// Only the last 20 messages are included.
pub fn format_context_summary(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let start = messages.len().saturating_sub(SUMMARY_WINDOW);
    let lines: Vec<String> = messages[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect();

    format!("Previous conversation context:\n{}\n\n", lines.join("\n"))
}

/// Truncate text to a short title for sessions.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text).trim();
    if first_line.is_empty() {
        return "New chat".to_string();
    }
    if first_line.chars().count() > 50 {
        let truncated: String = first_line.chars().take(47).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}
