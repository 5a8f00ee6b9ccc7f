use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const DEFAULT_ASSISTANT_INSTRUCTIONS: &str = "You are a friendly and professional assistant for the business. \
When a user greets you, greet them back and ask how you can help, giving a few examples of what they can ask. \
For questions about the business, use the `search_similar_text` tool and base your answer strictly on the context it returns. \
If the context does not contain the answer, say you do not know and ask the user to rephrase. \
Use the calendar tools to check availability, book, list, move or cancel appointments, and confirm times in plain language.";

/// System instruction for one request: the current date in the business zone, the
/// assistant instructions and, when known, what we remember about the user.
pub fn system_instruction(instructions: &str, now: DateTime<Utc>, zone: Tz, user_history: Option<&str>) -> String {
    let local_now = now.with_timezone(&zone);
    let mut prompt = format!(
        "The current date is <date>{}</date>. Use this date to answer user questions.\n{}",
        local_now.format("%Y-%m-%dT%H:%M:%S%:z (%A)"),
        instructions.trim()
    );

    if let Some(history) = user_history.map(str::trim).filter(|history| !history.is_empty()) {
        prompt.push_str(&format!("\n<userHistory>{history}</userHistory>"));
    }
    prompt
}
