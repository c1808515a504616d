//! Rendering of received messages for the terminal

use crate::transport::IncomingMessage;
use serde::{Deserialize, Serialize};

const RESET: &str = "\x1b[0m";
const TOPIC_COLOR: &str = "\x1b[36m"; // Cyan
const RETAIN_COLOR: &str = "\x1b[33m"; // Yellow
const JSON_KEY_COLOR: &str = "\x1b[34m"; // Blue
const JSON_STRING_COLOR: &str = "\x1b[32m"; // Green
const JSON_NUMBER_COLOR: &str = "\x1b[35m"; // Magenta
const JSON_LITERAL_COLOR: &str = "\x1b[90m"; // Dark gray

/// Output formatting options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Color-coded, human-readable with timestamps (default)
    #[default]
    Pretty,
    /// Single line per message, minimal formatting
    Compact,
    /// One JSON object per message for programmatic processing
    Json,
}

/// Render one received message. The result carries no trailing newline.
pub fn format_message(message: &IncomingMessage, format: OutputFormat) -> String {
    let payload = String::from_utf8_lossy(&message.payload);
    let timestamp = message.received_at.format("%H:%M:%S");
    let qos = message.qos as u8;

    match format {
        OutputFormat::Json => {
            let json_output = serde_json::json!({
                "timestamp": message.received_at.to_rfc3339(),
                "topic": message.topic,
                "qos": qos,
                "retain": message.retain,
                "payload": match serde_json::from_str::<serde_json::Value>(&payload) {
                    Ok(json) => json,
                    Err(_) => serde_json::Value::String(payload.to_string()),
                },
            });
            serde_json::to_string(&json_output).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Compact => format!(
            "{} {} q{}{} {}",
            timestamp,
            message.topic,
            qos,
            if message.retain { " r" } else { "" },
            payload.replace('\n', " ").trim()
        ),
        OutputFormat::Pretty => {
            let body = match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(json) => serde_json::to_string_pretty(&json)
                    .map(|pretty| highlight_json(&pretty))
                    .unwrap_or_else(|_| payload.to_string()),
                Err(_) => payload.to_string(),
            };
            let retained = if message.retain {
                format!(" {RETAIN_COLOR}[retained]{RESET}")
            } else {
                String::new()
            };
            format!(
                "{timestamp} {TOPIC_COLOR}{}{RESET} (QoS {qos}){retained}\n{body}",
                message.topic
            )
        }
    }
}

/// Color a pretty-printed JSON document for the terminal
fn highlight_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len() * 2);
    let mut chars = json.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        match ch {
            '"' => {
                let mut end = start + 1;
                let mut escaped = false;
                for (idx, c) in chars.by_ref() {
                    end = idx + c.len_utf8();
                    match c {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => break,
                        _ => {}
                    }
                }
                let is_key = json[end..].trim_start().starts_with(':');
                let color = if is_key { JSON_KEY_COLOR } else { JSON_STRING_COLOR };
                out.push_str(color);
                out.push_str(&json[start..end]);
                out.push_str(RESET);
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut end = start + 1;
                while let Some(&(idx, next)) = chars.peek() {
                    if next.is_ascii_digit() || matches!(next, '.' | 'e' | 'E' | '+' | '-') {
                        end = idx + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(JSON_NUMBER_COLOR);
                out.push_str(&json[start..end]);
                out.push_str(RESET);
            }
            c if c.is_ascii_alphabetic() => {
                let mut end = start + 1;
                while let Some(&(idx, next)) = chars.peek() {
                    if next.is_ascii_alphabetic() {
                        end = idx + 1;
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(JSON_LITERAL_COLOR);
                out.push_str(&json[start..end]);
                out.push_str(RESET);
            }
            c => out.push(c),
        }
    }

    out
}
