pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Minimal Slack text to markup conversion: escape, keep line breaks, wrap in one paragraph.
/// Slack mrkdwn (mentions, emphasis, links) is left as literal text.
pub fn slack_text_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let escaped = escape_html(text).replace("\r\n", "\n").replace('\n', "<br>");
    format!("<p>{}</p>", escaped)
}

pub fn normalize_channel_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}
