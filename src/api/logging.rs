use serde_json::Value;

const LOG_TARGET: &str = "chatblocks::api";
const MAX_LOGGED_DATA: usize = 512;

pub fn emit_debug_payload(request_url: &str, payload: &Value) {
    let formatted_payload = serde_json::to_string_pretty(payload)
        .unwrap_or_else(|_| "<payload serialization error>".to_string());
    tracing::debug!(
        target: LOG_TARGET,
        url = request_url,
        payload = %formatted_payload,
        "request payload"
    );
}

pub fn emit_frame_parse_error(event: &str, data: &str, parse_error: &serde_json::Error) {
    tracing::warn!(
        target: LOG_TARGET,
        event,
        error = %parse_error,
        data = %preview(data, MAX_LOGGED_DATA),
        "frame payload is not JSON, keeping it as text"
    );
}

fn preview(data: &str, max_chars: usize) -> String {
    match data.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}… ({} bytes)", &data[..cut], data.len()),
        None => data.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_data() {
        assert_eq!(preview("abc", 8), "abc");
    }

    #[test]
    fn test_preview_cuts_on_char_boundary() {
        assert_eq!(preview("ééé", 2), "éé… (6 bytes)");
    }
}
