use serde::Serialize;

pub const BODY_PREVIEW_CHARS: usize = 300;

/// Lossy UTF-8 view of a response body, cut to [`BODY_PREVIEW_CHARS`].
pub(crate) fn body_preview(body: &[u8]) -> String {
    let raw_body = String::from_utf8_lossy(body);
    format!("{:.len$}", raw_body, len = BODY_PREVIEW_CHARS)
}

pub(crate) fn with_pretty_json_debug<T, F>(value: &T, log_action: F)
where
    T: Serialize,
    F: FnOnce(&str),
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let pretty_json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>"));
    log_action(pretty_json.as_str());
}
