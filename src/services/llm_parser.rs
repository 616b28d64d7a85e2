use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)\s*```").expect("fenced block pattern"));
static FENCE_DELIMITER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```(?:json)?").expect("fence delimiter pattern"));

/// Strips a Markdown code fence around model output. With no complete fence,
/// stray fence delimiters are removed and the content kept.
pub fn clean_llm_text(raw: &str) -> String {
    if let Some(inner) = FENCED_BLOCK.captures(raw).and_then(|captures| captures.get(1)) {
        return inner.as_str().trim().to_string();
    }
    FENCE_DELIMITER.replace_all(raw, "").trim().to_string()
}

/// Returns the end index (inclusive) of the balanced object starting at `start`.
fn balanced_object_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Recovers the first JSON object embedded in arbitrary text.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let bytes = trimmed.as_bytes();
    let mut search_from = 0;
    while let Some(relative) = trimmed[search_from..].find('{') {
        let start = search_from + relative;
        if let Some(end) = balanced_object_end(bytes, start) {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Some(value);
            }
        }
        search_from = start + 1;
    }
    None
}
