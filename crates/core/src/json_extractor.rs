//! Robust JSON Extractor
//!
//! Converts arbitrary model text into a parsed JSON object via a cascade of
//! repair strategies. This is the single most failure-prone step in the
//! system: LLM output routinely arrives wrapped in markdown fences, glued
//! to a second JSON object, or surrounded by prose.
//!
//! Pure function, deterministic on input, except for the debug-artifact
//! write on terminal failure. Braces inside strings are always treated as
//! literal — no depth change.

use crate::executor::offload_compute;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct UnparseableJson {
    pub preview: String,
    pub debug_artifact_path: Option<String>,
}

impl fmt::Display for UnparseableJson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unparseable JSON; preview: {}", self.preview)
    }
}

impl std::error::Error for UnparseableJson {}

/// Where debug artifacts are written on terminal extraction failure.
pub fn debug_artifact_dir() -> std::path::PathBuf {
    std::env::temp_dir().join("contentforge-json-debug")
}

fn preview(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 1000 {
        return text.to_string();
    }
    let head: String = chars[..500].iter().collect();
    let tail: String = chars[chars.len() - 500..].iter().collect();
    format!("{head}...[truncated]...{tail}")
}

fn strip_fences(text: &str) -> String {
    let fence_re = Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap();
    if let Some(caps) = fence_re.captures(text) {
        return caps.get(1).unwrap().as_str().trim().to_string();
    }
    // Tolerate stray backticks anywhere in the text.
    text.replace('`', "").trim().to_string()
}

fn truncate_concatenated(text: &str) -> String {
    for pattern in ["}\r\n{", "}\n\n{", "}\n{", "} {"] {
        if let Some(idx) = text.find(pattern) {
            let boundary = idx + 1; // keep up to and including the first '}'
            return text[..boundary].to_string();
        }
    }
    text.to_string()
}

/// Walk the text tracking string context and brace depth; return the
/// substring from the first `{` to the matching `}` at depth zero.
fn brace_balanced_extract(text: &str) -> Option<String> {
    let bytes: Vec<char> = text.chars().collect();
    let start = bytes.iter().position(|&c| c == '{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &c) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(bytes[start..end].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

/// Find every maximal `{...}` substring via a shallow-nesting regex, try
/// each from longest to shortest, accept the first whose parsed root
/// contains `required_key`.
fn aggressive_fallback(text: &str, required_key: &str) -> Option<Value> {
    let candidate_re = Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap();
    let mut candidates: Vec<String> = candidate_re
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    candidates.sort_by_key(|c| std::cmp::Reverse(c.len()));

    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            if value.get(required_key).is_some() {
                return Some(value);
            }
        }
    }
    None
}

fn write_debug_artifact(raw: &str) -> Option<String> {
    let dir = debug_artifact_dir();
    if std::fs::create_dir_all(&dir).is_err() {
        return None;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let path = dir.join(format!("unparseable-{nanos}.txt"));
    match std::fs::write(&path, raw) {
        Ok(()) => Some(path.to_string_lossy().into_owned()),
        Err(e) => {
            warn!(error = %e, "failed to write JSON debug artifact");
            None
        }
    }
}

/// Run the repair cascade, stopping at the first strategy that produces a
/// valid JSON object containing `required_key`.
pub async fn extract_json(raw: &str, required_key: &str) -> Result<Value, UnparseableJson> {
    // 1. Raw parse.
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        if value.get(required_key).is_some() {
            debug!("json extractor: raw parse succeeded");
            return Ok(value);
        }
    }

    // 2. Fence-stripped parse.
    let stripped = strip_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(&stripped) {
        if value.get(required_key).is_some() {
            debug!("json extractor: fence-stripped parse succeeded");
            return Ok(value);
        }
    }

    // 3. Concatenated-object truncation.
    let truncated = truncate_concatenated(&stripped);
    if let Ok(value) = serde_json::from_str::<Value>(&truncated) {
        if value.get(required_key).is_some() {
            debug!("json extractor: concatenated-object truncation succeeded");
            return Ok(value);
        }
    }

    // 4. Brace-balanced extraction.
    if let Some(extracted) = brace_balanced_extract(&truncated) {
        if let Ok(value) = serde_json::from_str::<Value>(&extracted) {
            if value.get(required_key).is_some() {
                debug!("json extractor: brace-balanced extraction succeeded");
                return Ok(value);
            }
        }
    }

    // 5. Aggressive regex fallback, offloaded off the reactor since its
    // cost is not bounded by input size in any obviously cheap way.
    let text_for_fallback = raw.to_string();
    let key = required_key.to_string();
    let fallback_result = offload_compute(move || {
        Ok(aggressive_fallback(&text_for_fallback, &key))
    })
    .await
    .unwrap_or(None);

    if let Some(value) = fallback_result {
        warn!("json extractor: aggressive fallback succeeded");
        return Ok(value);
    }

    // One more attempt: strip all fences globally and retry brace-balance.
    let globally_stripped = raw.replace('`', "");
    if let Some(extracted) = brace_balanced_extract(&globally_stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(&extracted) {
            if value.get(required_key).is_some() {
                warn!("json extractor: global fence strip + brace-balance succeeded");
                return Ok(value);
            }
        }
    }

    // 6. Total failure.
    let artifact_path = write_debug_artifact(raw);
    Err(UnparseableJson {
        preview: preview(raw),
        debug_artifact_path: artifact_path,
    })
}
