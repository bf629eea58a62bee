//! Parsing of raw completion answers.

use serde::Deserialize;

use hottake_shared::{AnalysisOutput, HotTakeError, OutputMode, Result, StructuredAnalysis};

/// Remove an optional fenced-code wrapper (```` ```json ```` or ```` ``` ````) and trim.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.trim_end();
    without_close
        .strip_suffix("```")
        .unwrap_or(without_close)
        .trim()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeywordAnswer {
    Object { keywords: Vec<String> },
    List(Vec<String>),
}

/// Parse a keyword answer: `{"keywords": [..]}` or a bare array.
///
/// Entries are trimmed; empties and duplicates are dropped; at most `max` are kept.
pub fn parse_keywords(raw: &str, max: usize) -> Result<Vec<String>> {
    let body = strip_code_fences(raw);
    let answer: KeywordAnswer = serde_json::from_str(body).map_err(|e| {
        HotTakeError::malformed(format!("keyword answer is not a keyword list: {e}"))
    })?;

    let candidates = match answer {
        KeywordAnswer::Object { keywords } => keywords,
        KeywordAnswer::List(keywords) => keywords,
    };

    let mut keywords: Vec<String> = Vec::with_capacity(max);
    for candidate in candidates {
        if keywords.len() == max {
            break;
        }
        let keyword = candidate.trim();
        if keyword.is_empty() || keywords.iter().any(|k| k == keyword) {
            continue;
        }
        keywords.push(keyword.to_string());
    }
    Ok(keywords)
}

/// Parse a synthesis answer according to the requested output mode.
pub fn parse_analysis(raw: &str, mode: OutputMode) -> Result<AnalysisOutput> {
    let body = strip_code_fences(raw);
    match mode {
        OutputMode::Text => Ok(AnalysisOutput::Text(body.to_string())),
        OutputMode::Structured => serde_json::from_str::<StructuredAnalysis>(body)
            .map(AnalysisOutput::Structured)
            .map_err(|e| HotTakeError::malformed(format!("analysis is not valid JSON: {e}"))),
    }
}
