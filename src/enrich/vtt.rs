use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid markup tag regex"));

/// Reduces a WebVTT caption track to a single line of spoken text.
pub fn vtt_to_text(input: &str) -> String {
    input
        .lines()
        .enumerate()
        .filter(|(index, line)| !(*index == 0 && line.trim_start().starts_with("WEBVTT")))
        .map(|(_, line)| line.trim())
        .filter(|line| !line.contains("-->"))
        .filter(|line| !is_sequence_number(line))
        .map(|line| MARKUP_TAG_REGEX.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_sequence_number(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}
