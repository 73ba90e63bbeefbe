//! Request validation and drawtext escaping.
//!
//! Required fields (background id, quote) reject the request when invalid.
//! Everything else degrades to a documented default.

use super::params::{
    ImageId, JobParams, RenderRequest, SanitizedText, Style, Template, DEFAULT_FONT_FAMILY,
    DEFAULT_FONT_SIZE, DEFAULT_OVERLAY_OPACITY, DEFAULT_TEXT_COLOR, MAX_FONT_SIZE, MIN_FONT_SIZE,
    NAMED_COLORS,
};
use crate::error::ValidationError;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

pub const MAX_QUOTE_CHARS: usize = 500;
pub const MAX_SHORT_CHARS: usize = 100;

static IMAGE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("static regex"));
static FONT_FAMILY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 _-]{1,40}$").expect("static regex"));
static HEX_COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?([0-9A-Fa-f]{6})$").expect("static regex"));

/// Apply the drawtext escaping rules in order: trim, truncate, `\`, `'`, `%`,
/// `:`, line breaks, then control characters.
///
/// Only horizontal whitespace is trimmed so line breaks the author typed,
/// trailing ones included, survive as `\n` tokens.
pub fn escape_drawtext(input: &str, max_chars: usize) -> String {
    let trimmed = input.trim_matches(|c: char| c.is_whitespace() && c != '\n' && c != '\r');
    let truncated: String = trimmed.chars().take(max_chars).collect();

    truncated
        .replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace('%', "%%")
        .replace(':', "\\:")
        .replace('\r', "")
        .replace('\n', "\\n")
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .collect()
}

fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

/// Escape a text field, `None` when nothing printable is left.
pub fn sanitize_text(input: &str, max_chars: usize) -> Option<SanitizedText> {
    if input.trim().is_empty() {
        return None;
    }
    let escaped = escape_drawtext(input, max_chars);
    if escaped.is_empty() {
        None
    } else {
        Some(SanitizedText::new_unchecked(escaped))
    }
}

/// Identifiers are keys into an external photo store, so they are checked,
/// never rewritten.
pub fn validate_image_id(raw: &str) -> Result<ImageId, ValidationError> {
    if IMAGE_ID_RE.is_match(raw) {
        Ok(ImageId::new_unchecked(raw.to_string()))
    } else {
        Err(ValidationError::InvalidImageId)
    }
}

pub fn validate(request: &RenderRequest) -> Result<JobParams, ValidationError> {
    let background = request
        .background
        .as_deref()
        .ok_or(ValidationError::MissingField("background"))
        .and_then(validate_image_id)?;

    let raw_quote = request
        .quote
        .as_deref()
        .ok_or(ValidationError::MissingField("quote"))?;
    let quote =
        sanitize_text(raw_quote, MAX_QUOTE_CHARS).ok_or(ValidationError::EmptyText("quote"))?;

    let author = request
        .author
        .as_deref()
        .and_then(|raw| sanitize_text(raw, MAX_SHORT_CHARS));

    let template = match request.template.as_deref() {
        None => Template::default(),
        Some(name) => Template::parse(name).unwrap_or_else(|| {
            debug!(template = name, "unknown template, using default");
            Template::default()
        }),
    };

    Ok(JobParams {
        background,
        quote,
        author,
        template,
        style: sanitize_style(request),
    })
}

fn sanitize_style(request: &RenderRequest) -> Style {
    Style {
        font_family: request
            .font_family
            .as_deref()
            .map(str::trim)
            .filter(|family| FONT_FAMILY_RE.is_match(family))
            .unwrap_or(DEFAULT_FONT_FAMILY)
            .to_string(),
        font_size: request
            .font_size
            .as_ref()
            .and_then(value_as_u64)
            .and_then(|size| u32::try_from(size).ok())
            .filter(|size| (MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(size))
            .unwrap_or(DEFAULT_FONT_SIZE),
        text_color: request
            .text_color
            .as_deref()
            .and_then(normalize_color)
            .unwrap_or_else(|| DEFAULT_TEXT_COLOR.to_string()),
        overlay_opacity: request
            .overlay_opacity
            .as_ref()
            .and_then(value_as_f64)
            .filter(|opacity| (0.0..=1.0).contains(opacity))
            .map(|opacity| ((opacity * 100.0).round() / 100.0) as f32)
            .unwrap_or(DEFAULT_OVERLAY_OPACITY),
    }
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn normalize_color(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Some(caps) = HEX_COLOR_RE.captures(raw) {
        return Some(format!("#{}", caps[1].to_ascii_uppercase()));
    }
    let lower = raw.to_ascii_lowercase();
    NAMED_COLORS.contains(&lower.as_str()).then_some(lower)
}
