use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw render request as it arrives over the wire. Nothing in here is trusted;
/// [`crate::domain::sanitize::validate`] turns it into [`JobParams`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderRequest {
    pub background: Option<String>,
    pub quote: Option<String>,
    pub author: Option<String>,
    pub template: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<serde_json::Value>,
    pub text_color: Option<String>,
    pub overlay_opacity: Option<serde_json::Value>,
}

/// Opaque background photo key, `[A-Za-z0-9_-]{1,50}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ImageId(String);

impl ImageId {
    pub(crate) fn new_unchecked(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text that went through the drawtext escaping rules. Only the sanitizer can
/// build one, so only escaped text can reach an encoder filter string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SanitizedText(String);

impl SanitizedText {
    pub(crate) fn new_unchecked(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    #[default]
    Center,
    Top,
    Bottom,
}

impl Template {
    pub const ALL: [Template; 3] = [Template::Center, Template::Top, Template::Bottom];

    pub fn as_str(self) -> &'static str {
        match self {
            Template::Center => "center",
            Template::Top => "top",
            Template::Bottom => "bottom",
        }
    }

    /// Case-insensitive lookup; `None` for names outside the fixed set.
    pub fn parse(name: &str) -> Option<Template> {
        Template::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

pub const DEFAULT_FONT_FAMILY: &str = "DejaVu Sans";
pub const DEFAULT_FONT_SIZE: u32 = 64;
pub const MIN_FONT_SIZE: u32 = 16;
pub const MAX_FONT_SIZE: u32 = 160;
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";
pub const DEFAULT_OVERLAY_OPACITY: f32 = 0.4;

/// Named colors accepted besides `#RRGGBB`.
pub const NAMED_COLORS: [&str; 8] = [
    "white", "black", "yellow", "red", "orange", "gold", "silver", "gray",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Style {
    pub font_family: String,
    pub font_size: u32,
    pub text_color: String,
    pub overlay_opacity: f32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            overlay_opacity: DEFAULT_OVERLAY_OPACITY,
        }
    }
}

/// Canonical render parameters. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobParams {
    pub background: ImageId,
    pub quote: SanitizedText,
    pub author: Option<SanitizedText>,
    pub template: Template,
    pub style: Style,
}
