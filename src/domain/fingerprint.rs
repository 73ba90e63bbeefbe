//! Cache and dedup key for canonical render parameters.
//!
//! FNV-1a/64 over length-prefixed fields. Not a security boundary: two
//! different parameter sets may collide, see `AdmissionController` for how a
//! collision is handled.

use super::params::JobParams;
use serde::Serialize;
use std::fmt;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bumped whenever the encoded field layout changes.
const LAYOUT_VERSION: &str = "quotereel/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn of(params: &JobParams) -> Self {
        let mut hasher = Fnv1a::new();
        hasher.field(LAYOUT_VERSION);
        hasher.field(params.background.as_str());
        hasher.field(params.quote.as_str());
        match &params.author {
            Some(author) => {
                hasher.field("1");
                hasher.field(author.as_str());
            }
            None => hasher.field("0"),
        }
        hasher.field(params.template.as_str());
        hasher.field(&params.style.font_family);
        hasher.field(&params.style.font_size.to_string());
        hasher.field(&params.style.text_color);
        hasher.field(&format!("{:.2}", params.style.overlay_opacity));
        Fingerprint(hasher.finish())
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_string()
    }
}

struct Fnv1a(u64);

impl Fnv1a {
    fn new() -> Self {
        Fnv1a(FNV_OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= u64::from(*byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    /// `<len>:<bytes>;` so adjacent fields can never run into each other.
    fn field(&mut self, value: &str) {
        self.write(value.len().to_string().as_bytes());
        self.write(b":");
        self.write(value.as_bytes());
        self.write(b";");
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::RenderRequest;
    use crate::domain::sanitize::validate;
    use serde_json::json;

    fn params(quote: &str, author: Option<&str>) -> JobParams {
        validate(&RenderRequest {
            background: Some("Rk6NuB-Tv6E".into()),
            quote: Some(quote.into()),
            author: author.map(Into::into),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fnv_reference_vector() {
        let mut h = Fnv1a::new();
        h.write(b"a");
        assert_eq!(h.finish(), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_fingerprint_is_fixed_width_hex() {
        let fp = Fingerprint::of(&params("Stay hungry", None));
        let text = fp.to_string();
        assert_eq!(text.len(), 16);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(Fingerprint::of(&params("Stay hungry", None)), fp);
    }

    #[test]
    fn test_cosmetic_differences_collapse() {
        let plain = validate(&RenderRequest {
            background: Some("abc".into()),
            quote: Some("Stay hungry".into()),
            ..Default::default()
        })
        .unwrap();
        let noisy = validate(&RenderRequest {
            background: Some("abc".into()),
            quote: Some("  Stay hungry\t".into()),
            template: Some("CENTER".into()),
            text_color: Some("ffffff".into()),
            font_size: Some(json!("64")),
            overlay_opacity: Some(json!(0.4000001)),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(Fingerprint::of(&plain), Fingerprint::of(&noisy));
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Same concatenated text, split differently between quote and author.
        let a = params("ab", Some("c"));
        let b = params("a", Some("bc"));
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));

        let no_author = params("Stay hungry", None);
        let empty_like = params("Stay hungry", Some("0"));
        assert_ne!(Fingerprint::of(&no_author), Fingerprint::of(&empty_like));
    }

    #[test]
    fn test_style_changes_fingerprint() {
        let base = params("Stay hungry", None);
        let mut bigger = base.clone();
        bigger.style.font_size = 80;
        assert_ne!(Fingerprint::of(&base), Fingerprint::of(&bigger));
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let fp = Fingerprint::of(&params("Stay hungry", None));
        assert_eq!(serde_json::to_value(fp).unwrap(), json!(fp.to_string()));
    }
}
