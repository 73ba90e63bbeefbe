//! ffmpeg argument construction for a quote video.
//!
//! Every user-controlled value that lands in the filter graph is either a
//! `SanitizedText`, a pattern-checked style field, or a number.
//!
//! ffmpeg unescapes a `-vf` argument twice: once when splitting the graph
//! into filters and once when splitting a filter's options. `SanitizedText`
//! covers the option level; [`escape_filtergraph`] adds the graph level.

use super::params::{JobParams, Template};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub duration_secs: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            duration_secs: 8,
            width: 1080,
            height: 1920,
            fps: 30,
        }
    }
}

/// Vertical placement of quote and author lines for a template.
fn placement(template: Template) -> (&'static str, &'static str) {
    match template {
        Template::Center => ("(h-text_h)/2", "h*0.75"),
        Template::Top => ("h*0.10", "h*0.40"),
        Template::Bottom => ("h*0.60", "h*0.88"),
    }
}

/// `#RRGGBB` becomes `0xRRGGBB`; named colors pass through.
fn ffmpeg_color(color: &str) -> String {
    match color.strip_prefix('#') {
        Some(hex) => format!("0x{}", hex),
        None => color.to_string(),
    }
}

/// Backslash-escape the characters the filtergraph parser consumes before
/// a filter sees its options.
pub fn escape_filtergraph(filter: &str) -> String {
    let mut out = String::with_capacity(filter.len());
    for c in filter.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

pub fn filter_graph(params: &JobParams, settings: &EncodeSettings) -> String {
    let style = &params.style;
    let color = ffmpeg_color(&style.text_color);
    let (quote_y, author_y) = placement(params.template);
    let (w, h) = (settings.width, settings.height);

    let mut filters = vec![
        format!("scale={w}:{h}:force_original_aspect_ratio=increase"),
        format!("crop={w}:{h}"),
        format!(
            "drawbox=x=0:y=0:w=iw:h=ih:color=black@{:.2}:t=fill",
            style.overlay_opacity
        ),
        escape_filtergraph(&format!(
            "drawtext=font='{}':text='{}':fontsize={}:fontcolor={}:line_spacing={}:\
             shadowcolor=black@0.6:shadowx=2:shadowy=2:x=(w-text_w)/2:y={}",
            style.font_family,
            params.quote.as_str(),
            style.font_size,
            color,
            style.font_size / 4,
            quote_y
        )),
    ];

    if let Some(author) = &params.author {
        filters.push(escape_filtergraph(&format!(
            "drawtext=font='{}':text='- {}':fontsize={}:fontcolor={}:x=(w-text_w)/2:y={}",
            style.font_family,
            author.as_str(),
            (style.font_size / 2).max(16),
            color,
            author_y
        )));
    }

    filters.join(",")
}

/// Full argument list: loop the still background for `duration_secs` and
/// write an H.264 MP4 to `output`.
pub fn build_args(
    params: &JobParams,
    background_input: &str,
    output: &Path,
    settings: &EncodeSettings,
) -> Vec<String> {
    let mut args: Vec<String> = [
        "-y",
        "-hide_banner",
        "-loglevel",
        "error",
        "-loop",
        "1",
        "-i",
        background_input,
        "-vf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let duration = settings.duration_secs.to_string();
    let fps = settings.fps.to_string();
    args.push(filter_graph(params, settings));
    args.extend(
        [
            "-t",
            duration.as_str(),
            "-r",
            fps.as_str(),
            "-c:v",
            "libx264",
            "-preset",
            "veryfast",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-an",
            "-f",
            "mp4",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::params::RenderRequest;
    use crate::domain::sanitize::validate;
    use serde_json::json;
    use std::path::PathBuf;

    fn params(quote: &str, author: Option<&str>, template: &str) -> JobParams {
        validate(&RenderRequest {
            background: Some("Rk6NuB-Tv6E".into()),
            quote: Some(quote.into()),
            author: author.map(Into::into),
            template: Some(template.into()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_args_shape() {
        let p = params("Stay hungry", None, "center");
        let out = PathBuf::from("/tmp/renders/abc.part.mp4");
        let args = build_args(&p, "/srv/bg/Rk6NuB-Tv6E.jpg", &out, &EncodeSettings::default());

        let input_at = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input_at - 2], "-loop");
        assert_eq!(args[input_at + 1], "/srv/bg/Rk6NuB-Tv6E.jpg");
        let t_at = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t_at + 1], "8");
        assert_eq!(args.last().unwrap(), "/tmp/renders/abc.part.mp4");
    }

    #[test]
    fn test_filter_uses_escaped_text_only() {
        let p = params("I'm \"happy\": 100%", None, "center");
        let filter = filter_graph(&p, &EncodeSettings::default());

        assert!(filter.contains(r#"text=\'I\'\\\'\'m "happy"\\: 100%%\'"#));
        assert!(!filter.contains("happy\":"));
    }

    #[test]
    fn test_filter_style_and_template() {
        let mut p = params("Stay hungry", Some("Steve Jobs"), "top");
        p.style = validate(&RenderRequest {
            background: Some("x".into()),
            quote: Some("x".into()),
            text_color: Some("#ffcc00".into()),
            font_size: Some(json!(80)),
            overlay_opacity: Some(json!(0.25)),
            ..Default::default()
        })
        .unwrap()
        .style;
        let filter = filter_graph(&p, &EncodeSettings::default());

        assert!(filter.starts_with("scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,"));
        assert!(filter.contains("color=black@0.25:t=fill"));
        assert!(filter.contains("fontsize=80:fontcolor=0xFFCC00"));
        assert!(filter.contains("y=h*0.10"));
        assert!(filter.contains(r"text=\'- Steve Jobs\':fontsize=40"));
        assert!(filter.contains("y=h*0.40"));
    }

    #[test]
    fn test_apostrophe_survives_both_escaping_levels() {
        let p = params("It's time", None, "center");
        let filter = filter_graph(&p, &EncodeSettings::default());

        let drawtext = filter.split(",drawtext=").nth(1).unwrap();
        assert_eq!(
            drawtext,
            concat!(
                r"font=\'DejaVu Sans\':text=\'It\'\\\'\'s time\':fontsize=64:fontcolor=0xFFFFFF:",
                "line_spacing=16:shadowcolor=black@0.6:shadowx=2:shadowy=2:",
                "x=(w-text_w)/2:y=(h-text_h)/2",
            )
        );
    }

    #[test]
    fn test_graph_escape_covers_separators() {
        assert_eq!(escape_filtergraph("a,b;c[d]"), r"a\,b\;c\[d\]");
        assert_eq!(escape_filtergraph(r"x\'y"), r"x\\\'y");
        assert_eq!(escape_filtergraph("y=(h-text_h)/2"), "y=(h-text_h)/2");
    }

    #[test]
    fn test_no_author_means_single_drawtext() {
        let p = params("Stay hungry", None, "bottom");
        let filter = filter_graph(&p, &EncodeSettings::default());
        assert_eq!(filter.matches("drawtext=").count(), 1);
        assert!(filter.contains("y=h*0.60"));
    }
}
