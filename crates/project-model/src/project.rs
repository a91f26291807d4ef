//! Project document types.
//!
//! A project is the top-level container that ties together output settings
//! and an ordered stack of tracks, each holding an ordered list of clips.
//! Field names follow the JSON document (`camelCase`), and optional fields
//! take the documented defaults when absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The only schema version this build accepts.
pub const SUPPORTED_PROJECT_VERSION: &str = "0.1.0";

/// Top-level project document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProject {
    /// Project identifier.
    pub id: String,

    /// Schema version. Must equal [`SUPPORTED_PROJECT_VERSION`].
    pub version: String,

    /// Project-level output settings.
    pub settings: OutputSettings,

    /// Tracks, bottom to top in document order.
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// Output resolution, frame rate and container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    pub width: u32,
    pub height: u32,

    #[serde(default = "default_fps")]
    pub fps: f64,

    #[serde(default)]
    pub format: OutputFormat,
}

/// Output container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            other => Err(format!("Unknown format: {other}. Use: mp4, webm")),
        }
    }
}

/// A layer on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,

    /// Stacking order; higher draws on top.
    #[serde(default)]
    pub z_index: i64,

    #[serde(default)]
    pub clips: Vec<Clip>,
}

/// Discriminated union of clip kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Clip {
    Video(VideoClip),
    Audio(AudioClip),
    Image(ImageClip),
    Text(TextClip),
}

/// Placement fields shared by every clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipTiming {
    pub id: String,

    /// Timeline start, in seconds.
    pub start: f64,

    /// Length on the timeline, in seconds.
    pub duration: f64,
}

/// Visual placement shared by video, image and text clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visual {
    #[serde(default)]
    pub position: Position,

    #[serde(default = "default_one")]
    pub scale: f64,

    /// Rotation in degrees.
    #[serde(default)]
    pub rotation: f64,

    /// Opacity in `[0.0, 1.0]`.
    #[serde(default = "default_one")]
    pub opacity: f64,

    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoClip {
    #[serde(flatten)]
    pub timing: ClipTiming,

    #[serde(flatten)]
    pub visual: Visual,

    /// Absolute URL of the source media.
    pub src: String,

    /// Seconds skipped at the head of the source.
    #[serde(default)]
    pub trim_start: f64,

    /// Volume in `[0.0, 1.0]`.
    #[serde(default = "default_one")]
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    #[serde(flatten)]
    pub timing: ClipTiming,

    pub src: String,

    #[serde(default)]
    pub trim_start: f64,

    #[serde(default = "default_one")]
    pub volume: f64,

    /// Audio fades.
    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageClip {
    #[serde(flatten)]
    pub timing: ClipTiming,

    #[serde(flatten)]
    pub visual: Visual,

    pub src: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextClip {
    #[serde(flatten)]
    pub timing: ClipTiming,

    #[serde(flatten)]
    pub visual: Visual,

    pub content: String,

    pub font_size: f64,

    /// CSS color string, e.g. `#FFFFFF` or `rgba(255,0,0,1)`.
    pub color: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

/// Discriminated union of clip effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Effect {
    Fade {
        id: String,
        /// Fade length in seconds.
        duration: f64,
        direction: FadeDirection,
    },
    Blur {
        id: String,
        radius: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

impl Effect {
    pub fn id(&self) -> &str {
        match self {
            Self::Fade { id, .. } | Self::Blur { id, .. } => id,
        }
    }
}

impl Clip {
    pub fn timing(&self) -> &ClipTiming {
        match self {
            Self::Video(c) => &c.timing,
            Self::Audio(c) => &c.timing,
            Self::Image(c) => &c.timing,
            Self::Text(c) => &c.timing,
        }
    }

    pub fn id(&self) -> &str {
        &self.timing().id
    }

    /// Timeline end, in seconds.
    pub fn end(&self) -> f64 {
        let timing = self.timing();
        timing.start + timing.duration
    }

    /// Visual placement, for clips that draw.
    pub fn visual(&self) -> Option<&Visual> {
        match self {
            Self::Video(c) => Some(&c.visual),
            Self::Image(c) => Some(&c.visual),
            Self::Text(c) => Some(&c.visual),
            Self::Audio(_) => None,
        }
    }

    /// Effects attached to this clip, visual or audio.
    pub fn effects(&self) -> &[Effect] {
        match self {
            Self::Audio(c) => &c.effects,
            other => other.visual().map(|v| v.effects.as_slice()).unwrap_or(&[]),
        }
    }

    /// Source media URL, for clips backed by a file.
    pub fn src(&self) -> Option<&str> {
        match self {
            Self::Video(c) => Some(&c.src),
            Self::Audio(c) => Some(&c.src),
            Self::Image(c) => Some(&c.src),
            Self::Text(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
            Self::Image(_) => "image",
            Self::Text(_) => "text",
        }
    }
}

impl VideoProject {
    /// Create an empty project at the supported schema version.
    pub fn new(id: impl Into<String>, settings: OutputSettings) -> Self {
        Self {
            id: id.into(),
            version: SUPPORTED_PROJECT_VERSION.to_string(),
            settings,
            tracks: vec![],
        }
    }

    /// Parse a project document from JSON text. Shape errors (missing
    /// fields, unknown clip types) surface here; range and identity rules
    /// are checked by [`crate::validate::validate_project`].
    pub fn from_json_str(json: &str) -> Result<Self, ProjectError> {
        serde_json::from_str(json).map_err(|e| ProjectError::ParseError {
            path: None,
            source: e,
        })
    }

    /// Read a project document from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ProjectError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ProjectError::ParseError {
            path: Some(path.to_path_buf()),
            source: e,
        })
    }

    /// Iterate every clip across all tracks, in document order.
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.tracks.iter().flat_map(|t| t.clips.iter())
    }

    /// Timeline length in seconds: the latest clip end.
    pub fn duration_secs(&self) -> f64 {
        self.clips().map(Clip::end).fold(0.0, f64::max)
    }
}

impl OutputSettings {
    pub fn new(width: u32, height: u32, fps: f64, format: OutputFormat) -> Self {
        Self {
            width,
            height,
            fps,
            format,
        }
    }

    /// Frames needed to cover `duration_secs`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        (duration_secs * self.fps).ceil().max(0.0) as u64
    }
}

fn display_location(path: &Option<std::path::PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

fn default_fps() -> f64 {
    30.0
}

fn default_one() -> f64 {
    1.0
}

/// Errors that can occur when reading project documents.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error{}: {source}", display_location(.path))]
    ParseError {
        path: Option<std::path::PathBuf>,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Invalid(#[from] crate::validate::ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "id": "proj-1",
        "version": "0.1.0",
        "settings": { "width": 1920, "height": 1080, "fps": 30 },
        "tracks": [
            {
                "id": "track-1",
                "zIndex": 1,
                "clips": [
                    {
                        "id": "clip-1",
                        "type": "video",
                        "start": 0,
                        "duration": 5,
                        "src": "https://example.com/video.mp4",
                        "position": { "x": 0, "y": 0 },
                        "scale": 1
                    },
                    {
                        "id": "t1",
                        "type": "text",
                        "start": 5,
                        "duration": 5,
                        "content": "Hello World",
                        "fontSize": 24,
                        "color": "#FFFFFF"
                    }
                ]
            }
        ]
    }"##;

    #[test]
    fn test_parse_applies_defaults() {
        let project = VideoProject::from_json_str(SAMPLE).unwrap();
        assert_eq!(project.settings.format, OutputFormat::Mp4);
        assert_eq!(project.tracks[0].z_index, 1);

        let Clip::Video(video) = &project.tracks[0].clips[0] else {
            panic!("expected video clip");
        };
        assert!((video.volume - 1.0).abs() < 1e-9);
        assert!((video.visual.opacity - 1.0).abs() < 1e-9);
        assert_eq!(video.trim_start, 0.0);
        assert!(video.visual.effects.is_empty());

        let Clip::Text(text) = &project.tracks[0].clips[1] else {
            panic!("expected text clip");
        };
        assert_eq!(text.font_family, None);
        assert_eq!(text.color, "#FFFFFF");
        assert_eq!(text.visual.position, Position::default());
    }

    #[test]
    fn test_missing_src_is_a_parse_error() {
        let json = r#"{ "id": "v2", "type": "video", "start": 0, "duration": 10 }"#;
        assert!(serde_json::from_str::<Clip>(json).is_err());
    }

    #[test]
    fn test_effect_tagging() {
        let json = r#"{ "id": "e1", "type": "fade", "duration": 1, "direction": "in" }"#;
        let fade: Effect = serde_json::from_str(json).unwrap();
        assert_eq!(fade.id(), "e1");
        assert!(matches!(
            fade,
            Effect::Fade {
                direction: FadeDirection::In,
                ..
            }
        ));

        let blur: Effect =
            serde_json::from_str(r#"{ "id": "e2", "type": "blur", "radius": 10 }"#).unwrap();
        assert!(matches!(blur, Effect::Blur { .. }));
    }

    #[test]
    fn test_duration_is_latest_clip_end() {
        let project = VideoProject::from_json_str(SAMPLE).unwrap();
        assert!((project.duration_secs() - 10.0).abs() < 1e-9);
        assert_eq!(project.settings.frame_count(project.duration_secs()), 300);
    }

    #[test]
    fn test_load_reports_path_on_parse_failure() {
        let dir = std::env::temp_dir().join("rendermode_test_project_load");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = VideoProject::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("webm".parse::<OutputFormat>().unwrap(), OutputFormat::Webm);
        assert!("gif".parse::<OutputFormat>().is_err());
    }
}
