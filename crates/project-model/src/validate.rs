//! Schema rules checked before a project may be rendered.
//!
//! Parsing enforces shape (required fields, known `type` tags); this module
//! enforces everything else and reports every violation it finds, each with
//! a path such as `tracks[0].clips[2].duration`.

use std::collections::HashSet;

use crate::project::{
    Clip, Effect, OutputSettings, Track, VideoProject, Visual, SUPPORTED_PROJECT_VERSION,
};

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the offending value.
    pub path: String,
    /// Human-readable explanation.
    pub message: String,
}

/// A project (or output settings) that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid project: {}", format_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| format!("{}: {}", issue.path, issue.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Whether any issue was reported at exactly `path`.
    pub fn has_issue_at(&self, path: &str) -> bool {
        self.issues.iter().any(|i| i.path == path)
    }
}

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn check(&mut self, ok: bool, path: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.push(path, message);
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues: self.0 })
        }
    }
}

/// Validate a whole project document.
pub fn validate_project(project: &VideoProject) -> Result<(), ValidationError> {
    let mut issues = Issues::default();

    if project.version != SUPPORTED_PROJECT_VERSION {
        issues.push(
            "version",
            format!("Project version must be '{SUPPORTED_PROJECT_VERSION}'"),
        );
    }

    check_output_settings(&project.settings, "settings", &mut issues);

    let mut track_ids = HashSet::new();
    for (ti, track) in project.tracks.iter().enumerate() {
        let path = format!("tracks[{ti}]");
        if !track_ids.insert(track.id.as_str()) {
            issues.push(
                format!("{path}.id"),
                format!("duplicate track id '{}'", track.id),
            );
        }
        check_track(track, &path, &mut issues);
    }

    issues.finish()
}

/// Validate output settings on their own (as carried by a render request).
pub fn validate_output_settings(settings: &OutputSettings) -> Result<(), ValidationError> {
    let mut issues = Issues::default();
    check_output_settings(settings, "output", &mut issues);
    issues.finish()
}

fn check_output_settings(settings: &OutputSettings, path: &str, issues: &mut Issues) {
    issues.check(
        settings.width > 0,
        format!("{path}.width"),
        "must be a positive integer",
    );
    issues.check(
        settings.height > 0,
        format!("{path}.height"),
        "must be a positive integer",
    );
    issues.check(
        settings.fps.is_finite() && settings.fps > 0.0,
        format!("{path}.fps"),
        "must be positive",
    );
}

fn check_track(track: &Track, path: &str, issues: &mut Issues) {
    let mut clip_ids = HashSet::new();
    for (ci, clip) in track.clips.iter().enumerate() {
        let clip_path = format!("{path}.clips[{ci}]");
        if !clip_ids.insert(clip.id()) {
            issues.push(
                format!("{clip_path}.id"),
                format!("duplicate clip id '{}'", clip.id()),
            );
        }
        check_clip(clip, &clip_path, issues);
    }
}

fn check_clip(clip: &Clip, path: &str, issues: &mut Issues) {
    let timing = clip.timing();
    issues.check(
        timing.start.is_finite() && timing.start >= 0.0,
        format!("{path}.start"),
        "must be non-negative",
    );
    issues.check(
        timing.duration.is_finite() && timing.duration > 0.0,
        format!("{path}.duration"),
        "must be positive",
    );

    if let Some(src) = clip.src() {
        check_url(src, &format!("{path}.src"), issues);
    }

    match clip {
        Clip::Video(video) => {
            check_unit_interval(video.volume, &format!("{path}.volume"), issues);
            check_non_negative(video.trim_start, &format!("{path}.trimStart"), issues);
        }
        Clip::Audio(audio) => {
            check_unit_interval(audio.volume, &format!("{path}.volume"), issues);
            check_non_negative(audio.trim_start, &format!("{path}.trimStart"), issues);
        }
        Clip::Text(text) => {
            issues.check(
                text.font_size.is_finite() && text.font_size > 0.0,
                format!("{path}.fontSize"),
                "must be positive",
            );
        }
        Clip::Image(_) => {}
    }

    if let Some(visual) = clip.visual() {
        check_visual(visual, path, issues);
    }
    check_effects(clip.effects(), path, issues);
}

fn check_visual(visual: &Visual, path: &str, issues: &mut Issues) {
    check_unit_interval(visual.opacity, &format!("{path}.opacity"), issues);
}

fn check_effects(effects: &[Effect], path: &str, issues: &mut Issues) {
    let mut effect_ids = HashSet::new();
    for (ei, effect) in effects.iter().enumerate() {
        let effect_path = format!("{path}.effects[{ei}]");
        if !effect_ids.insert(effect.id()) {
            issues.push(
                format!("{effect_path}.id"),
                format!("duplicate effect id '{}'", effect.id()),
            );
        }
        match effect {
            Effect::Fade { duration, .. } => issues.check(
                duration.is_finite() && *duration > 0.0,
                format!("{effect_path}.duration"),
                "must be positive",
            ),
            Effect::Blur { radius, .. } => {
                check_non_negative(*radius, &format!("{effect_path}.radius"), issues)
            }
        }
    }
}

fn check_url(src: &str, path: &str, issues: &mut Issues) {
    if let Err(e) = url::Url::parse(src) {
        issues.push(path, format!("must be an absolute URL ({e})"));
    }
}

fn check_unit_interval(value: f64, path: &str, issues: &mut Issues) {
    issues.check(
        (0.0..=1.0).contains(&value),
        path,
        "must be between 0 and 1",
    );
}

fn check_non_negative(value: f64, path: &str, issues: &mut Issues) {
    issues.check(
        value.is_finite() && value >= 0.0,
        path,
        "must be non-negative",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ClipTiming, OutputFormat, Position, VideoClip};

    fn video_clip(id: &str, start: f64, duration: f64) -> Clip {
        Clip::Video(VideoClip {
            timing: ClipTiming {
                id: id.to_string(),
                start,
                duration,
            },
            visual: Visual {
                position: Position::default(),
                scale: 1.0,
                rotation: 0.0,
                opacity: 1.0,
                effects: vec![],
            },
            src: "https://example.com/video.mp4".to_string(),
            trim_start: 0.0,
            volume: 1.0,
        })
    }

    fn project_with(clips: Vec<Clip>) -> VideoProject {
        let mut project = VideoProject::new(
            "proj-1",
            OutputSettings::new(1920, 1080, 30.0, OutputFormat::Mp4),
        );
        project.tracks.push(Track {
            id: "track-1".to_string(),
            z_index: 1,
            clips,
        });
        project
    }

    #[test]
    fn test_valid_project_passes() {
        let project = project_with(vec![video_clip("clip-1", 0.0, 5.0)]);
        assert_eq!(validate_project(&project), Ok(()));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut project = project_with(vec![]);
        project.version = "0.2.0".to_string();
        let err = validate_project(&project).unwrap_err();
        assert!(err.has_issue_at("version"));
        assert!(err.to_string().contains("Project version must be '0.1.0'"));
    }

    #[test]
    fn test_negative_width_rejected() {
        let mut project = project_with(vec![]);
        project.settings.width = 0;
        let err = validate_project(&project).unwrap_err();
        assert!(err.has_issue_at("settings.width"));
    }

    #[test]
    fn test_timing_rules() {
        let project = project_with(vec![
            video_clip("a", -1.0, 5.0),
            video_clip("b", 0.0, 0.0),
        ]);
        let err = validate_project(&project).unwrap_err();
        assert!(err.has_issue_at("tracks[0].clips[0].start"));
        assert!(err.has_issue_at("tracks[0].clips[1].duration"));
        assert_eq!(err.issues.len(), 2);
        assert_eq!(
            err.to_string(),
            "Invalid project: tracks[0].clips[0].start: must be non-negative; \
             tracks[0].clips[1].duration: must be positive"
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut project = project_with(vec![video_clip("a", 0.0, 1.0), video_clip("a", 1.0, 1.0)]);
        project.tracks.push(project.tracks[0].clone());
        let err = validate_project(&project).unwrap_err();
        assert!(err.has_issue_at("tracks[0].clips[1].id"));
        assert!(err.has_issue_at("tracks[1].id"));
    }

    #[test]
    fn test_same_clip_id_in_different_tracks_is_allowed() {
        let mut project = project_with(vec![video_clip("a", 0.0, 1.0)]);
        let mut second = project.tracks[0].clone();
        second.id = "track-2".to_string();
        project.tracks.push(second);
        assert_eq!(validate_project(&project), Ok(()));
    }

    #[test]
    fn test_relative_src_rejected() {
        let mut clip = video_clip("a", 0.0, 1.0);
        if let Clip::Video(video) = &mut clip {
            video.src = "videos/intro.mp4".to_string();
        }
        let err = validate_project(&project_with(vec![clip])).unwrap_err();
        assert!(err.has_issue_at("tracks[0].clips[0].src"));
    }

    #[test]
    fn test_effect_rules() {
        let mut clip = video_clip("a", 0.0, 1.0);
        if let Clip::Video(video) = &mut clip {
            video.visual.opacity = 1.5;
            video.visual.effects = vec![
                Effect::Blur {
                    id: "e1".to_string(),
                    radius: -2.0,
                },
                Effect::Fade {
                    id: "e1".to_string(),
                    duration: 0.0,
                    direction: crate::project::FadeDirection::Out,
                },
            ];
        }
        let err = validate_project(&project_with(vec![clip])).unwrap_err();
        assert!(err.has_issue_at("tracks[0].clips[0].opacity"));
        assert!(err.has_issue_at("tracks[0].clips[0].effects[0].radius"));
        assert!(err.has_issue_at("tracks[0].clips[0].effects[1].id"));
        assert!(err.has_issue_at("tracks[0].clips[0].effects[1].duration"));
    }

    #[test]
    fn test_output_settings_checked_alone() {
        let settings = OutputSettings::new(1280, 720, 0.0, OutputFormat::Webm);
        let err = validate_output_settings(&settings).unwrap_err();
        assert!(err.has_issue_at("output.fps"));
    }
}
