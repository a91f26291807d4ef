//! Structural complexity score.
//!
//! A cheap, deterministic estimate of how heavy a render will be. It never
//! decodes media; it only looks at the document and the output settings.

use serde::{Deserialize, Serialize};

use crate::project::{Clip, Effect, OutputSettings, VideoProject};

/// Weights applied to each component of the score.
const VIDEO_CLIP_WEIGHT: f64 = 2.0;
const IMAGE_CLIP_WEIGHT: f64 = 1.0;
const TEXT_CLIP_WEIGHT: f64 = 1.0;
const AUDIO_CLIP_WEIGHT: f64 = 0.5;
const FADE_WEIGHT: f64 = 1.0;
const BLUR_WEIGHT: f64 = 3.0;
const DURATION_WEIGHT_PER_SEC: f64 = 0.5;
const PIXEL_RATE_WEIGHT: f64 = 0.25;

/// Per-component breakdown of a project's complexity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complexity {
    pub clip_count: usize,
    pub effect_count: usize,
    pub duration_secs: f64,
    /// Output megapixels per frame multiplied by frames per second.
    pub megapixel_rate: f64,
    /// Weighted total; this is what the venue policy consumes.
    pub score: f64,
}

impl Complexity {
    /// Score `project` rendered with `output`.
    pub fn of(project: &VideoProject, output: &OutputSettings) -> Self {
        let mut clip_count = 0;
        let mut effect_count = 0;
        let mut clip_score = 0.0;
        let mut effect_score = 0.0;

        for clip in project.clips() {
            clip_count += 1;
            clip_score += match clip {
                Clip::Video(_) => VIDEO_CLIP_WEIGHT,
                Clip::Image(_) => IMAGE_CLIP_WEIGHT,
                Clip::Text(_) => TEXT_CLIP_WEIGHT,
                Clip::Audio(_) => AUDIO_CLIP_WEIGHT,
            };
            for effect in clip.effects() {
                effect_count += 1;
                effect_score += match effect {
                    Effect::Fade { .. } => FADE_WEIGHT,
                    Effect::Blur { .. } => BLUR_WEIGHT,
                };
            }
        }

        let duration_secs = project.duration_secs();
        let megapixels = (output.width as f64 * output.height as f64) / 1_000_000.0;
        let megapixel_rate = megapixels * output.fps.max(0.0);

        let score = clip_score
            + effect_score
            + duration_secs * DURATION_WEIGHT_PER_SEC
            + megapixel_rate * PIXEL_RATE_WEIGHT;

        Self {
            clip_count,
            effect_count,
            duration_secs,
            megapixel_rate,
            score,
        }
    }
}

/// Shorthand for `Complexity::of(project, output).score`.
pub fn project_complexity(project: &VideoProject, output: &OutputSettings) -> f64 {
    Complexity::of(project, output).score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{OutputFormat, Track};
    use proptest::prelude::*;

    fn sample() -> VideoProject {
        VideoProject::from_json_str(
            r#"{
                "id": "p", "version": "0.1.0",
                "settings": { "width": 1920, "height": 1080 },
                "tracks": [{ "id": "t", "clips": [
                    { "id": "v", "type": "video", "start": 0, "duration": 10,
                      "src": "https://example.com/a.mp4",
                      "effects": [{ "id": "b", "type": "blur", "radius": 4 }] },
                    { "id": "a", "type": "audio", "start": 0, "duration": 20,
                      "src": "https://example.com/a.mp3" }
                ]}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_breakdown_counts() {
        let project = sample();
        let c = Complexity::of(&project, &project.settings);
        assert_eq!(c.clip_count, 2);
        assert_eq!(c.effect_count, 1);
        assert!((c.duration_secs - 20.0).abs() < 1e-9);
        // 2.0 + 0.5 + 3.0 + 20 * 0.5 + (2.0736 * 30) * 0.25
        assert!((c.score - 31.052).abs() < 1e-6);
    }

    #[test]
    fn test_empty_project_scores_only_pixel_rate() {
        let settings = OutputSettings::new(1000, 1000, 10.0, OutputFormat::Mp4);
        let project = VideoProject::new("empty", settings.clone());
        assert!((project_complexity(&project, &settings) - 2.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_more_resolution_never_lowers_score(
            w in 1u32..4000,
            h in 1u32..4000,
            extra in 0u32..1000
        ) {
            let project = sample();
            let small = OutputSettings::new(w, h, 30.0, OutputFormat::Mp4);
            let large = OutputSettings::new(w + extra, h, 30.0, OutputFormat::Mp4);
            let (small, large) = (
                project_complexity(&project, &small),
                project_complexity(&project, &large),
            );
            prop_assert!(large >= small);
        }

        #[test]
        fn prop_adding_a_track_never_lowers_score(n in 0usize..5) {
            let mut project = sample();
            let before = project_complexity(&project, &project.settings);
            for i in 0..n {
                let mut track: Track = project.tracks[0].clone();
                track.id = format!("extra-{i}");
                project.tracks.push(track);
            }
            prop_assert!(project_complexity(&project, &project.settings) >= before);
        }
    }
}
