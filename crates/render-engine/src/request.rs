//! Render requests, venues and results.

use std::sync::Arc;

use rendermode_project_model::{
    validate_output_settings, validate_project, Complexity, OutputSettings, ValidationError,
    ValidationIssue, VideoProject,
};
use serde::{Deserialize, Serialize};

/// Where a render executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// In the requesting client's own process.
    Local,
    /// On the render server.
    Remote,
}

impl Venue {
    /// The alternate venue, used for fallback.
    pub fn other(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's venue preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueOverride {
    /// Let the policy decide.
    #[default]
    Auto,
    Local,
    Remote,
}

impl VenueOverride {
    /// The venue this override forces, if any.
    pub fn forced(self) -> Option<Venue> {
        match self {
            Self::Auto => None,
            Self::Local => Some(Venue::Local),
            Self::Remote => Some(Venue::Remote),
        }
    }
}

impl From<Venue> for VenueOverride {
    fn from(venue: Venue) -> Self {
        match venue {
            Venue::Local => Self::Local,
            Venue::Remote => Self::Remote,
        }
    }
}

impl std::str::FromStr for VenueOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("Unknown venue: {other}. Use: auto, local, remote")),
        }
    }
}

/// A project plus the output it should be rendered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub project: VideoProject,
    pub output: OutputSettings,
    #[serde(default)]
    pub venue_override: VenueOverride,
}

impl RenderRequest {
    /// Request rendering `project` with its own settings.
    pub fn new(project: VideoProject) -> Self {
        let output = project.settings.clone();
        Self {
            project,
            output,
            venue_override: VenueOverride::Auto,
        }
    }

    pub fn with_output(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    pub fn with_override(mut self, venue_override: VenueOverride) -> Self {
        self.venue_override = venue_override;
        self
    }

    /// Check both the project document and the requested output.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues: Vec<ValidationIssue> = vec![];
        if let Err(e) = validate_project(&self.project) {
            issues.extend(e.issues);
        }
        if let Err(e) = validate_output_settings(&self.output) {
            issues.extend(e.issues);
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }

    pub fn complexity(&self) -> Complexity {
        Complexity::of(&self.project, &self.output)
    }

    /// Frames the render will produce.
    pub fn frame_count(&self) -> u64 {
        self.output.frame_count(self.project.duration_secs())
    }
}

/// What a successful render hands back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "venue", rename_all = "lowercase")]
pub enum RenderResult {
    /// Encoded output held in memory.
    #[serde(rename_all = "camelCase")]
    Local {
        #[serde(skip)]
        data: Arc<[u8]>,
        size_bytes: usize,
        mime_type: String,
    },
    /// Output stored by the render server.
    Remote { location: String },
}

impl RenderResult {
    pub fn local(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let size_bytes = data.len();
        Self::Local {
            data: data.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn remote(location: impl Into<String>) -> Self {
        Self::Remote {
            location: location.into(),
        }
    }

    pub fn venue(&self) -> Venue {
        match self {
            Self::Local { .. } => Venue::Local,
            Self::Remote { .. } => Venue::Remote,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendermode_project_model::OutputFormat;

    #[test]
    fn venue_other_flips() {
        assert_eq!(Venue::Local.other(), Venue::Remote);
        assert_eq!(Venue::Remote.other(), Venue::Local);
    }

    #[test]
    fn override_forcing() {
        assert_eq!(VenueOverride::Auto.forced(), None);
        assert_eq!(VenueOverride::from(Venue::Remote).forced(), Some(Venue::Remote));
        assert_eq!("local".parse::<VenueOverride>().unwrap(), VenueOverride::Local);
        assert!("cloud".parse::<VenueOverride>().is_err());
    }

    #[test]
    fn request_validation_merges_project_and_output_issues() {
        let mut project = VideoProject::new(
            "p",
            OutputSettings::new(1920, 1080, 30.0, OutputFormat::Mp4),
        );
        project.version = "0.2.0".to_string();
        let request = RenderRequest::new(project)
            .with_output(OutputSettings::new(0, 720, 30.0, OutputFormat::Webm));

        let err = request.validate().unwrap_err();
        assert!(err.has_issue_at("version"));
        assert!(err.has_issue_at("output.width"));
    }

    #[test]
    fn local_result_serializes_without_payload() {
        let result = RenderResult::local(vec![1, 2, 3], "video/mp4");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["venue"], "local");
        assert_eq!(value["sizeBytes"], 3);
        assert!(value.get("data").is_none());
        assert_eq!(result.venue(), Venue::Local);
    }
}
