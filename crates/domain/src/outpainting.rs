use std::str::FromStr;

use chrono::{DateTime, Utc};
use lumora_core::{AppError, JobId, PictureId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an outpainting job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutpaintingJobStatus {
    /// Created and waiting for a worker.
    Wait,
    /// Claimed by a worker.
    Running,
    /// Completed with a result.
    Succeed,
    /// Terminated with a recorded failure reason.
    Failed,
}

impl OutpaintingJobStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Running => "running",
            Self::Succeed => "succeed",
            Self::Failed => "failed",
        }
    }

    /// Parses a storage value into a status.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "wait" => Ok(Self::Wait),
            "running" => Ok(Self::Running),
            "succeed" => Ok(Self::Succeed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown outpainting job status '{value}'"
            ))),
        }
    }

    /// Returns whether the status is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeed | Self::Failed)
    }

    /// Returns whether a persisted job may move from this status to `next`.
    ///
    /// Self transitions are allowed on non-terminal states so the execution
    /// message can be refreshed. Terminal states never move.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Wait, Self::Wait | Self::Running | Self::Failed) => true,
            (Self::Running, Self::Running | Self::Succeed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl FromStr for OutpaintingJobStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// Persisted outpainting job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutpaintingJob {
    /// Job identity.
    pub id: JobId,
    /// Owning account.
    pub user_id: UserId,
    /// Human readable job name.
    pub name: String,
    /// Prompt passed to the inference model.
    pub prompt: String,
    /// Source image reference.
    pub original_image_url: String,
    /// Picture the source image belongs to, when known.
    pub picture_id: Option<PictureId>,
    /// Result image reference once the job succeeded.
    pub expanded_image_url: Option<String>,
    /// Model analysis text once the job succeeded.
    pub analysis: Option<String>,
    /// Latest execution message; always set when failed.
    pub exec_message: Option<String>,
    /// Current lifecycle status.
    pub status: OutpaintingJobStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Input accepted when creating a job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutpaintingJob {
    /// Owning account.
    pub user_id: UserId,
    /// Human readable job name.
    pub name: String,
    /// Prompt passed to the inference model.
    pub prompt: String,
    /// Source image reference.
    pub original_image_url: String,
    /// Picture the source image belongs to, when known.
    pub picture_id: Option<PictureId>,
}

/// Field changes applied together with a conditional status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    /// Status written when the transition applies.
    pub status: OutpaintingJobStatus,
    /// Execution message written when present.
    pub exec_message: Option<String>,
    /// Result image reference written when present.
    pub expanded_image_url: Option<String>,
    /// Analysis text written when present.
    pub analysis: Option<String>,
}

impl JobTransition {
    /// Builds a transition to `running`.
    #[must_use]
    pub fn running(message: impl Into<String>) -> Self {
        Self {
            status: OutpaintingJobStatus::Running,
            exec_message: Some(message.into()),
            expanded_image_url: None,
            analysis: None,
        }
    }

    /// Builds a transition to `failed`; a failure reason is mandatory.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: OutpaintingJobStatus::Failed,
            exec_message: Some(reason.into()),
            expanded_image_url: None,
            analysis: None,
        }
    }

    /// Builds a transition to `succeed` carrying the parsed result.
    #[must_use]
    pub fn succeeded(result: OutpaintingResult) -> Self {
        Self {
            status: OutpaintingJobStatus::Succeed,
            exec_message: Some("outpainting completed".to_owned()),
            expanded_image_url: result.result_url,
            analysis: result.analysis,
        }
    }

    /// Builds a message-only update that keeps `status`.
    #[must_use]
    pub fn note(status: OutpaintingJobStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            exec_message: Some(message.into()),
            expanded_image_url: None,
            analysis: None,
        }
    }
}

/// Structured result extracted from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutpaintingResult {
    /// Link to the expanded image.
    pub result_url: Option<String>,
    /// Free-text analysis of the picture.
    pub analysis: Option<String>,
}

/// Label preceding the result link in model output.
pub const RESULT_URL_LABEL: &str = "Result URL:";
/// Label preceding the analysis text in model output.
pub const ANALYSIS_LABEL: &str = "Analysis:";

/// Extracts the labeled result fields from free-text model output.
///
/// The link runs from its label to the end of that line; the analysis runs
/// from its label to the end of the text. Returns `None` when neither label
/// yields a value.
#[must_use]
pub fn parse_outpainting_output(output: &str) -> Option<OutpaintingResult> {
    let result_url = output.find(RESULT_URL_LABEL).and_then(|start| {
        let rest = &output[start + RESULT_URL_LABEL.len()..];
        let line = rest.lines().next().unwrap_or_default();
        non_empty(line)
    });
    let analysis = output
        .find(ANALYSIS_LABEL)
        .and_then(|start| non_empty(&output[start + ANALYSIS_LABEL.len()..]));

    if result_url.is_none() && analysis.is_none() {
        return None;
    }

    Some(OutpaintingResult {
        result_url,
        analysis,
    })
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Outpainting job projection returned to owners; omits the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutpaintingJobView {
    /// Job identity.
    pub id: JobId,
    /// Human readable job name.
    pub name: String,
    /// Source image reference.
    pub original_image_url: String,
    /// Result image reference.
    pub expanded_image_url: Option<String>,
    /// Model analysis text.
    pub analysis: Option<String>,
    /// Latest execution message.
    pub exec_message: Option<String>,
    /// Current status.
    pub status: OutpaintingJobStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<OutpaintingJob> for OutpaintingJobView {
    fn from(value: OutpaintingJob) -> Self {
        Self {
            id: value.id,
            name: value.name,
            original_image_url: value.original_image_url,
            expanded_image_url: value.expanded_image_url,
            analysis: value.analysis,
            exec_message: value.exec_message,
            status: value.status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{OutpaintingJobStatus, parse_outpainting_output};

    const STATUSES: [OutpaintingJobStatus; 4] = [
        OutpaintingJobStatus::Wait,
        OutpaintingJobStatus::Running,
        OutpaintingJobStatus::Succeed,
        OutpaintingJobStatus::Failed,
    ];

    #[test]
    fn storage_values_are_stable() {
        let values: Vec<&str> = STATUSES.iter().map(OutpaintingJobStatus::as_str).collect();
        assert_eq!(values, vec!["wait", "running", "succeed", "failed"]);
        assert!(OutpaintingJobStatus::parse("done").is_err());
    }

    #[test]
    fn terminal_states_never_restart() {
        assert!(!OutpaintingJobStatus::Succeed.can_transition_to(OutpaintingJobStatus::Running));
        assert!(!OutpaintingJobStatus::Failed.can_transition_to(OutpaintingJobStatus::Running));
        assert!(!OutpaintingJobStatus::Running.can_transition_to(OutpaintingJobStatus::Wait));
        assert!(OutpaintingJobStatus::Wait.can_transition_to(OutpaintingJobStatus::Running));
    }

    #[test]
    fn output_with_both_labels_is_parsed() {
        let output = "Result URL: https://cdn.example.com/out.png\nAnalysis: a wide beach at dusk\nwith gulls";
        let parsed = parse_outpainting_output(output);
        assert_eq!(
            parsed.as_ref().and_then(|result| result.result_url.as_deref()),
            Some("https://cdn.example.com/out.png")
        );
        assert_eq!(
            parsed.and_then(|result| result.analysis),
            Some("a wide beach at dusk\nwith gulls".to_owned())
        );
    }

    #[test]
    fn output_with_one_label_keeps_that_field() {
        let parsed = parse_outpainting_output("Analysis: only words");
        assert_eq!(
            parsed.as_ref().map(|result| result.result_url.is_none()),
            Some(true)
        );
    }

    #[test]
    fn output_without_labels_is_rejected() {
        assert_eq!(parse_outpainting_output("I cannot help with that."), None);
        assert_eq!(parse_outpainting_output("Result URL:   \nAnalysis:  "), None);
    }

    fn status_strategy() -> impl Strategy<Value = OutpaintingJobStatus> {
        prop::sample::select(STATUSES.to_vec())
    }

    proptest! {
        #[test]
        fn accepted_paths_never_leave_a_terminal_state(
            path in prop::collection::vec(status_strategy(), 1..12)
        ) {
            let mut current = OutpaintingJobStatus::Wait;
            let mut reached_terminal = false;
            for next in path {
                if current.can_transition_to(next) {
                    prop_assert!(!reached_terminal);
                    current = next;
                    reached_terminal = current.is_terminal();
                }
            }
        }
    }
}
