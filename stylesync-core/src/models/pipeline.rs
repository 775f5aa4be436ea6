use serde::{Deserialize, Serialize};

use super::{Listing, VisualAttributes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Success,
    Partial,
    Error,
}

/// The assembled output of one catalog request. Sent both to the HTTP caller
/// and to the notification webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub visual_data: VisualAttributes,
    pub seo_keywords: Vec<String>,
    pub listing: Listing,
    pub status: PipelineStatus,
}

/// Output of a stage that never fails: either what the upstream produced, or a
/// well-formed fallback (`degraded = true`).
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> StageOutcome<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    pub fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(PipelineStatus::Partial).unwrap(),
            serde_json::json!("partial")
        );
    }

    #[test]
    fn test_result_shape() {
        let visual = VisualAttributes::analysis_failed("x");
        let result = PipelineResult {
            listing: Listing::fallback_from(&visual),
            visual_data: visual,
            seo_keywords: vec!["streetwear".to_string()],
            status: PipelineStatus::Success,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["visual_data"]["main_color"], "Unknown");
        assert_eq!(json["seo_keywords"][0], "streetwear");
        assert!(json["listing"]["title"].is_string());
        assert_eq!(json["status"], "success");
    }
}
