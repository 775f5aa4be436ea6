use serde::{Deserialize, Serialize};

use super::VisualAttributes;

/// Marketing copy produced by the generation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub price_estimate: String,
}

impl Listing {
    /// Listing assembled from visual attributes alone, used whenever the
    /// text generator is unavailable or returns something unusable.
    pub fn fallback_from(visual: &VisualAttributes) -> Self {
        let title = [
            visual.main_color.trim(),
            visual.design_style.trim(),
            visual.product_type.trim(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
        let title = if title.is_empty() {
            "Product Listing".to_string()
        } else {
            title
        };

        let features: Vec<String> = visual
            .visual_features
            .iter()
            .filter(|f| !f.trim().is_empty() && !f.starts_with("Error:"))
            .take(3)
            .cloned()
            .collect();

        let description = if features.is_empty() {
            format!("{}.", title)
        } else {
            format!("{}. Highlights: {}.", title, features.join(", "))
        };

        Self {
            title,
            description,
            features,
            price_estimate: "N/A".to_string(),
        }
    }
}
