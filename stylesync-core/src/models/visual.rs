use serde::{Deserialize, Serialize};

/// Attributes extracted from a product image by the vision stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualAttributes {
    #[serde(default)]
    pub main_color: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub design_style: String,
    #[serde(default)]
    pub visual_features: Vec<String>,
}

impl VisualAttributes {
    /// Sentinel map returned when image analysis could not run.
    pub fn analysis_failed(reason: impl std::fmt::Display) -> Self {
        Self {
            main_color: "Unknown".to_string(),
            product_type: "Unidentified Item".to_string(),
            design_style: "Standard".to_string(),
            visual_features: vec![format!("Error: {}", reason)],
        }
    }

    /// Text used to query trend memory: `"{main_color} {product_type}"`.
    pub fn memory_query(&self) -> String {
        let product = match self.product_type.trim() {
            "" => "product",
            p => p,
        };
        format!("{} {}", self.main_color.trim(), product)
            .trim()
            .to_string()
    }
}
