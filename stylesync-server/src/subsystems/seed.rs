//! Curated trend knowledge base and the seeding routine that loads it.

use anyhow::Result;

use super::retrieve::MemoryRetrievalService;

/// Query used to check recall after seeding.
pub const VERIFY_QUERY: &str = "vintage streetwear hoodie";

#[derive(Debug, Clone, Copy)]
pub struct TrendEntry {
    pub id: &'static str,
    pub text: &'static str,
    /// Comma-joined, as stored in record metadata.
    pub keywords: &'static str,
}

pub const TREND_DATASET: &[TrendEntry] = &[
    TrendEntry {
        id: "trend_streetwear_01",
        text: "Oversized Acid Wash T-Shirt Heavyweight",
        keywords: "streetwear, y2k fashion, distressed, vintage wash, boxy fit, urban aesthetic, 100% cotton, drop shoulder",
    },
    TrendEntry {
        id: "trend_active_01",
        text: "Seamless High-Waist Yoga Leggings",
        keywords: "athleisure, squat-proof, moisture-wicking, four-way stretch, gym essentials, pilates gear, sculpting fit",
    },
    TrendEntry {
        id: "trend_gorpcore_01",
        text: "Waterproof Technical Shell Jacket",
        keywords: "gorpcore, outdoor gear, gore-tex, tactical, utility pockets, rainwear, hiking essentials, techwear",
    },
    TrendEntry {
        id: "trend_coquette_01",
        text: "Satin Bow Ribbon Corset Top",
        keywords: "coquette aesthetic, balletcore, soft girl, feminine, lace details, pastel vibes, ribbon bows",
    },
    TrendEntry {
        id: "trend_oldmoney_01",
        text: "Cable Knit Cashmere Sweater Polo",
        keywords: "old money aesthetic, quiet luxury, preppy, tennis club, timeless, sophisticated, academia",
    },
];

/// Seed the built-in dataset. Returns how many records were written.
pub async fn seed_trends(memory: &MemoryRetrievalService) -> Result<usize> {
    tracing::info!(
        entries = TREND_DATASET.len(),
        backend = memory.backend_name(),
        "Seeding trend memory"
    );
    let written = memory.seed(TREND_DATASET).await?;
    if written < TREND_DATASET.len() {
        tracing::warn!(
            written,
            total = TREND_DATASET.len(),
            "Some trend entries were not seeded"
        );
    } else {
        tracing::info!(written, "Trend memory seeded");
    }
    Ok(written)
}

/// Run the recall check query and return whatever keywords come back.
pub async fn verify_recall(memory: &MemoryRetrievalService) -> Vec<String> {
    memory
        .retrieve_keywords(VERIFY_QUERY, memory.settings().top_k)
        .await
}
