//! stylesync-cli: command-line client for a running StyleSync server
//!
//! # Subcommands
//! - `generate <image> [--json]`: upload a product photo, print the listing
//! - `status`                   : show server health

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:7860";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "stylesync-cli",
    version,
    about = "StyleSync: turn a product photo into a marketing listing"
)]
struct Cli {
    /// StyleSync server URL (overrides STYLESYNC_URL env var)
    #[arg(long, env = "STYLESYNC_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload an image and print the generated listing
    Generate {
        /// Path to the product image
        image: PathBuf,

        /// Print the raw JSON result
        #[arg(long)]
        json: bool,
    },

    /// Show StyleSync server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VisualData {
    #[serde(default)]
    pub main_color: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub design_style: String,
    #[serde(default)]
    pub visual_features: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub price_estimate: String,
}

/// Body of a successful POST /generate-catalog
#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    pub visual_data: VisualData,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
    pub listing: ListingData,
    pub status: String,
}

/// Body of a failed POST /generate-catalog
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub details: String,
}

// ============================================================================
// Output
// ============================================================================

/// Human-readable listing summary.
pub fn format_summary(resp: &CatalogResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", resp.listing.title));
    out.push_str(&format!("{}\n\n", "=".repeat(resp.listing.title.chars().count().max(1))));

    let v = &resp.visual_data;
    out.push_str(&format!(
        "Detected:  {} {} ({})\n",
        v.main_color, v.product_type, v.design_style
    ));
    out.push_str(&format!("Price:     {}\n", resp.listing.price_estimate));
    if resp.seo_keywords.is_empty() {
        out.push_str("Keywords:  (none)\n");
    } else {
        out.push_str(&format!("Keywords:  {}\n", resp.seo_keywords.join(", ")));
    }
    out.push_str(&format!("Status:    {}\n", resp.status));

    if !resp.listing.features.is_empty() {
        out.push('\n');
        for feature in &resp.listing.features {
            out.push_str(&format!("  • {}\n", feature));
        }
    }
    if !resp.listing.description.is_empty() {
        out.push_str(&format!("\n{}\n", resp.listing.description.trim()));
    }
    out
}

/// Best-effort rendering of a non-2xx body.
pub fn describe_failure(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) if env.details.is_empty() => format!("{} ({})", env.error, env.kind),
        Ok(env) => format!("{} ({}): {}", env.error, env.kind, env.details),
        Err(_) => body.to_string(),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

/// Upload an image to POST /generate-catalog and print the result.
fn do_generate(server: &str, image: &Path, json_output: bool) -> anyhow::Result<()> {
    // Vision and generation can be slow; the webhook adds a few seconds.
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(180))
        .build()?;

    let form = match reqwest::blocking::multipart::Form::new().file("file", image) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("stylesync-cli: cannot read {}: {}", image.display(), e);
            std::process::exit(1);
        }
    };

    let url = format!("{}/generate-catalog", server);
    let resp = match client.post(&url).multipart(form).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("stylesync-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if !status.is_success() {
        eprintln!(
            "stylesync-cli: server returned {}: {}",
            status,
            describe_failure(&body)
        );
        std::process::exit(1);
    }

    if json_output {
        let value: serde_json::Value = serde_json::from_str(&body)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let catalog: CatalogResponse = match serde_json::from_str(&body) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("stylesync-cli: failed to parse catalog response: {}", e);
            std::process::exit(1);
        }
    };
    print!("{}", format_summary(&catalog));
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("{}/health", server);
    let resp = client.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("StyleSync server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:          {}", body["version"].as_str().unwrap_or("?"));
            println!("Trend memory:     {}", body["memory"].as_str().unwrap_or("?"));
            println!(
                "Notifications:    {}",
                if body["notifications"].as_bool().unwrap_or(false) { "on" } else { "off" }
            );
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("stylesync-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("stylesync-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Generate { image, json } => do_generate(&server, &image, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("stylesync-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CatalogResponse {
        serde_json::from_value(serde_json::json!({
            "visual_data": {
                "main_color": "Washed Black",
                "product_type": "Hoodie",
                "design_style": "Streetwear",
                "visual_features": ["oversized fit"]
            },
            "seo_keywords": ["streetwear", "y2k fashion"],
            "listing": {
                "title": "Washed Black Streetwear Hoodie",
                "description": "Heavyweight comfort.",
                "features": ["Oversized fit", "Kangaroo pocket"],
                "price_estimate": "$55-$75"
            },
            "status": "success"
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_contains_key_fields() {
        let text = format_summary(&sample());
        assert!(text.starts_with("Washed Black Streetwear Hoodie\n"));
        assert!(text.contains("Price:     $55-$75"));
        assert!(text.contains("Keywords:  streetwear, y2k fashion"));
        assert!(text.contains("Status:    success"));
        assert!(text.contains("• Kangaroo pocket"));
    }

    #[test]
    fn test_summary_without_keywords() {
        let mut resp = sample();
        resp.seo_keywords.clear();
        assert!(format_summary(&resp).contains("Keywords:  (none)"));
    }

    #[test]
    fn test_partial_listing_parses_with_missing_fields() {
        let resp: CatalogResponse = serde_json::from_value(serde_json::json!({
            "visual_data": { "main_color": "Unknown" },
            "listing": { "title": "Product Listing" },
            "status": "partial"
        }))
        .unwrap();
        assert!(resp.seo_keywords.is_empty());
        assert!(resp.listing.features.is_empty());
        assert_eq!(resp.status, "partial");
    }

    #[test]
    fn test_describe_failure_envelope() {
        let body = r#"{"error":"Failed to read uploaded file","type":"FileAccessError","details":"no such file"}"#;
        assert_eq!(
            describe_failure(body),
            "Failed to read uploaded file (FileAccessError): no such file"
        );
    }

    #[test]
    fn test_describe_failure_plain_text() {
        assert_eq!(describe_failure("Bad Gateway"), "Bad Gateway");
    }
}
