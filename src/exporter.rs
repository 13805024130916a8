//! # Analysis Export Module
//!
//! Persistenza di `VideoAnalysisResult` come JSON leggibile (`analysis.json`).

use crate::error::{PipelineError, Result};
use crate::models::VideoAnalysisResult;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Write the analysis as pretty JSON, creating parent directories
pub async fn export_analysis(analysis: &VideoAnalysisResult, output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let content = serde_json::to_string_pretty(analysis)?;
    fs::write(output_path, content).await?;

    debug!("Analysis exported to {}", output_path.display());
    Ok(())
}

/// Read back an analysis written by `export_analysis`
pub async fn load_analysis(json_path: &Path) -> Result<VideoAnalysisResult> {
    if !json_path.exists() {
        return Err(PipelineError::NotFound(json_path.to_path_buf()));
    }

    let content = fs::read_to_string(json_path).await?;
    Ok(serde_json::from_str(&content)?)
}
