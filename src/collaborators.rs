//! # Downstream Collaborators
//!
//! Punti di estensione per ciò che avviene dopo l'analisi: generazione del
//! codice del template e arricchimento del contenuto. Le implementazioni di
//! default non fanno nulla oltre a loggare.

use crate::models::VideoAnalysisResult;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Turns a finished analysis into template source code
#[async_trait]
pub trait TemplateGenerator: Send + Sync {
    async fn generate(&self, component_name: &str, analysis: &VideoAnalysisResult, output_dir: &Path) -> Result<()>;
}

/// Produces the optional orchestration payload attached to an analysis
#[async_trait]
pub trait ContentOrchestrator: Send + Sync {
    async fn orchestrate(&self, prompt: &str) -> Result<Option<serde_json::Value>>;
}

#[derive(Debug, Default, Clone)]
pub struct NoopTemplateGenerator;

#[async_trait]
impl TemplateGenerator for NoopTemplateGenerator {
    async fn generate(&self, component_name: &str, _analysis: &VideoAnalysisResult, output_dir: &Path) -> Result<()> {
        info!(
            "Template generation for {} skipped (no generator configured); analysis is in {}",
            component_name,
            output_dir.display()
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoOrchestrator;

#[async_trait]
impl ContentOrchestrator for NoOrchestrator {
    async fn orchestrate(&self, _prompt: &str) -> Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_do_nothing() {
        assert_eq!(NoOrchestrator.orchestrate("anything").await.unwrap(), None);
    }
}
