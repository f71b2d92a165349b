//! Run configuration: one explicit value passed into the pipeline.

use std::path::Path;

use anyhow::Context as _;

use crate::{
    foundation::error::{ReelError, ReelResult},
    render::RenderConfig,
    scene::SceneConfig,
    speech::{
        Voice, elevenlabs::ProviderConfig, narration::SynthesisConfig, retry::RetryPolicy,
    },
    text::SegmenterConfig,
    viseme::VisemeConfig,
};

/// Every tunable of a run, loadable from JSON. Missing sections and fields take their defaults.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub voice: Voice,
    pub provider: ProviderConfig,
    pub retry: RetryPolicy,
    pub synthesis: SynthesisConfig,
    pub segmenter: SegmenterConfig,
    pub viseme: VisemeConfig,
    pub scene: SceneConfig,
    pub render: RenderConfig,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> ReelResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ReelError::validation(format!("invalid pipeline config JSON: {e}")))
    }

    pub fn from_json_file(path: &Path) -> ReelResult<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        serde_json::from_str(&json).map_err(|e| {
            ReelError::validation(format!("invalid pipeline config '{}': {e}", path.display()))
        })
    }

    pub fn validate(&self) -> ReelResult<()> {
        self.voice.validate()?;
        self.provider.validate()?;
        self.synthesis.validate()?;
        self.segmenter.validate()?;
        self.viseme.validate()?;
        self.scene.validate()?;
        self.render.validate()?;
        Ok(())
    }
}
