//! The process-wide model context.
//!
//! A [`ModelContext`] is built exactly once, before the server binds its
//! listener, and is shared read-only afterwards. Building it checks that the
//! model root exists, creates the output directory and loads the model; any
//! failure aborts startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::{
    DeviceMap, Error, InferenceOutput, InferenceParams, Loader, ModelConfig, Result, VideoModel,
};

pub struct ModelContext {
    config: ModelConfig,
    neg_prompt: Option<String>,
    cfg_scale: f64,
    batch_size: usize,
    output_dir: PathBuf,
    model: Arc<dyn VideoModel>,
}

impl ModelContext {
    /// Builds the context and loads the model through `L`.
    pub async fn load<L: Loader>(config: ModelConfig, device_map: DeviceMap) -> Result<Self> {
        let output_dir = prepare(&config)?;

        info!(
            model_base = %config.model_base.display(),
            device = %device_map,
            "Loading model"
        );
        let started = Instant::now();
        let model = L::load(&config, device_map)
            .await
            .map_err(|e| Error::Configuration(format!("failed to load model: {e:#}")))?;
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Model loaded");

        Ok(Self::assemble(config, output_dir, Arc::new(model)))
    }

    /// Builds the context around a model produced by `load`, which only runs
    /// once the model root and output directory are in place.
    pub fn build<F>(config: ModelConfig, load: F) -> Result<Self>
    where
        F: FnOnce(&ModelConfig) -> anyhow::Result<Arc<dyn VideoModel>>,
    {
        let output_dir = prepare(&config)?;
        let model = load(&config)
            .map_err(|e| Error::Configuration(format!("failed to load model: {e:#}")))?;
        Ok(Self::assemble(config, output_dir, model))
    }

    fn assemble(
        config: ModelConfig,
        output_dir: PathBuf,
        model: Arc<dyn VideoModel>,
    ) -> Self {
        Self {
            neg_prompt: config.neg_prompt.clone(),
            cfg_scale: config.cfg_scale,
            batch_size: config.batch_size,
            config,
            output_dir,
            model,
        }
    }

    pub fn predict(&self, params: &InferenceParams) -> anyhow::Result<InferenceOutput> {
        self.model.predict(params)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn neg_prompt(&self) -> Option<&str> {
        self.neg_prompt.as_deref()
    }

    pub fn cfg_scale(&self) -> f64 {
        self.cfg_scale
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Checks the model root and creates the output directory.
fn prepare(config: &ModelConfig) -> Result<PathBuf> {
    if !config.model_base.exists() {
        return Err(Error::Configuration(format!(
            "`model_base` does not exist: {}",
            config.model_base.display()
        )));
    }

    let output_dir = config.output_dir();
    std::fs::create_dir_all(&output_dir)?;
    info!(output_dir = %output_dir.display(), "Output directory ready");

    Ok(output_dir)
}
