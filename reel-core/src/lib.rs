pub mod config;
pub mod context;
pub mod device_map;
pub mod encode;
pub mod error;
pub mod loader;
pub mod orchestrator;
pub mod persist;
mod sampler;
mod util;

pub use config::*;
pub use context::ModelContext;
pub use device_map::*;
pub use encode::{FfmpegEncoder, VideoEncoder};
pub use error::{Error, Result};
pub use loader::*;
pub use orchestrator::RequestOrchestrator;
pub use persist::{artifact_file_name, ArtifactWriter, GenerationResult, PersistedArtifact};
pub use sampler::{SamplerLoader, SamplerModel};
pub(crate) use util::*;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Body of `POST /generate-video`. Every field is required.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// `[height, width]`
    pub video_size: [usize; 2],
    pub video_length: usize,
    pub seed: i64,
    pub infer_steps: usize,
    pub cfg_scale: f64,
    pub num_videos: usize,
    pub flow_shift: f64,
    pub embedded_cfg_scale: f64,
}

/// Parameters handed to the model for a single inference call: the request
/// merged with the defaults held by [`ModelContext`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub prompt: String,
    pub height: usize,
    pub width: usize,
    pub video_length: usize,
    pub seed: i64,
    pub negative_prompt: Option<String>,
    pub infer_steps: usize,
    pub guidance_scale: f64,
    pub num_videos_per_prompt: usize,
    pub flow_shift: f64,
    pub batch_size: usize,
    pub embedded_guidance_scale: f64,
}

/// What the model hands back from one inference call. Index `i` of each
/// sequence describes the same video.
#[derive(Debug, Clone)]
pub struct InferenceOutput {
    samples: Vec<Tensor>,
    seeds: Vec<i64>,
    prompts: Vec<String>,
}

impl InferenceOutput {
    pub fn new(samples: Vec<Tensor>, seeds: Vec<i64>, prompts: Vec<String>) -> Result<Self> {
        if samples.len() != seeds.len() || samples.len() != prompts.len() {
            return Err(Error::Inference(format!(
                "model returned {} samples, {} seeds and {} prompts",
                samples.len(),
                seeds.len(),
                prompts.len()
            )));
        }
        Ok(Self {
            samples,
            seeds,
            prompts,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Tensor] {
        &self.samples
    }

    pub fn seeds(&self) -> &[i64] {
        &self.seeds
    }

    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tensor, i64, &str)> {
        self.samples
            .iter()
            .zip(self.seeds.iter().copied())
            .zip(self.prompts.iter())
            .map(|((sample, seed), prompt)| (sample, seed, prompt.as_str()))
    }
}

/// A loaded text-to-video model. Implementations need not tolerate concurrent
/// calls; [`RequestOrchestrator`] serializes them.
pub trait VideoModel: Send + Sync {
    fn predict(&self, params: &InferenceParams) -> anyhow::Result<InferenceOutput>;
}
