use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Weight precision the sampler runs the transformer in.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    #[default]
    Bf16,
}

impl Precision {
    pub fn as_arg(&self) -> String {
        // Unit variants always serialize.
        serde_plain::to_string(self).unwrap_or_default()
    }
}

impl std::str::FromStr for Precision {
    type Err = serde_plain::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_plain::from_str(s)
    }
}

/// Static configuration resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Root directory holding the model weights. Must exist.
    pub model_base: PathBuf,
    /// Transformer weights, if they live outside the model root.
    pub dit_weight: Option<PathBuf>,
    pub neg_prompt: Option<String>,
    pub cfg_scale: f64,
    pub batch_size: usize,
    pub save_path: PathBuf,
    pub save_path_suffix: String,
    pub precision: Precision,
    /// Only the primary writer persists artifacts when the model runs replicated.
    pub primary_writer: bool,
    pub sampler_program: String,
    pub sampler_script: PathBuf,
    pub ffmpeg: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_base: PathBuf::from("ckpts"),
            dit_weight: None,
            neg_prompt: None,
            cfg_scale: 1.0,
            batch_size: 1,
            save_path: PathBuf::from("./results"),
            save_path_suffix: String::new(),
            precision: Precision::default(),
            primary_writer: true,
            sampler_program: "python3".to_string(),
            sampler_script: PathBuf::from("scripts/sample_video.py"),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl ModelConfig {
    /// `save_path`, or `{save_path}_{save_path_suffix}` when a suffix is set.
    pub fn output_dir(&self) -> PathBuf {
        if self.save_path_suffix.is_empty() {
            self.save_path.clone()
        } else {
            let mut dir = self.save_path.clone().into_os_string();
            dir.push("_");
            dir.push(&self.save_path_suffix);
            PathBuf::from(dir)
        }
    }
}
