//! Naming and writing of generated videos.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info};

use crate::{Error, InferenceOutput, Result, VideoEncoder};

pub const OUTPUT_FPS: u32 = 24;
pub const MAX_PROMPT_CHARS: usize = 100;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// `<timestamp>_seed<seed>_<prompt>.mp4`, where the prompt is cut to its
/// first 100 characters and then stripped of `/`.
pub fn artifact_file_name(timestamp: &str, seed: i64, prompt: &str) -> String {
    let prompt: String = prompt
        .chars()
        .take(MAX_PROMPT_CHARS)
        .filter(|c| *c != '/')
        .collect();
    format!("{timestamp}_seed{seed}_{prompt}.mp4")
}

/// One video written to disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedArtifact {
    pub path: PathBuf,
    pub seed: i64,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub status: String,
    /// Path of the last video written.
    pub output_path: Option<PathBuf>,
    /// Every video written, in output order.
    pub output_paths: Vec<PathBuf>,
}

impl GenerationResult {
    fn done(artifacts: &[PersistedArtifact]) -> Self {
        let output_paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        Self {
            status: "Done".to_string(),
            output_path: output_paths.last().cloned(),
            output_paths,
        }
    }
}

#[derive(Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    primary_writer: bool,
    encoder: Arc<dyn VideoEncoder>,
}

impl ArtifactWriter {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        primary_writer: bool,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            primary_writer,
            encoder,
        }
    }

    /// Writes every sample and reports the result. Writes stop at the first
    /// failure; files already written stay on disk.
    pub fn persist(&self, output: &InferenceOutput) -> Result<GenerationResult> {
        if !self.primary_writer {
            debug!(samples = output.len(), "Not the primary writer, skipping persistence");
            return Ok(GenerationResult::done(&[]));
        }
        if output.is_empty() {
            return Err(Error::Persistence("model produced no samples".to_string()));
        }

        let artifacts = self.write_all(output)?;
        Ok(GenerationResult::done(&artifacts))
    }

    fn write_all(&self, output: &InferenceOutput) -> Result<Vec<PersistedArtifact>> {
        let mut artifacts = Vec::with_capacity(output.len());
        for (sample, seed, prompt) in output.iter() {
            let sample = sample
                .unsqueeze(0)
                .map_err(|e| Error::Persistence(e.to_string()))?;
            let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
            let path = self
                .output_dir
                .join(artifact_file_name(&timestamp, seed, prompt));

            self.encoder
                .encode(&sample, &path, OUTPUT_FPS)
                .map_err(|e| Error::Persistence(format!("{}: {e:#}", path.display())))?;

            let artifact = PersistedArtifact {
                path,
                seed,
                prompt: prompt.to_string(),
            };
            info!(
                path = %artifact.path.display(),
                seed = artifact.seed,
                prompt = %artifact.prompt,
                "Sample saved"
            );
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Mutex<Vec<(Vec<usize>, PathBuf, u32)>>,
        fail_on: Option<usize>,
    }

    impl VideoEncoder for RecordingEncoder {
        fn encode(&self, video: &Tensor, path: &Path, fps: u32) -> anyhow::Result<()> {
            let mut calls = self.calls.lock().unwrap();
            if self.fail_on == Some(calls.len()) {
                anyhow::bail!("disk full");
            }
            std::fs::write(path, b"mp4")?;
            calls.push((video.dims().to_vec(), path.to_path_buf(), fps));
            Ok(())
        }
    }

    fn output(seeds: &[i64], prompt: &str) -> InferenceOutput {
        let samples = seeds
            .iter()
            .map(|_| Tensor::zeros((3, 2, 4, 4), DType::F32, &Device::Cpu).unwrap())
            .collect();
        let prompts = seeds.iter().map(|_| prompt.to_string()).collect();
        InferenceOutput::new(samples, seeds.to_vec(), prompts).unwrap()
    }

    #[test]
    fn file_name_is_a_pure_function() {
        let a = artifact_file_name("2024-01-01-00:00:00", 42, "a cat");
        let b = artifact_file_name("2024-01-01-00:00:00", 42, "a cat");
        assert_eq!(a, b);
        assert_eq!(a, "2024-01-01-00:00:00_seed42_a cat.mp4");
    }

    #[test]
    fn file_name_truncates_then_strips_slashes() {
        let long = "x".repeat(150);
        let name = artifact_file_name("t", 1, &long);
        assert_eq!(name, format!("t_seed1_{}.mp4", "x".repeat(100)));

        let name = artifact_file_name("t", 1, "cats/dogs/birds");
        assert_eq!(name, "t_seed1_catsdogsbirds.mp4");

        // slashes past the cut do not count
        let prompt = format!("{}{}", "y".repeat(99), "//z");
        let name = artifact_file_name("t", 1, &prompt);
        assert_eq!(name, format!("t_seed1_{}.mp4", "y".repeat(99)));
    }

    #[test]
    fn file_name_keeps_negative_seeds() {
        let name = artifact_file_name("t", -1, "a cat");
        assert_eq!(name, "t_seed-1_a cat.mp4");
    }

    #[test]
    fn file_name_counts_characters_not_bytes() {
        let prompt = "é".repeat(120);
        let name = artifact_file_name("t", 3, &prompt);
        assert_eq!(name, format!("t_seed3_{}.mp4", "é".repeat(100)));
    }

    #[test]
    fn writes_each_sample_and_reports_the_last() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let writer = ArtifactWriter::new(dir.path(), true, encoder.clone());

        let result = writer.persist(&output(&[10, 11, 12], "a cat")).unwrap();

        assert_eq!(result.status, "Done");
        assert_eq!(result.output_paths.len(), 3);
        assert_eq!(result.output_path.as_ref(), result.output_paths.last());
        for (path, seed) in result.output_paths.iter().zip([10, 11, 12]) {
            assert!(path.exists());
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.ends_with(&format!("_seed{seed}_a cat.mp4")), "{name}");
        }

        let calls = encoder.calls.lock().unwrap();
        assert!(calls.iter().all(|(dims, _, fps)| dims == &[1, 3, 2, 4, 4] && *fps == 24));
    }

    #[test]
    fn secondary_writer_skips_writing() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder::default());
        let writer = ArtifactWriter::new(dir.path(), false, encoder.clone());

        let result = writer.persist(&output(&[1], "a cat")).unwrap();

        assert_eq!(result.status, "Done");
        assert_eq!(result.output_path, None);
        assert!(encoder.calls.lock().unwrap().is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_output_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), true, Arc::new(RecordingEncoder::default()));

        let err = writer.persist(&output(&[], "a cat")).unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
    }

    #[test]
    fn encoder_failure_stops_and_keeps_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(RecordingEncoder {
            fail_on: Some(1),
            ..Default::default()
        });
        let writer = ArtifactWriter::new(dir.path(), true, encoder.clone());

        let err = writer.persist(&output(&[1, 2, 3], "a cat")).unwrap_err();

        assert!(matches!(err, Error::Persistence(msg) if msg.contains("disk full")));
        assert_eq!(encoder.calls.lock().unwrap().len(), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
