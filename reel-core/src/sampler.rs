//! Video model backed by a long-running sampler process.
//!
//! The sampler is started once at load time and keeps the weights resident.
//! Requests and replies are single JSON lines over its stdin/stdout. A reply
//! names a safetensors file holding a `samples` tensor `(N, C, T, H, W)` with
//! `seeds` and `prompts` JSON arrays in its metadata.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use candle_core::{Device, IndexOp};
use safetensors::SafeTensors;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{DeviceMap, InferenceOutput, InferenceParams, Loader, ModelConfig, VideoModel};

#[derive(Debug, Deserialize)]
struct SamplerReply {
    status: Option<String>,
    output: Option<PathBuf>,
    error: Option<String>,
}

struct SamplerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SamplerProcess {
    fn read_reply(&mut self) -> Result<SamplerReply> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                anyhow::bail!("sampler process exited");
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            // Samplers tend to print progress bars and banners; only JSON
            // objects are replies.
            if !trimmed.starts_with('{') {
                debug!(line = trimmed, "sampler");
                continue;
            }
            return serde_json::from_str(trimmed)
                .with_context(|| format!("malformed sampler reply: {trimmed}"));
        }
    }

    fn exchange(&mut self, request: &str) -> Result<SamplerReply> {
        writeln!(self.stdin, "{request}").context("failed to send request to sampler")?;
        self.stdin.flush()?;
        self.read_reply()
    }

    fn terminate(&mut self) {
        warn!(pid = self.child.id(), "Stopping sampler after a protocol error");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for SamplerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct SamplerModel {
    process: Mutex<SamplerProcess>,
}

impl SamplerModel {
    /// Starts the sampler and blocks until it reports ready.
    pub fn spawn(config: &ModelConfig, device_map: DeviceMap) -> Result<Self> {
        if let Some(dit_weight) = &config.dit_weight {
            if !dit_weight.exists() {
                anyhow::bail!("`dit_weight` does not exist: {}", dit_weight.display());
            }
        }
        if !config.sampler_script.exists() {
            anyhow::bail!(
                "sampler script does not exist: {}",
                config.sampler_script.display()
            );
        }

        let mut command = Command::new(&config.sampler_program);
        command
            .arg(&config.sampler_script)
            .arg("--model-base")
            .arg(&config.model_base)
            .args(["--precision", &config.precision.as_arg()])
            .args(["--device", &device_map.to_string()]);
        if let Some(dit_weight) = &config.dit_weight {
            command.arg("--dit-weight").arg(dit_weight);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to start `{}`", config.sampler_program))?;
        let stdin = child.stdin.take().context("sampler stdin unavailable")?;
        let stdout = child.stdout.take().context("sampler stdout unavailable")?;

        let mut process = SamplerProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        };

        let reply = process
            .read_reply()
            .context("sampler did not become ready")?;
        if let Some(error) = reply.error {
            anyhow::bail!("sampler failed to load: {error}");
        }
        if reply.status.as_deref() != Some("ready") {
            anyhow::bail!("unexpected sampler handshake: {reply:?}");
        }
        info!(pid = process.child.id(), "Sampler ready");

        Ok(Self {
            process: Mutex::new(process),
        })
    }
}

impl VideoModel for SamplerModel {
    fn predict(&self, params: &InferenceParams) -> Result<InferenceOutput> {
        let mut process = self
            .process
            .lock()
            .map_err(|_| anyhow!("sampler lock poisoned"))?;
        if let Some(status) = process.child.try_wait()? {
            anyhow::bail!("sampler process is not running ({status})");
        }

        let request = serde_json::to_string(params)?;
        let reply = match process.exchange(&request) {
            Ok(reply) => reply,
            Err(e) => {
                // Replies can no longer be paired with requests.
                process.terminate();
                return Err(e);
            }
        };
        if let Some(error) = reply.error {
            anyhow::bail!("sampler: {error}");
        }
        let path = reply.output.context("sampler reply carried no output")?;

        let output = read_output(&path);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove sampler output");
        }
        output
    }
}

pub struct SamplerLoader;

impl Loader for SamplerLoader {
    type Model = SamplerModel;

    async fn load(config: &ModelConfig, device_map: DeviceMap) -> Result<Self::Model> {
        let config = config.clone();
        tokio::task::spawn_blocking(move || SamplerModel::spawn(&config, device_map)).await?
    }
}

fn read_output(path: &Path) -> Result<InferenceOutput> {
    let buffer = std::fs::read(path)
        .with_context(|| format!("failed to read sampler output {}", path.display()))?;

    let (_, metadata) = SafeTensors::read_metadata(&buffer)?;
    let info = metadata
        .metadata()
        .as_ref()
        .context("sampler output carries no metadata")?;
    let seeds: Vec<i64> = serde_json::from_str(info.get("seeds").context("missing `seeds`")?)
        .context("invalid `seeds` metadata")?;
    let prompts: Vec<String> =
        serde_json::from_str(info.get("prompts").context("missing `prompts`")?)
            .context("invalid `prompts` metadata")?;

    let tensors = candle_core::safetensors::load_buffer(&buffer, &Device::Cpu)?;
    let batch = tensors
        .get("samples")
        .context("sampler output has no `samples` tensor")?;
    let samples = (0..batch.dim(0)?)
        .map(|i| batch.i(i))
        .collect::<candle_core::Result<Vec<_>>>()?;

    Ok(InferenceOutput::new(samples, seeds, prompts)?)
}
