//! Turns one generation request into one inference call and its artifacts.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::{
    ArtifactWriter, Error, GenerationRequest, GenerationResult, InferenceParams, ModelContext,
    Result, VideoEncoder,
};

pub struct RequestOrchestrator {
    context: Arc<ModelContext>,
    writer: ArtifactWriter,
    /// Single slot: the model is never driven by two requests at once.
    gate: Arc<Semaphore>,
}

impl RequestOrchestrator {
    pub fn new(context: Arc<ModelContext>, encoder: Arc<dyn VideoEncoder>) -> Self {
        let writer = ArtifactWriter::new(
            context.output_dir(),
            context.config().primary_writer,
            encoder,
        );
        Self {
            context,
            writer,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    /// Negative prompt, guidance scale and batch size come from the context.
    /// The request's own `cfg_scale` is not forwarded.
    pub fn merge_params(&self, request: &GenerationRequest) -> InferenceParams {
        let [height, width] = request.video_size;
        InferenceParams {
            prompt: request.prompt.clone(),
            height,
            width,
            video_length: request.video_length,
            seed: request.seed,
            negative_prompt: self.context.neg_prompt().map(str::to_string),
            infer_steps: request.infer_steps,
            guidance_scale: self.context.cfg_scale(),
            num_videos_per_prompt: request.num_videos,
            flow_shift: request.flow_shift,
            batch_size: self.context.batch_size(),
            embedded_guidance_scale: request.embedded_cfg_scale,
        }
    }

    pub async fn generate_video(&self, request: GenerationRequest) -> Result<GenerationResult> {
        let params = self.merge_params(&request);
        if request.cfg_scale != params.guidance_scale {
            debug!(
                requested = request.cfg_scale,
                used = params.guidance_scale,
                "Request cfg_scale ignored, using the configured guidance scale"
            );
        }

        // The permit moves into the blocking task so it is held until the
        // model call returns, even if the caller goes away.
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Inference("inference gate closed".to_string()))?;
        let context = self.context.clone();
        let writer = self.writer.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run(&context, &writer, &params)
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Inference task panicked");
            Error::Inference(format!("inference task failed: {e}"))
        })?
    }
}

fn run(
    context: &ModelContext,
    writer: &ArtifactWriter,
    params: &InferenceParams,
) -> Result<GenerationResult> {
    let output = context.predict(params).map_err(|e| {
        error!(error = %format!("{e:#}"), "Error during video generation");
        Error::Inference(format!("{e:#}"))
    })?;
    if output.len() != params.num_videos_per_prompt {
        info!(
            requested = params.num_videos_per_prompt,
            produced = output.len(),
            "Model produced a different number of videos than requested"
        );
    }

    writer.persist(&output).inspect_err(|e| {
        error!(error = %e, "Error while saving generated videos");
    })
}
