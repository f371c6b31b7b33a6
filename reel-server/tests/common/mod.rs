use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use candle_core::{DType, Device, Tensor};
use http_body_util::BodyExt;
use reel_core::{
    InferenceOutput, InferenceParams, ModelConfig, ModelContext, RequestOrchestrator,
    VideoEncoder, VideoModel,
};
use reel_server::AppState;
use tower::ServiceExt;

/// Produces `num_videos_per_prompt` blank samples seeded from the request.
pub struct StubModel;

impl VideoModel for StubModel {
    fn predict(&self, params: &InferenceParams) -> anyhow::Result<InferenceOutput> {
        if params.height == 0 || params.width == 0 {
            anyhow::bail!("cannot sample a {}x{} video", params.height, params.width);
        }
        let n = params.num_videos_per_prompt;
        let samples = (0..n)
            .map(|_| Tensor::zeros((3, 2, 4, 4), DType::F32, &Device::Cpu))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let seeds = (0..n as i64).map(|i| params.seed + i).collect();
        Ok(InferenceOutput::new(
            samples,
            seeds,
            vec![params.prompt.clone(); n],
        )?)
    }
}

/// Writes a placeholder file instead of running ffmpeg.
pub struct StubEncoder;

impl VideoEncoder for StubEncoder {
    fn encode(&self, _video: &Tensor, path: &Path, _fps: u32) -> anyhow::Result<()> {
        std::fs::write(path, b"\x00\x00\x00\x18ftypmp42")?;
        Ok(())
    }
}

pub struct FailingEncoder;

impl VideoEncoder for FailingEncoder {
    fn encode(&self, _video: &Tensor, path: &Path, _fps: u32) -> anyhow::Result<()> {
        anyhow::bail!("no space left on device while writing {}", path.display())
    }
}

pub fn test_config(dir: &Path) -> ModelConfig {
    let model_base = dir.join("ckpts");
    std::fs::create_dir_all(&model_base).unwrap();
    ModelConfig {
        model_base,
        save_path: dir.join("results"),
        ..Default::default()
    }
}

pub fn build_test_app(dir: &Path, encoder: Arc<dyn VideoEncoder>) -> Router {
    let context = ModelContext::build(test_config(dir), |_| Ok(Arc::new(StubModel))).unwrap();
    let orchestrator = RequestOrchestrator::new(Arc::new(context), encoder);
    reel_server::router(AppState::new(orchestrator))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
