use std::future::Future;

use anyhow::Result;

use crate::{DeviceMap, ModelConfig, VideoModel};

pub trait Loader {
    type Model: VideoModel + 'static;

    fn load(
        config: &ModelConfig,
        device_map: DeviceMap,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
