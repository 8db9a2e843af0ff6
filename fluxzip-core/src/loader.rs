use std::future::Future;

use anyhow::Result;
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, ImageGenerator, ModelVariant};

/// Output size of every generated image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadOptions {
    pub width: usize,
    pub height: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
        }
    }
}

pub trait Loader {
    type Model: ImageGenerator;

    fn load(
        variant: ModelVariant,
        api: Api,
        device_map: DeviceMap,
        options: LoadOptions,
    ) -> impl Future<Output = Result<Self::Model>>
    where
        Self: Sized;
}
