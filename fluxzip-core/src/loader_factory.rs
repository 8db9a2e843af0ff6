use anyhow::{anyhow, Result};
use hf_hub::api::tokio::Api;

use crate::{DeviceMap, FluxLoader, ImageGenerator, LoadOptions, Loader};
use std::sync::Arc;

use crate::flux;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
    Flux(flux::FluxVariant),
}

impl ModelVariant {
    /// Detect model variant from a hub model id
    pub fn from_name(model_name: &str) -> Option<Self> {
        let name_upper = model_name.to_uppercase();

        if name_upper.contains("FLUX") {
            Some(ModelVariant::Flux(if name_upper.contains("DEV") {
                flux::FluxVariant::Dev
            } else {
                flux::FluxVariant::Schnell
            }))
        } else {
            None
        }
    }
}

/// Load a model based on its hub id, picking the loader from the name
pub async fn load_model(
    model_name: &str,
    api: Api,
    device_map: DeviceMap,
    options: LoadOptions,
) -> Result<Arc<dyn ImageGenerator>> {
    let model_variant = ModelVariant::from_name(model_name)
        .ok_or_else(|| anyhow!("Unsupported model: {}", model_name))?;

    tracing::info!(
        model = model_name,
        variant = ?model_variant,
        ?device_map,
        width = options.width,
        height = options.height,
        "Loading model"
    );

    match model_variant {
        ModelVariant::Flux(_) => {
            let model = FluxLoader::load(model_variant, api, device_map, options).await?;
            Ok(Arc::new(model))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux::FluxVariant;

    #[test]
    fn detects_flux_variants() {
        assert_eq!(
            ModelVariant::from_name("black-forest-labs/FLUX.1-schnell"),
            Some(ModelVariant::Flux(FluxVariant::Schnell))
        );
        assert_eq!(
            ModelVariant::from_name("black-forest-labs/FLUX.1-dev"),
            Some(ModelVariant::Flux(FluxVariant::Dev))
        );
        assert_eq!(
            ModelVariant::from_name("someone/flux-finetune"),
            Some(ModelVariant::Flux(FluxVariant::Schnell))
        );
        assert_eq!(
            ModelVariant::from_name("stabilityai/stable-diffusion-2-1"),
            None
        );
    }
}
