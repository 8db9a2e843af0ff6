use std::path::PathBuf;

use anyhow::{Context, Error, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Module, VarBuilder};
use candle_transformers::models::{
    clip::text_model::{self, ClipTextTransformer},
    flux::{
        autoencoder::{self, AutoEncoder},
        model::{self, Flux},
        sampling,
    },
    t5::{self, T5EncoderModel},
};
use hf_hub::api::tokio::{Api, ApiRepo};
use image::DynamicImage;
use parking_lot::Mutex;
use tokenizers::Tokenizer;

use crate::{
    fit_clip_window, seeded_noise, select_best_device, tensor_to_image, DeviceMap,
    GenerationRequest, ImageGenerator, LoadOptions, Loader, ModelVariant, CLIP_TOKEN_LIMIT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FluxVariant {
    Schnell,
    Dev,
}

impl FluxVariant {
    fn repo(self) -> &'static str {
        match self {
            Self::Schnell => "black-forest-labs/FLUX.1-schnell",
            Self::Dev => "black-forest-labs/FLUX.1-dev",
        }
    }

    fn weights(self) -> &'static str {
        match self {
            Self::Schnell => "flux1-schnell.safetensors",
            Self::Dev => "flux1-dev.safetensors",
        }
    }
}

pub struct FluxModel {
    variant: FluxVariant,
    device: Device,
    dtype: DType,
    width: usize,
    height: usize,
    t5_model: Mutex<T5EncoderModel>,
    t5_tokenizer: Tokenizer,
    clip_model: ClipTextTransformer,
    clip_tokenizer: Tokenizer,
    autoencoder: AutoEncoder,
    flux_model: Flux,
}

impl FluxModel {
    fn encode_t5(&self, prompt: &str, max_sequence_length: usize) -> Result<Tensor> {
        let mut tokens = self
            .t5_tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        tokens.resize(max_sequence_length, 0);
        let input_ids = Tensor::new(&*tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.t5_model.lock().forward(&input_ids)?)
    }

    fn encode_clip(&self, prompt: &str) -> Result<Tensor> {
        let tokens = self
            .clip_tokenizer
            .encode(prompt, true)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        // Begin/end markers can push a 77-token prompt past the position table.
        let tokens = fit_clip_window(tokens, CLIP_TOKEN_LIMIT);
        let input_ids = Tensor::new(&*tokens, &self.device)?.unsqueeze(0)?;
        Ok(self.clip_model.forward(&input_ids)?)
    }
}

impl ImageGenerator for FluxModel {
    fn generate(&self, request: &GenerationRequest) -> Result<DynamicImage> {
        let noise_img = seeded_noise(request.seed, self.height, self.width, &self.device)?
            .to_dtype(self.dtype)?;

        let t5_emb = self.encode_t5(&request.prompt, request.max_sequence_length)?;
        let clip_emb = self.encode_clip(&request.prompt)?;

        let state = sampling::State::new(&t5_emb, &clip_emb, &noise_img)?;
        let timesteps = match self.variant {
            FluxVariant::Schnell => sampling::get_schedule(request.num_inference_steps, None),
            FluxVariant::Dev => sampling::get_schedule(
                request.num_inference_steps,
                Some((state.img.dim(1)?, 0.5, 1.15)),
            ),
        };

        let latent_img = sampling::denoise(
            &self.flux_model,
            &state.img,
            &state.img_ids,
            &state.txt,
            &state.txt_ids,
            &state.vec,
            &timesteps,
            request.guidance_scale,
        )?;
        let unpacked = sampling::unpack(&latent_img, self.height, self.width)?;
        tracing::debug!(seed = request.seed, "denoised latent image");

        let decoded = self.autoencoder.decode(&unpacked)?;

        let img = ((decoded.clamp(-1f32, 1f32)? + 1.0)? * 127.5)?.to_dtype(DType::U8)?;
        tensor_to_image(&img.i(0)?)
    }
}

fn var_builder(file: PathBuf, dtype: DType, device: &Device) -> Result<VarBuilder<'static>> {
    // SAFETY: the hub cache files are not modified while mapped.
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[file], dtype, device)? };
    Ok(vb)
}

async fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    repo.get(filename)
        .await
        .with_context(|| format!("failed to get {filename}"))
}

pub struct FluxLoader;

impl Loader for FluxLoader {
    type Model = FluxModel;

    async fn load(
        variant: ModelVariant,
        api: Api,
        device_map: DeviceMap,
        options: LoadOptions,
    ) -> Result<Self::Model> {
        let ModelVariant::Flux(variant) = variant;

        let device = select_best_device(device_map).context("failed to set up device")?;
        let dtype = device.bf16_default_to_f32();

        // --- T5 encoder and tokenizer ---
        let t5_repo = api.repo(hf_hub::Repo::with_revision(
            "google/t5-v1_1-xxl".to_string(),
            hf_hub::RepoType::Model,
            "refs/pr/2".to_string(),
        ));
        let t5_vb = var_builder(fetch(&t5_repo, "model.safetensors").await?, dtype, &device)
            .context("failed to build T5 var builder")?;
        let config_str = std::fs::read_to_string(fetch(&t5_repo, "config.json").await?)
            .context("failed to read T5 config")?;
        let t5_config: t5::Config =
            serde_json::from_str(&config_str).context("failed to parse T5 config")?;
        let t5_model =
            T5EncoderModel::load(t5_vb, &t5_config).context("failed to load T5 model")?;
        let t5_tokenizer_file = fetch(
            &api.model("lmz/mt5-tokenizers".to_string()),
            "t5-v1_1-xxl.tokenizer.json",
        )
        .await?;
        let t5_tokenizer = Tokenizer::from_file(t5_tokenizer_file)
            .map_err(Error::msg)
            .context("failed to load T5 tokenizer")?;
        tracing::info!("loaded T5 encoder");

        // --- CLIP text encoder and tokenizer ---
        let clip_repo = api.repo(hf_hub::Repo::model(
            "openai/clip-vit-large-patch14".to_string(),
        ));
        let clip_vb = var_builder(fetch(&clip_repo, "model.safetensors").await?, dtype, &device)
            .context("failed to build CLIP var builder")?;
        let clip_config = text_model::ClipTextConfig {
            vocab_size: 49408,
            projection_dim: 768,
            activation: text_model::Activation::QuickGelu,
            intermediate_size: 3072,
            embed_dim: 768,
            max_position_embeddings: CLIP_TOKEN_LIMIT,
            pad_with: None,
            num_hidden_layers: 12,
            num_attention_heads: 12,
        };
        let clip_model = ClipTextTransformer::new(clip_vb.pp("text_model"), &clip_config)
            .context("failed to load CLIP model")?;
        let clip_tokenizer = Tokenizer::from_file(fetch(&clip_repo, "tokenizer.json").await?)
            .map_err(Error::msg)
            .context("failed to load CLIP tokenizer")?;
        tracing::info!("loaded CLIP encoder");

        // --- Autoencoder and transformer ---
        let bf_repo = api.repo(hf_hub::Repo::model(variant.repo().to_string()));
        let autoencoder_vb = var_builder(fetch(&bf_repo, "ae.safetensors").await?, dtype, &device)
            .context("failed to build autoencoder var builder")?;
        let autoencoder_config = match variant {
            FluxVariant::Schnell => autoencoder::Config::schnell(),
            FluxVariant::Dev => autoencoder::Config::dev(),
        };
        let autoencoder = AutoEncoder::new(&autoencoder_config, autoencoder_vb)
            .context("failed to load autoencoder")?;

        let flux_vb = var_builder(fetch(&bf_repo, variant.weights()).await?, dtype, &device)
            .context("failed to build flux var builder")?;
        let flux_config = match variant {
            FluxVariant::Schnell => model::Config::schnell(),
            FluxVariant::Dev => model::Config::dev(),
        };
        let flux_model = Flux::new(&flux_config, flux_vb).context("failed to load flux model")?;
        tracing::info!(repo = variant.repo(), ?dtype, "loaded flux model");

        Ok(FluxModel {
            variant,
            device,
            dtype,
            width: options.width,
            height: options.height,
            t5_model: Mutex::new(t5_model),
            t5_tokenizer,
            clip_model,
            clip_tokenizer,
            autoencoder,
            flux_model,
        })
    }
}
