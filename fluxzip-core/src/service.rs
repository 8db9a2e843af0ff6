use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;

use crate::{
    build_archive, prepare_prompt, Error, GenerateRequest, ImageGenerator, PromptTokenizer,
    Result, CLIP_TOKEN_LIMIT,
};

/// Turns a [`GenerateRequest`] into a batch of images. Built once at startup.
pub struct ImageService {
    generator: Arc<dyn ImageGenerator>,
    tokenizer: Arc<dyn PromptTokenizer>,
}

impl ImageService {
    pub fn new(generator: Arc<dyn ImageGenerator>, tokenizer: Arc<dyn PromptTokenizer>) -> Self {
        Self {
            generator,
            tokenizer,
        }
    }

    /// Generates `num_images` images with consecutive seeds, sequentially.
    ///
    /// Stops at the first failure; nothing generated before it is returned.
    pub fn generate(&self, request: &GenerateRequest) -> Result<Vec<DynamicImage>> {
        request.validate()?;

        let prompt = prepare_prompt(self.tokenizer.as_ref(), &request.prompt, CLIP_TOKEN_LIMIT)?;

        let mut images = Vec::with_capacity(request.num_images);
        for seed in request.seeds() {
            let start = Instant::now();
            let img = self
                .generator
                .generate(&request.for_seed(&prompt.text, seed))
                .map_err(|source| Error::Generation { seed, source })?;
            tracing::info!(
                seed,
                image = images.len() + 1,
                of = request.num_images,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "generated image"
            );
            images.push(img);
        }
        Ok(images)
    }

    /// Runs [`ImageService::generate`] and packs the result into a zip archive.
    pub fn generate_archive(&self, request: &GenerateRequest) -> Result<Vec<u8>> {
        let images = self.generate(request)?;
        build_archive(&images)
    }
}
