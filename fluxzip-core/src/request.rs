use serde::{Deserialize, Serialize};

use crate::{Error, Result, CLIP_TOKEN_LIMIT};

pub const MIN_SEQUENCE_LENGTH: usize = 1;
pub const MAX_SEQUENCE_LENGTH: usize = CLIP_TOKEN_LIMIT;
pub const MIN_IMAGES: usize = 1;
pub const MAX_IMAGES: usize = 10;

/// Body of `POST /generate-image`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub guidance_scale: f64,
    #[serde(default = "default_steps")]
    pub num_inference_steps: usize,
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_num_images")]
    pub num_images: usize,
}

fn default_steps() -> usize {
    4
}

fn default_max_sequence_length() -> usize {
    MAX_SEQUENCE_LENGTH
}

fn default_num_images() -> usize {
    1
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            guidance_scale: 0.0,
            num_inference_steps: default_steps(),
            max_sequence_length: default_max_sequence_length(),
            seed: 0,
            num_images: default_num_images(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "max_sequence_length",
            self.max_sequence_length,
            MIN_SEQUENCE_LENGTH,
            MAX_SEQUENCE_LENGTH,
        )?;
        check_range("num_images", self.num_images, MIN_IMAGES, MAX_IMAGES)?;

        // The last image uses seed + num_images - 1.
        let span = self.num_images as u64 - 1;
        if self.seed.checked_add(span).is_none() {
            return Err(Error::SeedOverflow {
                seed: self.seed,
                num_images: self.num_images,
            });
        }
        Ok(())
    }

    /// Seeds for each image, in generation order. Call after `validate`.
    pub fn seeds(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.num_images as u64).map(move |offset| self.seed + offset)
    }

    /// Builds the per-image model call for `seed` with an already prepared prompt.
    pub fn for_seed(&self, prompt: &str, seed: u64) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.to_string(),
            guidance_scale: self.guidance_scale,
            num_inference_steps: self.num_inference_steps,
            max_sequence_length: self.max_sequence_length,
            seed,
        }
    }
}

fn check_range(field: &'static str, value: usize, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            field,
            min,
            max,
            value,
        })
    }
}

/// A single call into the diffusion model.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub guidance_scale: f64,
    pub num_inference_steps: usize,
    pub max_sequence_length: usize,
    pub seed: u64,
}
