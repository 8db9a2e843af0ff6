//! In-process fakes for the model and tokenizer seams.

use anyhow::bail;
use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::Mutex;

use crate::{GenerationRequest, ImageGenerator, PromptTokenizer, Result};

/// Splits on whitespace and treats `<unk>` as the unknown marker.
pub struct WhitespaceTokenizer;

impl PromptTokenizer for WhitespaceTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(text.split_whitespace().map(str::to_string).collect())
    }

    fn tokens_to_text(&self, tokens: &[String]) -> Result<String> {
        Ok(tokens.join(" "))
    }

    fn unknown_token(&self) -> Option<&str> {
        Some("<unk>")
    }
}

/// Records every call and returns a 4x4 image whose red channel is the seed's low byte.
#[derive(Default)]
pub struct RecordingGenerator {
    calls: Mutex<Vec<GenerationRequest>>,
    fail_on_seed: Option<u64>,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(seed: u64) -> Self {
        Self {
            fail_on_seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().clone()
    }

    pub fn pixel_for(seed: u64) -> [u8; 3] {
        [seed as u8, 0, 255]
    }
}

impl ImageGenerator for RecordingGenerator {
    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<DynamicImage> {
        self.calls.lock().push(request.clone());
        if self.fail_on_seed == Some(request.seed) {
            bail!("simulated device failure");
        }
        let img = RgbImage::from_pixel(4, 4, Rgb(Self::pixel_for(request.seed)));
        Ok(DynamicImage::ImageRgb8(img))
    }
}
