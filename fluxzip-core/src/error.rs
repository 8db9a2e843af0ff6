use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: usize,
        max: usize,
        value: usize,
    },
    #[error("seed {seed} leaves no room for {num_images} consecutive seeds")]
    SeedOverflow { seed: u64, num_images: usize },
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("image generation failed for seed {seed}: {source:#}")]
    Generation {
        seed: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to encode {name}")]
    Png {
        name: String,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors caused by the caller's input rather than by the model or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::OutOfRange { .. } | Self::SeedOverflow { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
