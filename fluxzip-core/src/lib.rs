pub mod archive;
pub mod device_map;
pub mod error;
pub mod loader;
mod loader_factory;
pub mod prompt;
pub mod request;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod util;

mod flux;

pub use archive::*;
pub use device_map::*;
pub use error::*;
pub use flux::{FluxLoader, FluxModel, FluxVariant};
use image::DynamicImage;
pub use loader::*;
pub use loader_factory::*;
pub use prompt::*;
pub use request::*;
pub use service::*;
pub(crate) use util::*;

/// A text-to-image model behind a blocking call.
///
/// Implementations must be deterministic for a given [`GenerationRequest::seed`].
pub trait ImageGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> anyhow::Result<DynamicImage>;
}
