//! Model backends for RustedLens.
//!
//! Text generation goes through [`OpenAiCompatVlm`]; image generation
//! through [`HttpImageGenerator`]. The [`router`] module maps configured
//! model names onto concrete backends.

pub mod image_api;
pub mod openai_compat;
pub mod router;

pub use image_api::{HttpImageGenerator, UnavailableImageGenerator};
pub use openai_compat::OpenAiCompatVlm;
pub use router::{build_image_generator, build_text_generator, resolve_vlm_endpoint};
