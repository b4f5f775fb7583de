//! Provider routing: picks the backend for a model name from config.

use crate::image_api::{HttpImageGenerator, UnavailableImageGenerator};
use crate::openai_compat::OpenAiCompatVlm;
use rustedlens_config::AppConfig;
use rustedlens_core::error::ProviderError;
use rustedlens_core::provider::{ImageGenerator, TextGenerator};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Where to send requests for a vision-language model.
#[derive(Debug, Clone, PartialEq)]
pub struct VlmEndpoint {
    /// Short provider label for logs
    pub provider: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Set when the endpoint came from an explicit `[providers.<model>]` entry
    pub explicit: bool,
}

/// Resolve the endpoint for a model name.
///
/// An explicit `[providers.<model>]` entry wins. Otherwise Qwen-family names
/// (`qwen`, `qvq`) go to DashScope and everything else to OpenAI.
pub fn resolve_vlm_endpoint(model_name: &str, config: &AppConfig) -> VlmEndpoint {
    let provider_config = config.providers.get(model_name);
    let api_key = provider_config
        .and_then(|p| p.api_key.clone())
        .or_else(|| config.api_key.clone());

    if let Some(api_url) = provider_config.and_then(|p| p.api_url.clone()) {
        return VlmEndpoint {
            provider: "custom".into(),
            base_url: api_url,
            api_key,
            explicit: true,
        };
    }

    let lower = model_name.to_lowercase();
    let (provider, base_url) = if lower.contains("qwen") || lower.contains("qvq") {
        ("dashscope", DASHSCOPE_BASE_URL)
    } else {
        ("openai", OPENAI_BASE_URL)
    };

    VlmEndpoint {
        provider: provider.into(),
        base_url: base_url.into(),
        api_key,
        explicit: provider_config.is_some(),
    }
}

/// Build the text generator for the configured VLM model.
///
/// Public endpoints need an API key; an explicit endpoint may run without
/// one (local servers).
pub fn build_text_generator(
    model_name: &str,
    config: &AppConfig,
) -> Result<Arc<dyn TextGenerator>, ProviderError> {
    let endpoint = resolve_vlm_endpoint(model_name, config);
    let api_key = match endpoint.api_key {
        Some(key) => key,
        None if endpoint.explicit => String::new(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "No API key for model '{model_name}'. Set VLM_API_KEY or api_key in config.toml"
            )));
        }
    };

    debug!(
        model = model_name,
        provider = %endpoint.provider,
        base_url = %endpoint.base_url,
        "Resolved VLM endpoint"
    );

    Ok(Arc::new(OpenAiCompatVlm::new(
        endpoint.provider,
        endpoint.base_url,
        api_key,
        model_name,
    )))
}

/// Environment variable holding an image model's bearer token,
/// e.g. `Stable Diffusion 3` → `STABLE_DIFFUSION_3_API_TOKEN`.
pub fn image_token_env(model_name: &str) -> String {
    let stem: String = model_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{stem}_API_TOKEN")
}

/// Build the image generator for a model name.
///
/// The URL comes from `[image.models]`; a model without one gets a
/// generator whose every call fails, so text-only runs still work.
pub fn build_image_generator(model_name: &str, config: &AppConfig) -> Arc<dyn ImageGenerator> {
    let Some(url) = config.image.models.get(model_name) else {
        warn!(
            model = model_name,
            "No image endpoint configured; image generation disabled"
        );
        return Arc::new(UnavailableImageGenerator::new(
            model_name,
            format!("No endpoint configured for image model '{model_name}'"),
        ));
    };

    let token = std::env::var(image_token_env(model_name))
        .ok()
        .or_else(|| config.image.api_token.clone());

    Arc::new(HttpImageGenerator::with_timeout(
        model_name,
        url.clone(),
        token,
        Duration::from_secs(config.image.timeout_secs),
    ))
}
