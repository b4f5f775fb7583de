//! Built-in tool implementations for RustedLens.
//!
//! Two tools ship with the agent:
//! - `memory.get_all_memory` hands the whole conversation history back to
//!   the model as the next round's context.
//! - `image_service.generate_image` renders an illustration through the
//!   configured image backend.

pub mod generate_image;
pub mod get_all_memory;

use rustedlens_core::provider::ImageGenerator;
use rustedlens_core::tool::ToolRegistry;
use std::sync::Arc;

pub use generate_image::GenerateImageTool;
pub use get_all_memory::GetAllMemoryTool;

/// Create a registry holding every built-in tool.
pub fn default_registry(image_generator: Arc<dyn ImageGenerator>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(GetAllMemoryTool));
    registry.register(Arc::new(GenerateImageTool::new(image_generator)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rustedlens_core::provider::ImageGeneration;

    struct NoImages;

    #[async_trait]
    impl ImageGenerator for NoImages {
        fn name(&self) -> &str {
            "none"
        }
        async fn generate(&self, _prompt: &str) -> ImageGeneration {
            ImageGeneration::Images(vec![])
        }
    }

    #[test]
    fn default_registry_has_both_tools() {
        let registry = default_registry(Arc::new(NoImages));
        assert_eq!(registry.len(), 2);
        assert!(registry.get("memory", "get_all_memory").is_some());
        assert!(registry.get("image_service", "generate_image").is_some());

        let described = registry.describe();
        assert_eq!(described["image_service"]["generate_image"]["params"]["prompt"], "");
        assert!(
            described["memory"]["get_all_memory"]["params"]
                .as_object()
                .unwrap()
                .is_empty()
        );
    }
}
