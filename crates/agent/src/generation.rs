//! Deadline-bounded text generation.

use futures::{Stream, StreamExt};
use rustedlens_core::error::ProviderError;
use rustedlens_core::image::ImageHandle;
use rustedlens_core::provider::TextGenerator;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Stream one generation, bounding the initial request and every wait for
/// the next chunk by `deadline`.
///
/// The first error ends the stream; nothing follows an `Err` item.
pub fn timed_generation(
    generator: Arc<dyn TextGenerator>,
    prompt: String,
    images: Vec<ImageHandle>,
    deadline: Duration,
) -> impl Stream<Item = Result<String, ProviderError>> + Send + 'static {
    async_stream::stream! {
        let mut chunks = match timeout(deadline, generator.generate_stream(&prompt, &images)).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                yield Err(e);
                return;
            }
            Err(_) => {
                yield Err(ProviderError::Timeout(format!(
                    "{} sent no response within {}s",
                    generator.name(),
                    deadline.as_secs()
                )));
                return;
            }
        };

        loop {
            match timeout(deadline, chunks.next()).await {
                Ok(Some(Ok(chunk))) => yield Ok(chunk),
                Ok(Some(Err(e))) => {
                    yield Err(e);
                    return;
                }
                Ok(None) => return,
                Err(_) => {
                    yield Err(ProviderError::Timeout(format!(
                        "{} stalled for {}s mid-stream",
                        generator.name(),
                        deadline.as_secs()
                    )));
                    return;
                }
            }
        }
    }
}
