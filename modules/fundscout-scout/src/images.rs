//! Best-effort preview image resolution.
//!
//! A fully isolated failure domain: every URL in a batch is fetched
//! concurrently, a failed or image-less page yields nothing, and no outcome
//! here ever affects acceptance of the extracted record.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::traits::PageFetcher;

/// Concurrent fetches per batch.
const IMAGE_CONCURRENCY: usize = 8;

/// Resolve preview images for a batch of URLs in parallel. Returns a map of
/// url → image url for the subset that had one.
pub async fn resolve_images(
    fetcher: &dyn PageFetcher,
    urls: &[String],
) -> HashMap<String, String> {
    let results: Vec<(String, Option<String>)> = stream::iter(urls.iter().map(|url| {
        let url = url.clone();
        async move {
            let image = match fetcher.fetch(&url).await {
                Ok(page) => page
                    .og_image
                    .filter(|i| !i.is_empty())
                    .or_else(|| image_from_markdown(&page.markdown)),
                Err(e) => {
                    debug!(url = url.as_str(), error = %e, "Image fetch failed, skipping");
                    None
                }
            };
            (url, image)
        }
    }))
    .buffer_unordered(IMAGE_CONCURRENCY)
    .collect()
    .await;

    results
        .into_iter()
        .filter_map(|(url, image)| image.map(|i| (url, i)))
        .collect()
}

/// First absolute image URL referenced in the page markdown.
pub fn image_from_markdown(markdown: &str) -> Option<String> {
    let image_re = regex::Regex::new(r"!\[[^\]]*\]\((https?://[^)\s]+)\)").expect("valid regex");
    image_re
        .captures(markdown)
        .map(|cap| cap[1].to_string())
}
