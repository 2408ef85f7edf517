//! Asset reference resolution.
//!
//! Bundles refer to audio and image assets by opaque ids; the module
//! definition ships a resolved list mapping ids to URLs. Unresolved ids
//! degrade to "no media" so playback and rendering can proceed without the
//! asset instead of failing the attempt.

use crate::module::model::ResolvedAsset;
use std::collections::HashMap;

/// Well-known id of the cue tone played before each recording window.
pub const CUE_TONE_ASSET: &str = "beep-sound";

/// Read-only id → URL lookup built once from the module definition.
#[derive(Debug, Clone, Default)]
pub struct AssetResolver {
    urls: HashMap<String, String>,
}

impl AssetResolver {
    pub fn new(resolved: &[ResolvedAsset]) -> Self {
        let mut urls = HashMap::new();
        for asset in resolved {
            if asset.kind == "url" {
                urls.insert(asset.id.clone(), asset.reference.clone());
            } else {
                tracing::warn!("Unsupported asset type '{}' for {}", asset.kind, asset.id);
            }
        }
        Self { urls }
    }

    /// Resolves an asset reference id to a URL, or `None` if unknown.
    pub fn resolve(&self, id: &str) -> Option<&str> {
        let url = self.urls.get(id).map(String::as_str);
        if url.is_none() {
            tracing::warn!("Asset reference not found: {id}");
        }
        url
    }

    /// The cue tone URL, if the module ships one.
    pub fn cue_tone(&self) -> Option<&str> {
        self.urls.get(CUE_TONE_ASSET).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_url_assets_and_degrades_on_missing() {
        let resolver = AssetResolver::new(&[
            ResolvedAsset {
                id: "audio-1".to_string(),
                kind: "url".to_string(),
                reference: "https://cdn.example/a1.mp3".to_string(),
            },
            ResolvedAsset {
                id: "blob-1".to_string(),
                kind: "s3".to_string(),
                reference: "bucket/key".to_string(),
            },
        ]);
        assert_eq!(resolver.resolve("audio-1"), Some("https://cdn.example/a1.mp3"));
        // Unsupported type and unknown id both degrade to no media.
        assert_eq!(resolver.resolve("blob-1"), None);
        assert_eq!(resolver.resolve("nope"), None);
        assert_eq!(resolver.cue_tone(), None);
    }
}
