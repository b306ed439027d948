//! Uploaded textures keyed by content source identity
//!
//! Entries hold a weak reference to their source and are destroyed by
//! [`TextureCache::prune`] once the source is dropped. Uploads happen only
//! when the caller reports the layer's dirty flag, the source is live, or the
//! plane count changed.

use std::rc::Weak;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::backend::{ImageData, RenderBackend, TextureId};
use crate::content::{ContentId, ContentRef, ContentSource};
use crate::error::UploadError;
use crate::geometry::PixelSize;

/// Texture shown in place of contents that failed to upload
const PLACEHOLDER_PIXEL: [u8; 4] = [0, 0, 0, 255];

pub type Planes = SmallVec<[TextureId; 2]>;

struct Entry {
    source: Weak<dyn ContentSource>,
    planes: Planes,
    /// False for textures borrowed from another layer or a render target
    owned: bool,
}

/// Result of resolving a content source to textures
#[derive(Debug, Default)]
pub struct TextureLookup {
    pub planes: Planes,
    /// The source was ready, so the caller may clear its dirty flag
    pub consumed: bool,
    pub error: Option<UploadError>,
}

impl TextureLookup {
    pub fn primary(&self) -> Option<TextureId> {
        self.planes.first().copied()
    }
}

/// Statistics for the texture cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    pub hits: u64,
    pub uploads: u64,
    pub failures: u64,
    pub entries: usize,
}

#[derive(Default)]
pub struct TextureCache {
    entries: FxHashMap<ContentId, Entry>,
    hits: u64,
    uploads: u64,
    failures: u64,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `content` to its textures, uploading when required.
    ///
    /// Never fails: an upload error leaves a 1x1 placeholder bound and is
    /// reported in [`TextureLookup::error`].
    pub fn textures_for(
        &mut self,
        backend: &mut dyn RenderBackend,
        content: &ContentRef,
        needs_update: bool,
    ) -> TextureLookup {
        let id = content.id();
        let plane_count = content.plane_count().max(1);
        let mut upload = needs_update || content.is_live();

        let reusable = self
            .entries
            .get(&id)
            .is_some_and(|e| e.planes.len() == plane_count && (e.owned || !upload));

        if !reusable {
            if let Some(old) = self.entries.remove(&id) {
                if old.owned {
                    for texture in old.planes {
                        backend.destroy_texture(texture);
                    }
                }
            }
            let mut planes = Planes::new();
            for plane in 0..plane_count {
                let label = format!("content {} plane {}", id.raw(), plane);
                match backend.create_texture(PixelSize::new(1, 1), &label) {
                    Ok(texture) => planes.push(texture),
                    Err(err) => {
                        tracing::error!("Failed to create texture for content {}: {}", id.raw(), err);
                        for texture in planes {
                            backend.destroy_texture(texture);
                        }
                        return TextureLookup {
                            error: Some(err.into()),
                            ..Default::default()
                        };
                    }
                }
            }
            tracing::debug!("Allocated {} texture plane(s) for content {}", plane_count, id.raw());
            self.entries.insert(
                id,
                Entry {
                    source: std::rc::Rc::downgrade(content),
                    planes,
                    owned: true,
                },
            );
            upload = true;
        } else {
            self.hits += 1;
        }

        let Some(entry) = self.entries.get(&id) else {
            return TextureLookup::default();
        };
        let planes = entry.planes.clone();

        if !upload {
            return TextureLookup {
                planes,
                consumed: true,
                error: None,
            };
        }
        if !content.is_ready() {
            return TextureLookup {
                planes,
                consumed: false,
                error: None,
            };
        }

        let result = match content.upload(backend, &planes) {
            Some(result) => result,
            None => content
                .pixels()
                .and_then(|image| Ok(backend.upload_texture(planes[0], &image)?)),
        };
        self.uploads += 1;

        let error = match result {
            Ok(()) => None,
            Err(err) => {
                self.failures += 1;
                tracing::error!("Upload failed for content {}: {}", id.raw(), err);
                if let Err(placeholder_err) =
                    backend.upload_texture(planes[0], &ImageData::solid(PLACEHOLDER_PIXEL))
                {
                    tracing::warn!("Placeholder upload failed: {}", placeholder_err);
                }
                Some(err)
            }
        };

        TextureLookup {
            planes,
            consumed: true,
            error,
        }
    }

    /// Display `planes` for `content` without uploading; the textures stay
    /// owned by whoever created them.
    pub fn alias(&mut self, backend: &mut dyn RenderBackend, content: &ContentRef, planes: &[TextureId]) {
        let entry = Entry {
            source: std::rc::Rc::downgrade(content),
            planes: planes.iter().copied().collect(),
            owned: false,
        };
        if let Some(old) = self.entries.insert(content.id(), entry) {
            if old.owned {
                for texture in old.planes {
                    backend.destroy_texture(texture);
                }
            }
        }
    }

    pub fn planes(&self, content: ContentId) -> Option<&[TextureId]> {
        self.entries.get(&content).map(|e| e.planes.as_slice())
    }

    /// Drop borrowed entries that point at `texture`, returning how many
    pub fn invalidate_texture(&mut self, texture: TextureId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.owned || !entry.planes.contains(&texture));
        before - self.entries.len()
    }

    /// Destroy entries whose content source no longer exists
    pub fn prune(&mut self, backend: &mut dyn RenderBackend) {
        self.entries.retain(|id, entry| {
            if entry.source.strong_count() > 0 {
                return true;
            }
            tracing::debug!("Releasing textures of dropped content {}", id.raw());
            if entry.owned {
                for &texture in &entry.planes {
                    backend.destroy_texture(texture);
                }
            }
            false
        });
    }

    /// Destroy every owned texture
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for (_, entry) in self.entries.drain() {
            if entry.owned {
                for texture in entry.planes {
                    backend.destroy_texture(texture);
                }
            }
        }
    }

    /// Forget every entry without touching the device, after context loss
    pub fn forget(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TextureCacheStats {
        TextureCacheStats {
            hits: self.hits,
            uploads: self.uploads,
            failures: self.failures,
            entries: self.entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::content::ImageContent;
    use crate::headless::HeadlessBackend;

    #[derive(Debug)]
    struct BrokenContent(ContentId);

    impl ContentSource for BrokenContent {
        fn id(&self) -> ContentId {
            self.0
        }

        fn natural_size(&self) -> Option<crate::geometry::Size> {
            None
        }

        fn pixels(&self) -> Result<ImageData<'_>, UploadError> {
            Err(UploadError::InvalidData("corrupt".into()))
        }
    }

    #[test]
    fn test_uploads_only_when_dirty() {
        let mut backend = HeadlessBackend::new();
        let mut cache = TextureCache::new();
        let content: ContentRef = Rc::new(ImageContent::solid(PixelSize::new(2, 2), [255; 4]));

        let first = cache.textures_for(&mut backend, &content, false);
        assert!(first.error.is_none());
        assert_eq!(backend.stats().uploads, 1);

        let second = cache.textures_for(&mut backend, &content, false);
        assert_eq!(first.planes, second.planes);
        assert_eq!(backend.stats().uploads, 1);

        cache.textures_for(&mut backend, &content, true);
        assert_eq!(backend.stats().uploads, 2);
        assert_eq!(cache.stats().hits, 2);
    }

    #[test]
    fn test_failed_upload_uses_placeholder() {
        let mut backend = HeadlessBackend::new();
        let mut cache = TextureCache::new();
        let content: ContentRef = Rc::new(BrokenContent(ContentId::next()));

        let lookup = cache.textures_for(&mut backend, &content, true);
        assert!(matches!(lookup.error, Some(UploadError::InvalidData(_))));
        let texture = lookup.primary().unwrap();
        assert_eq!(backend.texture_size(texture), Some(PixelSize::new(1, 1)));
        assert_eq!(backend.texture_pixel(texture), Some(PLACEHOLDER_PIXEL));
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_prune_releases_dropped_sources() {
        let mut backend = HeadlessBackend::new();
        let mut cache = TextureCache::new();
        let content: ContentRef = Rc::new(ImageContent::solid(PixelSize::new(1, 1), [0; 4]));
        cache.textures_for(&mut backend, &content, true);
        assert_eq!(backend.live_textures(), 1);

        drop(content);
        cache.prune(&mut backend);
        assert!(cache.is_empty());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_invalidate_only_drops_borrowed_entries() {
        let mut backend = HeadlessBackend::new();
        let mut cache = TextureCache::new();
        let owner: ContentRef = Rc::new(ImageContent::solid(PixelSize::new(1, 1), [0; 4]));
        let borrower: ContentRef = Rc::new(ImageContent::solid(PixelSize::new(1, 1), [0; 4]));

        let planes = cache.textures_for(&mut backend, &owner, true).planes;
        cache.alias(&mut backend, &borrower, &planes);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.invalidate_texture(planes[0]), 1);
        assert!(cache.planes(owner.id()).is_some());
        assert!(cache.planes(borrower.id()).is_none());
    }
}
