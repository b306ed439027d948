//! Content sources: the external images, video frames and canvases a layer
//! displays.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{ImageData, RenderBackend, TextureId};
use crate::error::UploadError;
use crate::filter::FilterRef;
use crate::geometry::{PixelSize, Size};
use crate::layer::LayerId;

/// Stable identity of a content source, the texture cache key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(u64);

impl ContentId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Something a layer can display
pub trait ContentSource: fmt::Debug {
    fn id(&self) -> ContentId;

    /// Intrinsic size, `None` while unknown
    fn natural_size(&self) -> Option<Size>;

    /// Whether pixels are available yet (e.g. the first video frame arrived)
    fn is_ready(&self) -> bool {
        true
    }

    /// Live sources (video) re-upload every frame regardless of dirty flags
    fn is_live(&self) -> bool {
        false
    }

    /// Number of textures the source uploads into (planar video uses more than one)
    fn plane_count(&self) -> usize {
        1
    }

    /// Filter that must run first whenever this content is drawn, e.g. a
    /// YUV to RGB conversion
    fn filter(&self) -> Option<FilterRef> {
        None
    }

    /// Pixels for the default upload path
    fn pixels(&self) -> Result<ImageData<'_>, UploadError>;

    /// Custom upload routine; `None` uses [`pixels`](Self::pixels)
    fn upload(
        &self,
        _backend: &mut dyn RenderBackend,
        _planes: &[TextureId],
    ) -> Option<Result<(), UploadError>> {
        None
    }
}

pub type ContentRef = Rc<dyn ContentSource>;

/// Receives notifications about a layer's contents
pub trait LayerDelegate {
    /// Upload of the layer's contents failed; a placeholder is displayed until
    /// the contents are marked dirty again
    fn contents_failed_to_update(&self, layer: LayerId, error: &UploadError);
}

// ─────────────────────────────────────────────────────────────────────────────
// In-Memory Image
// ─────────────────────────────────────────────────────────────────────────────

/// Content source backed by an owned RGBA or alpha buffer
pub struct ImageContent {
    id: ContentId,
    image: RefCell<ImageData<'static>>,
    filter: Option<FilterRef>,
}

impl ImageContent {
    pub fn new(image: ImageData<'static>) -> Self {
        Self {
            id: ContentId::next(),
            image: RefCell::new(image),
            filter: None,
        }
    }

    /// Single color image of the given size
    pub fn solid(size: PixelSize, rgba: [u8; 4]) -> Self {
        let bytes: Vec<u8> = std::iter::repeat(rgba)
            .take(size.area() as usize)
            .flatten()
            .collect();
        Self::new(ImageData::rgba(size, bytes))
    }

    pub fn with_filter(mut self, filter: FilterRef) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Swap in new pixels; the owning layer must be marked dirty to upload them
    pub fn replace(&self, image: ImageData<'static>) {
        *self.image.borrow_mut() = image;
    }
}

impl fmt::Debug for ImageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let image = self.image.borrow();
        f.debug_struct("ImageContent")
            .field("id", &self.id)
            .field("size", &image.size)
            .field("format", &image.format)
            .finish()
    }
}

impl ContentSource for ImageContent {
    fn id(&self) -> ContentId {
        self.id
    }

    fn natural_size(&self) -> Option<Size> {
        Some(self.image.borrow().size.to_size())
    }

    fn filter(&self) -> Option<FilterRef> {
        self.filter.clone()
    }

    fn pixels(&self) -> Result<ImageData<'_>, UploadError> {
        let image = self.image.borrow().clone();
        image.validate()?;
        Ok(image)
    }
}
