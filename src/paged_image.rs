// A logical image stored in pages of the image atlas
//
// The image does not know where the pages live, it only holds their
// indices and a reference to whoever handed them out so they can be
// given back when the image is dropped.

use crate::atlas::{page_count, PageIndex};
use crate::{Result, SquallError, GFX_SYSTEM_MUTEX};
use utils::pixmap::{Pixmap, Rgba16F};

use std::fmt;
use std::sync::Arc;

/// Owner of the atlas pages used by a PagedImage
///
/// This is implemented by `Device`. Every method is called with the
/// gfx system mutex held.
pub trait AtlasHost: Send + Sync {
    fn allocate_pages(&self, count: usize) -> Result<Vec<PageIndex>>;

    fn free_pages(&self, pages: &[PageIndex]);

    /// Copy `pixmap` into the pages of `image`
    fn upload_pages(&self, image: &PagedImage, pixmap: &Pixmap<Rgba16F>) -> Result<()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PagedImageState {
    /// Pages are allocated but contain garbage
    Uninitialized,
    /// The owner is busy producing the pixels
    Drawing,
    /// The pages hold the image and it may be drawn
    Uploaded,
}

/// An image made out of atlas pages
///
/// This cannot be cloned. Moving it moves the page list, and dropping
/// it returns the pages to the atlas.
pub struct PagedImage {
    pi_host: Option<Arc<dyn AtlasHost>>,
    pi_width: usize,
    pi_height: usize,
    pi_pages: Vec<PageIndex>,
    pi_state: PagedImageState,
}

impl PagedImage {
    pub(crate) fn new(host: Arc<dyn AtlasHost>, width: usize, height: usize) -> Result<Self> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let count = page_count(width, height);
        let pages = match count {
            0 => Vec::new(),
            n => host.allocate_pages(n)?,
        };

        Ok(Self {
            pi_host: Some(host),
            pi_width: width,
            pi_height: height,
            pi_pages: pages,
            pi_state: PagedImageState::Uninitialized,
        })
    }

    pub fn width(&self) -> usize {
        self.pi_width
    }

    pub fn height(&self) -> usize {
        self.pi_height
    }

    pub fn pages(&self) -> &[PageIndex] {
        self.pi_pages.as_slice()
    }

    pub fn state(&self) -> PagedImageState {
        self.pi_state
    }

    /// True for images without a device or without any pixels
    pub fn is_empty(&self) -> bool {
        self.pi_host.is_none() || self.pi_pages.is_empty()
    }

    /// Mark that the contents are being produced
    pub fn begin_drawing(&mut self) {
        if self.pi_host.is_some() {
            self.pi_state = PagedImageState::Drawing;
        }
    }

    /// Upload the contents of this image
    ///
    /// `pixmap` must be exactly as large as the image. Images of a
    /// null device ignore uploads.
    pub fn upload(&mut self, pixmap: &Pixmap<Rgba16F>) -> Result<()> {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        let host = match self.pi_host.as_ref() {
            Some(h) => h.clone(),
            None => return Ok(()),
        };

        if pixmap.width() != self.pi_width || pixmap.height() != self.pi_height {
            return Err(SquallError::INVALID_PIXMAP_SIZE(
                pixmap.width(),
                pixmap.height(),
            ));
        }

        if !self.pi_pages.is_empty() {
            host.upload_pages(self, pixmap)?;
        }
        self.pi_state = PagedImageState::Uploaded;
        Ok(())
    }
}

/// The empty image of the null device
impl Default for PagedImage {
    fn default() -> Self {
        Self {
            pi_host: None,
            pi_width: 0,
            pi_height: 0,
            pi_pages: Vec::new(),
            pi_state: PagedImageState::Uninitialized,
        }
    }
}

impl fmt::Debug for PagedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagedImage")
            .field("has_device", &self.pi_host.is_some())
            .field("width", &self.pi_width)
            .field("height", &self.pi_height)
            .field("pages", &self.pi_pages.len())
            .field("state", &self.pi_state)
            .finish()
    }
}

impl Drop for PagedImage {
    fn drop(&mut self) {
        let _lock = GFX_SYSTEM_MUTEX.lock();

        if let Some(host) = self.pi_host.take() {
            if !self.pi_pages.is_empty() {
                host.free_pages(&self.pi_pages);
                self.pi_pages.clear();
            }
        }
    }
}
