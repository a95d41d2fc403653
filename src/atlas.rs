// Page bookkeeping for the image atlas
//
// The atlas is a set of square images, each cut into a 16x16 grid of
// 64x64 pixel pages. Every page has a one pixel border so that bilinear
// sampling at the edge of a page picks up the right neighbor. This file
// holds the pure parts: allocation, page positions, border filling and
// quad placement. The GPU side lives in image_atlas.rs.

use crate::{Result, SquallError};
use utils::div_ceil;
use utils::pixmap::{Pixmap, Rgba16F};
use utils::region::Rect;

/// Width and height of the content of one page
pub const PAGE_SIZE: usize = 64;
/// Width and height of a page including its border on both sides
pub const PAGE_STRIDE: usize = PAGE_SIZE + 2;
pub const PAGES_PER_AXIS: usize = 16;
pub const PAGES_PER_IMAGE: usize = PAGES_PER_AXIS * PAGES_PER_AXIS;
/// Width and height of one atlas image
pub const ATLAS_IMAGE_AXIS: usize = PAGES_PER_AXIS * PAGE_STRIDE;
pub const ATLAS_MAX_IMAGES: usize = 16;
/// Width and height of the host visible staging image
pub const STAGING_AXIS: usize = 1024;
/// The largest image that fits in the staging image once rounded up
/// to whole pages and given its border
pub const MAX_UPLOAD_AXIS: usize = ((STAGING_AXIS - 2) / PAGE_SIZE) * PAGE_SIZE;

/// `image_nr * PAGES_PER_IMAGE + local page`
pub type PageIndex = usize;

/// Number of pages along each axis needed for a `width` x `height` image
pub fn page_grid(width: usize, height: usize) -> (usize, usize) {
    (div_ceil(width, PAGE_SIZE), div_ceil(height, PAGE_SIZE))
}

pub fn page_count(width: usize, height: usize) -> usize {
    let (w, h) = page_grid(width, height);
    w * h
}

/// The position of the first content pixel of a page inside its
/// atlas image, and the index of that image.
pub fn atlas_position(page: PageIndex) -> (usize, usize, usize) {
    let image_nr = page / PAGES_PER_IMAGE;
    let local = page % PAGES_PER_IMAGE;

    (
        (local % PAGES_PER_AXIS) * PAGE_STRIDE + 1,
        (local / PAGES_PER_AXIS) * PAGE_STRIDE + 1,
        image_nr,
    )
}

/// The position of the first content pixel of the `i`th page of an
/// image inside the staging image. Pages of one image are laid out
/// next to each other, `width_in_pages` per row.
pub fn staging_position(i: usize, width_in_pages: usize) -> (usize, usize) {
    (
        (i % width_in_pages) * PAGE_SIZE + 1,
        (i / width_in_pages) * PAGE_SIZE + 1,
    )
}

/// The free list of atlas pages
///
/// Pages are fixed size and fungible, so this is just a vector. The
/// allocator grows the atlas one image at a time through a callback
/// so that the GPU side can create the backing image.
#[derive(Debug)]
pub struct PageAllocator {
    pa_free: Vec<PageIndex>,
    pa_image_count: usize,
    pa_max_images: usize,
}

impl PageAllocator {
    pub fn new(max_images: usize) -> Self {
        Self {
            pa_free: Vec::new(),
            pa_image_count: 0,
            pa_max_images: max_images,
        }
    }

    /// Take `count` pages from the free list
    ///
    /// `add_image` is called with the number of the new image every
    /// time the free list is too short. Fails with VRAM_EXHAUSTED once
    /// the maximum number of images has been reached.
    pub fn allocate<F>(&mut self, count: usize, mut add_image: F) -> Result<Vec<PageIndex>>
    where
        F: FnMut(usize) -> Result<()>,
    {
        while self.pa_free.len() < count {
            if self.pa_image_count >= self.pa_max_images {
                log::error!(
                    "Atlas is full: {} images, {} pages requested",
                    self.pa_image_count,
                    count
                );
                return Err(SquallError::VRAM_EXHAUSTED);
            }

            let image_nr = self.pa_image_count;
            add_image(image_nr)?;
            self.pa_image_count += 1;

            // push in reverse so the lowest numbered pages are handed out first
            let first = image_nr * PAGES_PER_IMAGE;
            self.pa_free
                .extend((first..first + PAGES_PER_IMAGE).rev());
        }

        let start = self.pa_free.len() - count;
        let mut pages = self.pa_free.split_off(start);
        pages.reverse();
        Ok(pages)
    }

    /// Return pages to the free list
    pub fn free(&mut self, pages: &[PageIndex]) {
        self.pa_free.extend_from_slice(pages);
    }

    /// The number of atlas images. This only ever grows.
    pub fn version(&self) -> usize {
        self.pa_image_count
    }

    pub fn image_count(&self) -> usize {
        self.pa_image_count
    }

    pub fn free_count(&self) -> usize {
        self.pa_free.len()
    }

    pub fn total_pages(&self) -> usize {
        self.pa_image_count * PAGES_PER_IMAGE
    }

    pub fn is_free(&self, page: PageIndex) -> bool {
        self.pa_free.contains(&page)
    }
}

/// Lay out an image the way it is copied out of the staging image
///
/// The result is the page-rounded size of `src` plus a one pixel
/// border on every side. `src` lands at (1,1), the border duplicates
/// the edge pixels of `src` and everything else is transparent black.
/// A fully transparent image gets a transparent black border.
pub fn stage_with_border(src: &Pixmap<Rgba16F>) -> Pixmap<Rgba16F> {
    let (wpages, hpages) = page_grid(src.width(), src.height());
    let mut staged = Pixmap::new(wpages * PAGE_SIZE + 2, hpages * PAGE_SIZE + 2);

    if src.is_empty() {
        return staged;
    }
    staged.copy_from(src, 1, 1);

    if src.pixels().iter().all(|p| p.is_transparent()) {
        return staged;
    }

    let (w, h) = (src.width(), src.height());
    for y in 1..=h {
        let left = staged.get(1, y);
        let right = staged.get(w, y);
        staged.set(0, y, left);
        staged.set(w + 1, y, right);
    }
    for x in 0..=w + 1 {
        let bottom = staged.get(x, 1);
        let top = staged.get(x, h);
        staged.set(x, 0, bottom);
        staged.set(x, h + 1, top);
    }

    staged
}

/// One quad of a paged image ready to be turned into vertices
///
/// Corners are in window coordinates in the order left-bottom,
/// right-bottom, left-top, right-top. The uv coordinates are pixel
/// positions inside atlas image `layer`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PageQuad {
    pub corners: [(f32, f32); 4],
    pub uv: [(f32, f32); 4],
    pub layer: f32,
}

/// Cut the destination rectangle into one quad per page of the image
///
/// Pages on the right and top edge of the image are only partially
/// used, their quad and uv rectangle cover just the used part.
pub fn place_pages<F>(dst: &Rect<f32>, width: usize, height: usize, pages: &[PageIndex], mut emit: F)
where
    F: FnMut(PageQuad),
{
    if width == 0 || height == 0 {
        return;
    }

    let (wpages, hpages) = page_grid(width, height);
    debug_assert_eq!(pages.len(), wpages * hpages);

    let x_scale = dst.width() / width as f32;
    let y_scale = dst.height() / height as f32;

    for row in 0..hpages {
        for column in 0..wpages {
            let page = pages[row * wpages + column];
            let (ax, ay, layer) = atlas_position(page);

            let px = column * PAGE_SIZE;
            let py = row * PAGE_SIZE;
            let pw = PAGE_SIZE.min(width - px);
            let ph = PAGE_SIZE.min(height - py);

            let x0 = dst.left() + px as f32 * x_scale;
            let x1 = dst.left() + (px + pw) as f32 * x_scale;
            let y0 = dst.bottom() + py as f32 * y_scale;
            let y1 = dst.bottom() + (py + ph) as f32 * y_scale;

            let u0 = ax as f32;
            let u1 = (ax + pw) as f32;
            let v0 = ay as f32;
            let v1 = (ay + ph) as f32;

            emit(PageQuad {
                corners: [(x0, y0), (x1, y0), (x0, y1), (x1, y1)],
                uv: [(u0, v0), (u1, v0), (u0, v1), (u1, v1)],
                layer: layer as f32,
            });
        }
    }
}
