// Signed distance field glyph atlas
//
// Glyphs arrive already rasterized as signed distance fields and are
// packed into R8_SNORM images with a shelf allocator. The SDF pipeline
// samples every image of this atlas through one descriptor array.

use ash::vk;

use crate::device::Device;
use crate::{Result, SquallError};
use utils::pixmap::Pixmap;

pub const SDF_FORMAT: vk::Format = vk::Format::R8_SNORM;
/// Width and height of one atlas image
pub const SDF_IMAGE_AXIS: usize = 256;
pub const SDF_MAX_IMAGES: usize = 128;
/// Width and height of the staging image, also the largest glyph
pub const SDF_STAGING_AXIS: usize = 64;
/// Empty pixels left between neighboring glyphs
const GLYPH_GAP: usize = 1;

/// Where a glyph ended up in the atlas
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct GlyphRect {
    /// atlas image holding the glyph
    pub layer: usize,
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl GlyphRect {
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// Packs rectangles into rows ("shelves") of square images
///
/// A rectangle that does not fit at the end of the current row starts a
/// new row, one that does not fit below the current row starts a new
/// image. Space is never reclaimed.
#[derive(Debug)]
pub struct ShelfAllocator {
    sa_axis: usize,
    sa_max_images: usize,
    sa_image_count: usize,
    sa_x: usize,
    sa_y: usize,
    sa_row_height: usize,
}

impl ShelfAllocator {
    pub fn new(axis: usize, max_images: usize) -> Self {
        Self {
            sa_axis: axis,
            sa_max_images: max_images,
            sa_image_count: 0,
            sa_x: 0,
            sa_y: 0,
            sa_row_height: 0,
        }
    }

    pub fn image_count(&self) -> usize {
        self.sa_image_count
    }

    /// Find room for a `w` x `h` rectangle
    ///
    /// `add_image` is called with the number of the image to create
    /// whenever the current one is full.
    pub fn place<F>(&mut self, w: usize, h: usize, mut add_image: F) -> Result<GlyphRect>
    where
        F: FnMut(usize) -> Result<()>,
    {
        if w > self.sa_axis || h > self.sa_axis {
            return Err(SquallError::IMAGE_TOO_LARGE(w, h));
        }

        if self.sa_x + w > self.sa_axis {
            self.sa_x = 0;
            self.sa_y += self.sa_row_height + GLYPH_GAP;
            self.sa_row_height = 0;
        }

        if self.sa_image_count == 0 || self.sa_y + h > self.sa_axis {
            if self.sa_image_count >= self.sa_max_images {
                log::error!("SDF atlas is full: {} images", self.sa_image_count);
                return Err(SquallError::VRAM_EXHAUSTED);
            }
            add_image(self.sa_image_count)?;
            self.sa_image_count += 1;
            self.sa_x = 0;
            self.sa_y = 0;
            self.sa_row_height = 0;
        }

        let rect = GlyphRect {
            layer: self.sa_image_count - 1,
            x: self.sa_x,
            y: self.sa_y,
            w: w,
            h: h,
        };
        self.sa_x += w + GLYPH_GAP;
        self.sa_row_height = self.sa_row_height.max(h);

        Ok(rect)
    }
}

struct SdfImage {
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
    layout: vk::ImageLayout,
}

pub struct SdfAtlas {
    sa_shelves: ShelfAllocator,
    sa_images: Vec<SdfImage>,
    sa_staging: vk::Image,
    sa_staging_memory: vk::DeviceMemory,
    sa_staging_offset: u64,
    sa_staging_pitch: u64,
    pub(crate) sa_sampler: vk::Sampler,
}

impl SdfAtlas {
    pub fn new() -> Self {
        Self {
            sa_shelves: ShelfAllocator::new(SDF_IMAGE_AXIS, SDF_MAX_IMAGES),
            sa_images: Vec::new(),
            sa_staging: vk::Image::null(),
            sa_staging_memory: vk::DeviceMemory::null(),
            sa_staging_offset: 0,
            sa_staging_pitch: 0,
            sa_sampler: vk::Sampler::null(),
        }
    }

    pub fn build(&mut self, dev: &Device) -> Result<()> {
        self.sa_sampler = dev.create_sampler()?;

        let (image, memory) = dev.create_image_with_memory(
            &vk::Extent2D {
                width: SDF_STAGING_AXIS as u32,
                height: SDF_STAGING_AXIS as u32,
            },
            SDF_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::ImageTiling::LINEAR,
            vk::ImageLayout::PREINITIALIZED,
        )?;
        self.sa_staging = image;
        self.sa_staging_memory = memory;

        let layout = unsafe {
            dev.dev.get_image_subresource_layout(
                image,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };
        self.sa_staging_offset = layout.offset;
        self.sa_staging_pitch = layout.row_pitch;

        dev.one_time_submit(|cbuf| {
            dev.transition_image_layout(
                cbuf,
                image,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::GENERAL,
            );
            Ok(())
        })
    }

    /// The number of atlas images
    pub fn version(&self) -> usize {
        self.sa_shelves.image_count()
    }

    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.sa_images.iter().map(|i| i.view).collect()
    }

    fn add_image(dev: &Device, images: &mut Vec<SdfImage>) -> Result<()> {
        let (image, view, memory) = dev.create_image(
            &vk::Extent2D {
                width: SDF_IMAGE_AXIS as u32,
                height: SDF_IMAGE_AXIS as u32,
            },
            SDF_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        images.push(SdfImage {
            image: image,
            view: view,
            memory: memory,
            layout: vk::ImageLayout::UNDEFINED,
        });
        Ok(())
    }

    /// Copy a glyph into the atlas and return where it went
    ///
    /// Empty glyphs take up no room.
    pub fn add_glyph(&mut self, dev: &Device, glyph: &Pixmap<i8>) -> Result<GlyphRect> {
        if glyph.width() > SDF_STAGING_AXIS || glyph.height() > SDF_STAGING_AXIS {
            return Err(SquallError::IMAGE_TOO_LARGE(glyph.width(), glyph.height()));
        }
        if glyph.is_empty() {
            return Ok(GlyphRect::default());
        }

        let images = &mut self.sa_images;
        let rect = self
            .sa_shelves
            .place(glyph.width(), glyph.height(), |_| Self::add_image(dev, images))?;

        unsafe {
            let ptr = dev.dev.map_memory(
                self.sa_staging_memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;
            for y in 0..glyph.height() {
                let row = glyph.row(y);
                let dst = ptr.add((self.sa_staging_offset + y as u64 * self.sa_staging_pitch) as usize);
                std::ptr::copy_nonoverlapping(row.as_ptr() as *const u8, dst, row.len());
            }
            let range = vk::MappedMemoryRange::builder()
                .memory(self.sa_staging_memory)
                .size(vk::WHOLE_SIZE)
                .build();
            let flushed = dev.dev.flush_mapped_memory_ranges(&[range]);
            dev.dev.unmap_memory(self.sa_staging_memory);
            flushed?;
        }

        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            dst_subresource: layers,
            dst_offset: vk::Offset3D {
                x: rect.x as i32,
                y: rect.y as i32,
                z: 0,
            },
            extent: vk::Extent3D {
                width: rect.w as u32,
                height: rect.h as u32,
                depth: 1,
            },
        };

        let staging = self.sa_staging;
        let target = &mut self.sa_images[rect.layer];
        dev.one_time_submit(|cbuf| {
            dev.transition_image_layout(
                cbuf,
                staging,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );
            if target.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
                dev.transition_image_layout(
                    cbuf,
                    target.image,
                    target.layout,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );
                target.layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
            }
            unsafe {
                dev.dev.cmd_copy_image(
                    cbuf,
                    staging,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    target.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            dev.transition_image_layout(
                cbuf,
                staging,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::GENERAL,
            );
            Ok(())
        })?;

        Ok(rect)
    }

    pub fn prepare_for_rendering(&mut self, dev: &Device) -> Result<()> {
        let images = &mut self.sa_images;
        if images
            .iter()
            .all(|i| i.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        {
            return Ok(());
        }

        dev.one_time_submit(|cbuf| {
            for image in images.iter_mut() {
                if image.layout != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
                    dev.transition_image_layout(
                        cbuf,
                        image.image,
                        image.layout,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                    image.layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
                }
            }
            Ok(())
        })
    }

    pub fn destroy(&mut self, dev: &ash::Device) {
        unsafe {
            for image in self.sa_images.drain(..) {
                dev.destroy_image_view(image.view, None);
                dev.destroy_image(image.image, None);
                dev.free_memory(image.memory, None);
            }
            dev.destroy_image(self.sa_staging, None);
            dev.free_memory(self.sa_staging_memory, None);
            dev.destroy_sampler(self.sa_sampler, None);
        }
        self.sa_staging = vk::Image::null();
        self.sa_staging_memory = vk::DeviceMemory::null();
        self.sa_sampler = vk::Sampler::null();
    }
}
