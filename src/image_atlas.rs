// GPU side of the image atlas
//
// Owns the atlas images, the host visible staging image and the
// sampler. Uploads go through the staging image one PagedImage at a
// time and are finished before `upload` returns.

use ash::vk;

use crate::atlas::{
    atlas_position, page_grid, stage_with_border, staging_position, PageAllocator, PageIndex,
    ATLAS_IMAGE_AXIS, ATLAS_MAX_IMAGES, MAX_UPLOAD_AXIS, PAGE_STRIDE, STAGING_AXIS,
};
use crate::device::Device;
use crate::paged_image::PagedImage;
use crate::{Result, SquallError};
use utils::pixmap::{Pixmap, Rgba16F};

pub const ATLAS_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// One image of the atlas and the layout it was last left in
struct AtlasImage {
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
    layout: vk::ImageLayout,
}

/// The linear image pixel data is written into
struct StagingImage {
    image: vk::Image,
    memory: vk::DeviceMemory,
    offset: u64,
    row_pitch: u64,
}

fn subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub struct ImageAtlas {
    ia_pages: PageAllocator,
    ia_images: Vec<AtlasImage>,
    ia_staging: Option<StagingImage>,
    pub(crate) ia_sampler: vk::Sampler,
}

impl ImageAtlas {
    /// An atlas without any GPU resources. `build` creates them.
    pub fn new() -> Self {
        Self {
            ia_pages: PageAllocator::new(ATLAS_MAX_IMAGES),
            ia_images: Vec::new(),
            ia_staging: None,
            ia_sampler: vk::Sampler::null(),
        }
    }

    /// Create the sampler and the staging image
    ///
    /// Atlas images themselves are only created once pages are needed.
    pub fn build(&mut self, dev: &Device) -> Result<()> {
        self.ia_sampler = dev.create_sampler()?;

        let (image, memory) = dev.create_image_with_memory(
            &vk::Extent2D {
                width: STAGING_AXIS as u32,
                height: STAGING_AXIS as u32,
            },
            ATLAS_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::ImageTiling::LINEAR,
            vk::ImageLayout::PREINITIALIZED,
        )?;
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
        self.ia_staging = Some(StagingImage {
            image: image,
            memory: memory,
            offset: layout.offset,
            row_pitch: layout.row_pitch,
        });

        // The staging image lives in GENERAL while the host writes to it
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

    fn add_image(dev: &Device, images: &mut Vec<AtlasImage>, image_nr: usize) -> Result<()> {
        let (image, view, memory) = dev.create_image(
            &vk::Extent2D {
                width: ATLAS_IMAGE_AXIS as u32,
                height: ATLAS_IMAGE_AXIS as u32,
            },
            ATLAS_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::ImageAspectFlags::COLOR,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        log::debug!("Growing image atlas to {} images", image_nr + 1);

        images.push(AtlasImage {
            image: image,
            view: view,
            memory: memory,
            layout: vk::ImageLayout::UNDEFINED,
        });
        Ok(())
    }

    pub fn allocate(&mut self, dev: &Device, count: usize) -> Result<Vec<PageIndex>> {
        let images = &mut self.ia_images;
        self.ia_pages
            .allocate(count, |nr| Self::add_image(dev, images, nr))
    }

    pub fn free(&mut self, pages: &[PageIndex]) {
        self.ia_pages.free(pages)
    }

    pub fn version(&self) -> usize {
        self.ia_pages.version()
    }

    pub fn free_count(&self) -> usize {
        self.ia_pages.free_count()
    }

    /// Views of every atlas image in order, for descriptor updates
    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.ia_images.iter().map(|i| i.view).collect()
    }

    /// Write the staged pixels into the mapped staging image
    fn write_staging(dev: &Device, staging: &StagingImage, staged: &Pixmap<Rgba16F>) -> Result<()> {
        let pixel_size = std::mem::size_of::<Rgba16F>();
        let row_bytes = staged.width() * pixel_size;

        unsafe {
            let ptr = dev.dev.map_memory(
                staging.memory,
                0,
                vk::WHOLE_SIZE,
                vk::MemoryMapFlags::empty(),
            )? as *mut u8;

            for y in 0..staged.height() {
                let src = staged.row(y);
                let dst = ptr.add((staging.offset + y as u64 * staging.row_pitch) as usize);
                std::ptr::copy_nonoverlapping(src.as_ptr() as *const u8, dst, row_bytes);
            }

            let range = vk::MappedMemoryRange::builder()
                .memory(staging.memory)
                .offset(0)
                .size(vk::WHOLE_SIZE)
                .build();
            let flushed = dev.dev.flush_mapped_memory_ranges(&[range]);
            dev.dev.unmap_memory(staging.memory);
            flushed?;
        }
        Ok(())
    }

    /// Copy the contents of `pixmap` into the pages of `image`
    pub fn upload(&mut self, dev: &Device, image: &PagedImage, pixmap: &Pixmap<Rgba16F>) -> Result<()> {
        if image.width() > MAX_UPLOAD_AXIS || image.height() > MAX_UPLOAD_AXIS {
            return Err(SquallError::IMAGE_TOO_LARGE(image.width(), image.height()));
        }
        let staging = self.ia_staging.as_ref().ok_or(SquallError::INVALID_STATE)?;

        let staged = stage_with_border(pixmap);
        Self::write_staging(dev, staging, &staged)?;

        // One copy per page, grouped by the atlas image it lands in
        let (wpages, _) = page_grid(image.width(), image.height());
        let mut regions: Vec<Vec<vk::ImageCopy>> = vec![Vec::new(); self.ia_images.len()];
        for (i, page) in image.pages().iter().enumerate() {
            let (sx, sy) = staging_position(i, wpages);
            let (dx, dy, image_nr) = atlas_position(*page);

            regions[image_nr].push(vk::ImageCopy {
                src_subresource: subresource_layers(),
                src_offset: vk::Offset3D {
                    x: sx as i32 - 1,
                    y: sy as i32 - 1,
                    z: 0,
                },
                dst_subresource: subresource_layers(),
                dst_offset: vk::Offset3D {
                    x: dx as i32 - 1,
                    y: dy as i32 - 1,
                    z: 0,
                },
                extent: vk::Extent3D {
                    width: PAGE_STRIDE as u32,
                    height: PAGE_STRIDE as u32,
                    depth: 1,
                },
            });
        }

        let staging_image = staging.image;
        let images = &mut self.ia_images;
        dev.one_time_submit(|cbuf| {
            dev.transition_image_layout(
                cbuf,
                staging_image,
                vk::ImageLayout::GENERAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );

            for (atlas_image, copies) in images.iter_mut().zip(regions.iter()) {
                if copies.is_empty() {
                    continue;
                }

                if atlas_image.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
                    dev.transition_image_layout(
                        cbuf,
                        atlas_image.image,
                        atlas_image.layout,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    );
                    atlas_image.layout = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
                }

                unsafe {
                    dev.dev.cmd_copy_image(
                        cbuf,
                        staging_image,
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        atlas_image.image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        copies.as_slice(),
                    );
                }
            }

            dev.transition_image_layout(
                cbuf,
                staging_image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::GENERAL,
            );
            Ok(())
        })
    }

    /// Move every atlas image to SHADER_READ_ONLY_OPTIMAL
    pub fn prepare_for_rendering(&mut self, dev: &Device) -> Result<()> {
        if self
            .ia_images
            .iter()
            .all(|i| i.layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        {
            return Ok(());
        }

        let images = &mut self.ia_images;
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
            for image in self.ia_images.drain(..) {
                dev.destroy_image_view(image.view, None);
                dev.destroy_image(image.image, None);
                dev.free_memory(image.memory, None);
            }
            if let Some(staging) = self.ia_staging.take() {
                dev.destroy_image(staging.image, None);
                dev.free_memory(staging.memory, None);
            }
            dev.destroy_sampler(self.ia_sampler, None);
            self.ia_sampler = vk::Sampler::null();
        }
    }
}
