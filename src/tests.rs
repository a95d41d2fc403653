// Squall tests
//
// The Surface state machine is driven with a recording backend, so
// none of these need a GPU. The atlas, quad placement and the other
// pure helpers are tested directly.
use crate as sq;

use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::atlas::{
    atlas_position, page_count, place_pages, stage_with_border, PageAllocator, PageIndex,
    PAGES_PER_IMAGE, PAGE_SIZE,
};
use crate::draw_context::adjust_for_border;
use crate::paged_image::AtlasHost;
use crate::pipelines::sdf::{sdf_blend_attachment, SdfPushConstants};
use crate::pipelines::{AtlasDescriptors, DescriptorVersion};
use crate::sdf_atlas::{ShelfAllocator, SDF_IMAGE_AXIS, SDF_MAX_IMAGES, SDF_STAGING_AXIS};
use crate::surface::{
    clamp_count_and_size, is_minimized, vulkan_scissor, BuiltSwapchain, DelegateFrame,
    FrameSubmission, SurfaceBackend, SurfaceDelegate, REFRESH_INTERVAL,
};
use crate::vertex_span::{dropped_vertices, VertexSpan, MAX_VERTICES};
use sq::{
    BorderSide, BoxAttributes, GlyphRect, PagedImage, PagedImageState, Pixmap, Rect, Rgba16F,
    SquallError, SubpixelOrientation, Surface, SurfaceLoss, SurfaceState,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn extent(width: u32, height: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: width,
        height: height,
    }
}

/// Capabilities of a window of `width` x `height`
fn caps(width: u32, height: u32) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        min_image_count: 2,
        max_image_count: 0,
        current_extent: extent(width, height),
        min_image_extent: extent(1, 1),
        max_image_extent: extent(4096, 4096),
        ..Default::default()
    }
}

/// Everything the mock backend was asked to do
#[derive(Debug, Default, Clone, PartialEq)]
struct MockLog {
    find_device: usize,
    device_builds: usize,
    device_teardowns: usize,
    capability_queries: usize,
    swapchain_builds: usize,
    swapchain_teardowns: usize,
    window_destroyed: bool,
    acquires: usize,
    waits: usize,
    idles: usize,
    lost_devices: usize,
    semaphores_created: usize,
    semaphores_destroyed: Vec<vk::Semaphore>,
    /// (index, first use) of every started frame
    frames_begun: Vec<(u32, bool)>,
    submissions: Vec<FrameSubmission>,
    presents: Vec<u32>,
    /// box vertices of every submission
    box_vertices: Vec<usize>,
}

/// Shared by a backend and its delegates to check call order
type EventLog = Arc<Mutex<Vec<String>>>;

fn take_events(events: &EventLog) -> Vec<String> {
    std::mem::take(&mut *events.lock())
}

/// The semaphore a mock frame on image `index` starts with
fn frame_start_semaphore(index: u32) -> vk::Semaphore {
    vk::Semaphore::from_raw(500 + index as u64)
}

/// A backend that records calls instead of talking to a GPU
struct MockBackend {
    log: MockLog,
    /// lifecycle and frame calls in order
    events: EventLog,
    next_semaphore: u64,
    device: Option<u32>,
    next_device: u32,
    /// find_device fails when this is false
    has_devices: bool,
    caps: vk::SurfaceCapabilitiesKHR,
    /// replaces `caps` once a swapchain was built
    caps_after_build: Option<vk::SurfaceCapabilitiesKHR>,
    granularity: vk::Extent2D,
    image_count: usize,
    next_image: u32,
    /// queued results, a cycling image index is returned once empty
    acquire_results: VecDeque<sq::Result<Option<u32>>>,
    present_results: VecDeque<sq::Result<()>>,
}

impl MockBackend {
    fn new(width: u32, height: u32) -> Self {
        Self {
            log: MockLog::default(),
            events: Arc::new(Mutex::new(Vec::new())),
            next_semaphore: 1000,
            device: None,
            next_device: 1,
            has_devices: true,
            caps: caps(width, height),
            caps_after_build: None,
            granularity: extent(1, 1),
            image_count: 0,
            next_image: 0,
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
        }
    }

    fn event(&self, what: String) {
        self.events.lock().push(what);
    }
}

impl SurfaceBackend for MockBackend {
    type Device = u32;

    fn has_device(&self) -> bool {
        self.device.is_some()
    }

    fn device(&self) -> Option<&u32> {
        self.device.as_ref()
    }

    fn set_device(&mut self, dev: u32) {
        self.device = Some(dev);
    }

    fn find_device(&mut self) -> sq::Result<()> {
        self.log.find_device += 1;
        if !self.has_devices {
            return Err(SquallError::NO_SUITABLE_DEVICE);
        }
        self.device = Some(self.next_device);
        self.next_device += 1;
        Ok(())
    }

    fn device_lost(&mut self) {
        assert!(self.device.is_some());
        self.log.lost_devices += 1;
    }

    fn build_for_new_device(&mut self) -> sq::Result<()> {
        assert!(self.device.is_some());
        self.log.device_builds += 1;
        self.event("build device".to_string());
        Ok(())
    }

    fn teardown_for_device_lost(&mut self) {
        self.log.device_teardowns += 1;
        self.device = None;
        self.event("teardown device".to_string());
    }

    fn wait_idle(&mut self) {
        self.log.idles += 1;
        self.event("idle".to_string());
    }

    fn create_semaphore(&mut self) -> sq::Result<vk::Semaphore> {
        assert!(self.device.is_some());
        self.log.semaphores_created += 1;
        self.next_semaphore += 1;
        Ok(vk::Semaphore::from_raw(self.next_semaphore))
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        assert!(self.device.is_some());
        self.log.semaphores_destroyed.push(semaphore);
    }

    fn surface_capabilities(&mut self) -> sq::Result<vk::SurfaceCapabilitiesKHR> {
        self.log.capability_queries += 1;
        Ok(self.caps)
    }

    fn build_swapchain(
        &mut self,
        count: u32,
        extent: vk::Extent2D,
        _caps: &vk::SurfaceCapabilitiesKHR,
    ) -> sq::Result<BuiltSwapchain> {
        self.log.swapchain_builds += 1;
        self.event("build swapchain".to_string());
        if let Some(c) = self.caps_after_build.take() {
            self.caps = c;
        }
        self.image_count = count as usize;
        self.next_image = 0;

        Ok(BuiltSwapchain {
            image_count: self.image_count,
            granularity: self.granularity,
            extent: extent,
            format: vk::SurfaceFormatKHR::default(),
            image_views: (0..count as u64).map(vk::ImageView::from_raw).collect(),
        })
    }

    fn teardown_swapchain(&mut self) {
        self.log.swapchain_teardowns += 1;
        self.image_count = 0;
        self.event("teardown swapchain".to_string());
    }

    fn destroy_window(&mut self) {
        self.log.window_destroyed = true;
    }

    fn acquire_next_image(&mut self) -> sq::Result<Option<u32>> {
        self.log.acquires += 1;
        if let Some(res) = self.acquire_results.pop_front() {
            return res;
        }

        let index = self.next_image;
        self.next_image = (index + 1) % self.image_count as u32;
        Ok(Some(index))
    }

    fn wait_for_frame(&mut self) -> sq::Result<()> {
        self.log.waits += 1;
        Ok(())
    }

    fn begin_frame(&mut self, index: u32, first_use: bool) -> sq::Result<vk::Semaphore> {
        assert!((index as usize) < self.image_count);
        self.log.frames_begun.push((index, first_use));
        self.event(format!("begin {}", index));
        Ok(frame_start_semaphore(index))
    }

    fn submit_frame(&mut self, frame: &FrameSubmission, ctx: &sq::DrawContext) -> sq::Result<()> {
        self.log.submissions.push(*frame);
        self.log.box_vertices.push(ctx.boxes().len());
        self.event(format!("submit waits {}", frame.wait_semaphore.as_raw()));
        Ok(())
    }

    fn present(&mut self, index: u32) -> sq::Result<()> {
        self.log.presents.push(index);
        self.event(format!("present {}", index));
        self.present_results.pop_front().unwrap_or(Ok(()))
    }
}

/// A surface of `width` x `height` built up to HasSwapchain
fn built_surface(width: u32, height: u32) -> Surface<MockBackend> {
    init_logging();
    let mut surf = Surface::new(MockBackend::new(width, height), 2, 1.0);
    surf.update(extent(width, height)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    assert_eq!(surf.loss(), SurfaceLoss::None);
    surf
}

/// A delegate that logs its calls into the backend's event log
struct RecordingDelegate {
    name: &'static str,
    events: EventLog,
    /// returned from every draw
    draw_error: Option<SquallError>,
}

impl RecordingDelegate {
    fn boxed(name: &'static str, events: &EventLog) -> Box<Self> {
        Box::new(Self {
            name: name,
            events: events.clone(),
            draw_error: None,
        })
    }

    fn event(&self, what: String) {
        self.events.lock().push(format!("{} {}", self.name, what));
    }
}

impl SurfaceDelegate<u32> for RecordingDelegate {
    fn build_for_new_device(&mut self, dev: &u32) -> sq::Result<()> {
        self.event(format!("build device {}", dev));
        Ok(())
    }

    fn teardown_for_device_lost(&mut self) {
        self.event("teardown device".to_string());
    }

    fn build_for_new_swapchain(&mut self, swapchain: &BuiltSwapchain) -> sq::Result<()> {
        assert_eq!(swapchain.image_views.len(), swapchain.image_count);
        self.event(format!(
            "build swapchain {}x{}",
            swapchain.extent.width, swapchain.extent.height
        ));
        Ok(())
    }

    fn teardown_for_swapchain_lost(&mut self) {
        self.event("teardown swapchain".to_string());
    }

    fn draw(&mut self, frame: &DelegateFrame) -> sq::Result<()> {
        self.event(format!(
            "draw waits {} signals {}",
            frame.wait_semaphore.as_raw(),
            frame.signal_semaphore.as_raw()
        ));
        match self.draw_error.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Atlas pages without a GPU
struct MockAtlas {
    pages: Mutex<PageAllocator>,
    uploads: Mutex<usize>,
}

impl MockAtlas {
    fn new(max_images: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(PageAllocator::new(max_images)),
            uploads: Mutex::new(0),
        })
    }
}

impl AtlasHost for MockAtlas {
    fn allocate_pages(&self, count: usize) -> sq::Result<Vec<PageIndex>> {
        self.pages.lock().allocate(count, |_| Ok(()))
    }

    fn free_pages(&self, pages: &[PageIndex]) {
        self.pages.lock().free(pages)
    }

    fn upload_pages(&self, _image: &PagedImage, _pixmap: &Pixmap<Rgba16F>) -> sq::Result<()> {
        *self.uploads.lock() += 1;
        Ok(())
    }
}

fn uploaded_image(atlas: &Arc<MockAtlas>, width: usize, height: usize) -> PagedImage {
    let mut image = PagedImage::new(atlas.clone(), width, height).unwrap();
    image.upload(&Pixmap::new(width, height)).unwrap();
    image
}

// ------------------------------------------------------------------
// Surface state machine
// ------------------------------------------------------------------

#[test]
fn update_builds_up_to_swapchain() {
    let surf = built_surface(800, 600);

    assert_eq!(surf.current_extent(), extent(800, 600));
    assert_eq!(surf.swapchain_image_count(), 2);
    assert_eq!(surf.frame_count(), 0);
    assert_eq!(surf.backend().log.find_device, 1);
    assert_eq!(surf.backend().log.device_builds, 1);
    assert_eq!(surf.backend().log.swapchain_builds, 1);
    assert!(!surf.layout_is_present(0));
    assert!(!surf.layout_is_present(1));
}

#[test]
fn every_frame_submits_and_presents_once() {
    let mut surf = built_surface(800, 600);

    for frame in 0..3u32 {
        let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
        let index = ctx.frame_buffer_index().unwrap();
        assert_eq!(index, frame % 2);
        surf.render_finish(ctx).unwrap();

        assert!(surf.layout_is_present(index as usize));
    }

    let log = &surf.backend().log;
    assert_eq!(log.submissions.len(), 3);
    assert_eq!(log.presents, vec![0, 1, 0]);
    assert_eq!(log.waits, 3);
    assert_eq!(surf.frame_count(), 3);

    // only the first use of each image moves it out of UNDEFINED
    assert_eq!(log.frames_begun, vec![(0, true), (1, true), (0, false)]);
    // without delegates the UI waits on the frame start directly
    let waits: Vec<vk::Semaphore> = log.submissions.iter().map(|s| s.wait_semaphore).collect();
    assert_eq!(
        waits,
        vec![
            frame_start_semaphore(0),
            frame_start_semaphore(1),
            frame_start_semaphore(0)
        ]
    );
}

#[test]
fn partial_redraw_accumulates_scissor() {
    let mut surf = built_surface(800, 600);

    let ctx = surf.render_start(Rect::new(10.0, 10.0, 100.0, 100.0));
    assert_eq!(ctx.frame_buffer_index(), Some(0));
    assert_eq!(ctx.scissor_rectangle(), Rect::new(10.0, 10.0, 100.0, 100.0));
    surf.render_finish(ctx).unwrap();

    // Vulkan has its origin in the top left corner
    let first = surf.backend().log.submissions[0];
    assert_eq!(first.scissor.offset, vk::Offset2D { x: 10, y: 490 });
    assert_eq!(first.scissor.extent, extent(100, 100));

    let ctx = surf.render_start(Rect::new(500.0, 500.0, 100.0, 100.0));
    assert_eq!(ctx.frame_buffer_index(), Some(1));
    assert_eq!(ctx.redraw_rectangle(), Rect::new(500.0, 500.0, 100.0, 100.0));
    assert_eq!(
        ctx.scissor_rectangle(),
        Rect::from_corners(10.0, 10.0, 600.0, 600.0)
    );

    let union = surf.redraw_rectangle(0).union(&surf.redraw_rectangle(1));
    assert!(union.contains_rect(&ctx.scissor_rectangle()));
    surf.render_finish(ctx).unwrap();
}

#[test]
fn redraw_is_rounded_to_granularity() {
    init_logging();
    let mut backend = MockBackend::new(800, 600);
    backend.granularity = extent(32, 32);
    let mut surf = Surface::new(backend, 2, 1.0);
    surf.update(extent(800, 600)).unwrap();

    assert_eq!(surf.render_area_granularity(), extent(32, 32));
    let ctx = surf.render_start(Rect::new(10.0, 10.0, 100.0, 100.0));
    assert_eq!(
        ctx.redraw_rectangle(),
        Rect::from_corners(0.0, 0.0, 128.0, 128.0)
    );
    surf.render_finish(ctx).unwrap();
}

#[test]
fn empty_redraw_skips_frame() {
    let mut surf = built_surface(800, 600);

    let ctx = surf.render_start(Rect::default());
    assert!(!ctx.is_valid());
    surf.render_finish(ctx).unwrap();

    // entirely outside of the window
    let ctx = surf.render_start(Rect::new(900.0, 0.0, 10.0, 10.0));
    assert!(!ctx.is_valid());
    surf.render_finish(ctx).unwrap();

    assert_eq!(surf.backend().log.acquires, 0);
    assert!(surf.backend().log.submissions.is_empty());
}

#[test]
fn resize_rebuilds_swapchain() {
    let mut surf = built_surface(800, 600);
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    surf.render_finish(ctx).unwrap();
    assert!(surf.layout_is_present(0));

    surf.backend_mut().caps = caps(1024, 768);
    surf.update(extent(1024, 768)).unwrap();

    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    assert_eq!(surf.loss(), SurfaceLoss::None);
    assert_eq!(surf.current_extent(), extent(1024, 768));
    assert_eq!(surf.swapchain_image_count(), 2);
    assert!(!surf.layout_is_present(0));
    assert!(!surf.layout_is_present(1));

    let log = &surf.backend().log;
    assert_eq!(log.swapchain_teardowns, 1);
    assert_eq!(log.swapchain_builds, 2);
    // the device survives a resize
    assert_eq!(log.device_builds, 1);
    assert_eq!(log.device_teardowns, 0);
}

#[test]
fn update_with_same_size_does_nothing() {
    let mut surf = built_surface(800, 600);
    let before = surf.backend().log.clone();

    surf.update(extent(800, 600)).unwrap();

    assert_eq!(surf.backend().log, before);
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
}

#[test]
fn not_ready_skips_frame() {
    let mut surf = built_surface(800, 600);
    surf.backend_mut().acquire_results.push_back(Ok(None));

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert_eq!(ctx.frame_buffer_index(), None);
    surf.render_finish(ctx).unwrap();

    let log = &surf.backend().log;
    assert_eq!(log.acquires, 1);
    assert_eq!(log.waits, 0);
    assert!(log.submissions.is_empty());
    assert!(log.presents.is_empty());
    assert_eq!(surf.frame_count(), 0);
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
}

#[test]
fn stale_swapchain_is_rebuilt() {
    let mut surf = built_surface(800, 600);
    surf.backend_mut()
        .acquire_results
        .push_back(Err(SquallError::SWAPCHAIN_LOST));

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert!(!ctx.is_valid());
    assert_eq!(surf.loss(), SurfaceLoss::SwapchainLost);

    // finishing the skipped frame unwinds the loss
    surf.render_finish(ctx).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasDevice);
    assert_eq!(surf.loss(), SurfaceLoss::None);
    assert_eq!(surf.swapchain_image_count(), 0);
    // only the swapchain was stale, the device is fine
    assert_eq!(surf.backend().log.lost_devices, 0);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert!(ctx.is_valid());
    surf.render_finish(ctx).unwrap();
    assert_eq!(surf.frame_count(), 1);
    assert_eq!(surf.backend().log.swapchain_builds, 2);
}

#[test]
fn surface_lost_on_acquire_loses_window() {
    let mut surf = built_surface(800, 600);
    surf.backend_mut()
        .acquire_results
        .push_back(Err(SquallError::WINDOW_LOST));

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert!(!ctx.is_valid());
    surf.render_finish(ctx).unwrap();

    assert_eq!(surf.state(), SurfaceState::NoWindow);
    assert!(surf.backend().log.window_destroyed);
    assert_eq!(surf.backend().log.device_teardowns, 1);
}

#[test]
fn device_lost_on_present_rebinds_device() {
    let atlas = MockAtlas::new(16);
    let held = uploaded_image(&atlas, 200, 100);
    let dropped = uploaded_image(&atlas, 64, 64);
    drop(dropped);

    let mut surf = built_surface(800, 600);
    assert_eq!(surf.backend().device, Some(1));
    surf.backend_mut()
        .present_results
        .push_back(Err(SquallError::DEVICE_LOST));

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    assert!(ctx.is_valid());
    surf.render_finish(ctx).unwrap();

    // render_finish already unwound down to the window
    assert_eq!(surf.state(), SurfaceState::HasWindow);
    assert_eq!(surf.loss(), SurfaceLoss::None);
    assert_eq!(surf.backend().log.swapchain_teardowns, 1);
    assert_eq!(surf.backend().log.device_teardowns, 1);
    assert_eq!(surf.backend().log.lost_devices, 1);
    assert_eq!(surf.backend().device, None);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    assert_eq!(surf.backend().log.find_device, 2);
    assert_eq!(surf.backend().device, Some(2));

    // no pages leaked
    let pages = atlas.pages.lock();
    assert_eq!(pages.free_count(), pages.total_pages() - held.pages().len());
}

#[test]
fn minimized_window_waits_for_size() {
    init_logging();
    let mut backend = MockBackend::new(800, 600);
    backend.caps.current_extent = extent(0, 0);
    let mut surf = Surface::new(backend, 2, 1.0);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasDevice);
    assert_eq!(surf.backend().log.swapchain_builds, 0);

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert!(!ctx.is_valid());
    surf.render_finish(ctx).unwrap();

    // a zero sized request is also a minimized window
    surf.backend_mut().caps = caps(800, 600);
    surf.update(extent(0, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasDevice);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    assert_eq!(surf.current_extent(), extent(800, 600));
    assert_eq!(surf.backend().log.swapchain_builds, 1);
    assert_eq!(surf.backend().log.device_builds, 1);
}

#[test]
fn window_changed_during_build() {
    init_logging();
    let mut backend = MockBackend::new(800, 600);
    let mut shrunk = caps(640, 480);
    shrunk.max_image_extent = extent(640, 480);
    backend.caps_after_build = Some(shrunk);
    let mut surf = Surface::new(backend, 2, 1.0);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasDevice);
    assert_eq!(surf.loss(), SurfaceLoss::SwapchainLost);
    assert_eq!(surf.backend().log.swapchain_builds, 1);
    assert_eq!(surf.backend().log.swapchain_teardowns, 1);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    assert_eq!(surf.current_extent(), extent(640, 480));
}

#[test]
fn missing_device_is_reported() {
    init_logging();
    let mut backend = MockBackend::new(800, 600);
    backend.has_devices = false;
    let mut surf = Surface::new(backend, 2, 1.0);

    assert_eq!(
        surf.update(extent(800, 600)),
        Err(SquallError::NO_SUITABLE_DEVICE)
    );
    assert_eq!(surf.state(), SurfaceState::HasWindow);
    assert_eq!(surf.loss(), SurfaceLoss::DeviceLost);

    surf.backend_mut().has_devices = true;
    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
}

#[test]
fn set_device_replaces_device() {
    let mut surf = built_surface(800, 600);

    surf.set_device(7).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasWindow);
    assert_eq!(surf.backend().device, Some(7));
    assert_eq!(surf.backend().log.device_teardowns, 1);
    // replacing a device is not losing it
    assert_eq!(surf.backend().log.lost_devices, 0);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
    // the bound device is used instead of searching for one
    assert_eq!(surf.backend().log.find_device, 1);
    assert_eq!(surf.backend().log.device_builds, 2);
}

#[test]
fn frame_from_larger_swapchain_is_dropped() {
    init_logging();
    let mut surf = Surface::new(MockBackend::new(800, 600), 3, 1.0);
    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.swapchain_image_count(), 3);

    surf.backend_mut().acquire_results.push_back(Ok(Some(2)));
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    assert_eq!(ctx.frame_buffer_index(), Some(2));

    // the window grows and the new swapchain only has two images
    let mut smaller = caps(1024, 768);
    smaller.max_image_count = 2;
    surf.backend_mut().caps = smaller;
    surf.update(extent(1024, 768)).unwrap();
    assert_eq!(surf.swapchain_image_count(), 2);
    assert_ne!(ctx.swapchain_generation(), surf.swapchain_generation());

    surf.render_finish(ctx).unwrap();

    let log = &surf.backend().log;
    assert!(log.frames_begun.is_empty());
    assert!(log.submissions.is_empty());
    assert!(log.presents.is_empty());
    assert_eq!(surf.frame_count(), 0);
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);

    // the spans came back and the next frame is drawn normally
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 1024.0, 768.0));
    assert_eq!(ctx.frame_buffer_index(), Some(0));
    surf.render_finish(ctx).unwrap();
    assert_eq!(surf.backend().log.presents, vec![0]);
}

#[test]
fn frame_from_rebuilt_swapchain_is_dropped() {
    let mut surf = built_surface(800, 600);
    let generation = surf.swapchain_generation();

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    assert_eq!(ctx.frame_buffer_index(), Some(0));
    assert_eq!(ctx.swapchain_generation(), generation);

    // same number of images, but none of them was acquired
    surf.backend_mut().caps = caps(1024, 768);
    surf.update(extent(1024, 768)).unwrap();
    assert_eq!(surf.swapchain_image_count(), 2);
    assert!(surf.swapchain_generation() > generation);

    surf.render_finish(ctx).unwrap();
    assert!(surf.backend().log.submissions.is_empty());
    assert!(surf.backend().log.presents.is_empty());
    assert_eq!(surf.backend().log.acquires, 1);

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 1024.0, 768.0));
    assert_eq!(ctx.swapchain_generation(), surf.swapchain_generation());
    surf.render_finish(ctx).unwrap();

    let log = &surf.backend().log;
    assert_eq!(log.acquires, 2);
    assert_eq!(log.frames_begun, vec![(0, true)]);
    assert_eq!(log.presents, vec![0]);
}

#[test]
fn delegates_follow_pipeline_lifetime() {
    let mut surf = built_surface(800, 600);
    let events = surf.backend().events.clone();
    take_events(&events);

    let a = surf.add_delegate(RecordingDelegate::boxed("a", &events)).unwrap();
    let b = surf.add_delegate(RecordingDelegate::boxed("b", &events)).unwrap();
    assert_ne!(a, b);
    assert_eq!(surf.delegate_count(), 2);
    assert_eq!(
        take_events(&events),
        vec![
            "a build device 1",
            "a build swapchain 800x600",
            "b build device 1",
            "b build swapchain 800x600",
        ]
    );
    assert_eq!(surf.backend().log.semaphores_created, 2);

    // each draw waits on the one before, the UI waits on the last
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    surf.render_finish(ctx).unwrap();
    assert_eq!(
        take_events(&events),
        vec![
            "begin 0",
            "a draw waits 500 signals 1001",
            "b draw waits 1001 signals 1002",
            "submit waits 1002",
            "present 0",
        ]
    );

    // delegates go before the pipelines on teardown, after them on build
    surf.backend_mut().caps = caps(1024, 768);
    surf.update(extent(1024, 768)).unwrap();
    assert_eq!(
        take_events(&events),
        vec![
            "idle",
            "a teardown swapchain",
            "b teardown swapchain",
            "teardown swapchain",
            "build swapchain",
            "a build swapchain 1024x768",
            "b build swapchain 1024x768",
        ]
    );

    assert!(surf.remove_delegate(a).is_some());
    assert!(surf.remove_delegate(a).is_none());
    assert_eq!(
        take_events(&events),
        vec!["idle", "a teardown swapchain", "a teardown device"]
    );
    assert_eq!(
        surf.backend().log.semaphores_destroyed,
        vec![vk::Semaphore::from_raw(1001)]
    );

    surf.backend_mut()
        .present_results
        .push_back(Err(SquallError::DEVICE_LOST));
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 1024.0, 768.0));
    surf.render_finish(ctx).unwrap();
    assert_eq!(
        take_events(&events),
        vec![
            "begin 0",
            "b draw waits 500 signals 1002",
            "submit waits 1002",
            "present 0",
            "idle",
            "b teardown swapchain",
            "teardown swapchain",
            "idle",
            "b teardown device",
            "teardown device",
        ]
    );
    assert_eq!(
        surf.backend().log.semaphores_destroyed,
        vec![vk::Semaphore::from_raw(1001), vk::Semaphore::from_raw(1002)]
    );

    surf.update(extent(1024, 768)).unwrap();
    assert_eq!(
        take_events(&events),
        vec![
            "build device",
            "b build device 2",
            "build swapchain",
            "b build swapchain 1024x768",
        ]
    );
    assert_eq!(surf.delegate_count(), 1);
}

#[test]
fn delegate_added_without_device_is_built_later() {
    init_logging();
    let mut surf = Surface::new(MockBackend::new(800, 600), 2, 1.0);
    let events = surf.backend().events.clone();

    surf.add_delegate(RecordingDelegate::boxed("d", &events)).unwrap();
    assert!(take_events(&events).is_empty());
    assert_eq!(surf.backend().log.semaphores_created, 0);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(
        take_events(&events),
        vec![
            "build device",
            "d build device 1",
            "build swapchain",
            "d build swapchain 800x600",
        ]
    );
    assert_eq!(surf.backend().log.semaphores_created, 1);
}

#[test]
fn failing_delegate_skips_frame() {
    let mut surf = built_surface(800, 600);
    let events = surf.backend().events.clone();
    let mut delegate = RecordingDelegate::boxed("d", &events);
    delegate.draw_error = Some(SquallError::SWAPCHAIN_LOST);
    surf.add_delegate(delegate).unwrap();

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    surf.render_finish(ctx).unwrap();

    let log = &surf.backend().log;
    assert!(log.submissions.is_empty());
    assert!(log.presents.is_empty());
    assert_eq!(surf.frame_count(), 0);
    assert_eq!(surf.state(), SurfaceState::HasDevice);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::HasSwapchain);
}

#[test]
fn lost_window_is_terminal() {
    let mut surf = built_surface(800, 600);

    surf.set_window_lost();
    assert_eq!(surf.state(), SurfaceState::NoWindow);
    assert!(surf.backend().log.window_destroyed);

    surf.update(extent(800, 600)).unwrap();
    assert_eq!(surf.state(), SurfaceState::NoWindow);
    assert_eq!(surf.set_device(3), Err(SquallError::INVALID_STATE));

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 100.0, 100.0));
    assert!(!ctx.is_valid());
    surf.render_finish(ctx).unwrap();
}

#[test]
fn vertex_overrun_drops_and_counts() {
    let mut surf = built_surface(800, 600);
    let attrs = BoxAttributes::default();

    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
    for _ in 0..5000 {
        assert!(ctx.draw_box(&rect, &rect, &attrs));
    }
    assert_eq!(ctx.boxes().len(), 20000);
    assert_eq!(ctx.boxes().overflow_count(), 0);

    let dropped_before = dropped_vertices();
    for _ in 5000..17500 {
        ctx.draw_box(&rect, &rect, &attrs);
    }
    assert_eq!(ctx.boxes().len(), MAX_VERTICES);
    assert_eq!(ctx.boxes().overflow_count(), 70000 - MAX_VERTICES);
    assert!(dropped_vertices() >= dropped_before + 70000 - MAX_VERTICES);

    // the frame is still submitted
    surf.render_finish(ctx).unwrap();
    assert_eq!(surf.backend().log.box_vertices, vec![MAX_VERTICES]);

    // spans are cleared for the next frame
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    assert!(ctx.boxes().is_empty());
    surf.render_finish(ctx).unwrap();
}

#[test]
fn dropped_vertices_are_counted_without_pushing() {
    let mut span: VertexSpan<u32> = VertexSpan::new(8);
    assert!(span.push_quad([1, 2, 3, 4]));

    let dropped_before = dropped_vertices();
    span.count_dropped(4);
    assert_eq!(span.len(), 4);
    assert_eq!(span.overflow_count(), 4);
    assert!(dropped_vertices() >= dropped_before + 4);

    span.clear();
    assert_eq!(span.overflow_count(), 4);
}

#[test]
fn context_carries_frame_settings() {
    let mut surf = built_surface(800, 600);
    surf.set_saturation(0.5);
    surf.set_subpixel_orientation(SubpixelOrientation::VerticalBGR);

    let started = Instant::now();
    let ctx = surf.render_start(Rect::new(0.0, 0.0, 10.0, 10.0));
    // both swapchain images are shown before this one
    assert!(ctx.display_time() >= started + REFRESH_INTERVAL * 2);
    assert_eq!(ctx.saturation(), 0.5);
    assert_eq!(ctx.subpixel_orientation(), SubpixelOrientation::VerticalBGR);
    assert_eq!(ctx.frame_count(), 0);
    surf.render_finish(ctx).unwrap();

    let ctx = surf.render_start(Rect::new(0.0, 0.0, 10.0, 10.0));
    assert_eq!(ctx.frame_count(), 1);
    surf.render_finish(ctx).unwrap();
}

#[test]
fn count_and_size_clamping() {
    let mut c = caps(800, 600);
    c.min_image_count = 3;
    assert_eq!(clamp_count_and_size(2, extent(800, 600), &c).0, 3);

    c.min_image_count = 1;
    assert_eq!(clamp_count_and_size(5, extent(800, 600), &c).0, 3);

    c.max_image_count = 2;
    assert_eq!(clamp_count_and_size(3, extent(800, 600), &c).0, 2);

    assert_eq!(
        clamp_count_and_size(2, extent(8000, 0), &c).1,
        extent(4096, 1)
    );
}

#[test]
fn minimized_detection() {
    let c = caps(800, 600);
    assert!(!is_minimized(extent(800, 600), &c));
    assert!(is_minimized(extent(0, 600), &c));

    let mut c = caps(0, 0);
    assert!(is_minimized(extent(800, 600), &c));
    c.current_extent = extent(800, 600);
    c.max_image_extent = extent(0, 0);
    assert!(is_minimized(extent(800, 600), &c));
}

#[test]
fn scissor_is_flipped_and_clamped() {
    let full = vulkan_scissor(&Rect::new(0.0, 0.0, 800.0, 600.0), extent(800, 600));
    assert_eq!(full.offset, vk::Offset2D { x: 0, y: 0 });
    assert_eq!(full.extent, extent(800, 600));

    let clamped = vulkan_scissor(&Rect::new(700.0, -20.0, 200.0, 100.0), extent(800, 600));
    assert_eq!(clamped.offset, vk::Offset2D { x: 700, y: 520 });
    assert_eq!(clamped.extent, extent(100, 80));

    let outside = vulkan_scissor(&Rect::new(900.0, 0.0, 10.0, 10.0), extent(800, 600));
    assert_eq!(outside.extent, extent(0, 0));
}

// ------------------------------------------------------------------
// Drawing helpers
// ------------------------------------------------------------------

#[test]
fn border_side_adjusts_box() {
    let rect = Rect::new(10.0, 10.0, 100.0, 50.0);
    let mut attrs = BoxAttributes {
        line_width: 4.0,
        corner_radii: [8.0, 8.0, 1.0, 0.0],
        ..Default::default()
    };

    let (shape, radii) = adjust_for_border(&rect, &attrs);
    assert_eq!(shape, rect);
    assert_eq!(radii, attrs.corner_radii);

    attrs.border_side = BorderSide::Inside;
    let (shape, radii) = adjust_for_border(&rect, &attrs);
    assert_eq!(shape, Rect::new(12.0, 12.0, 96.0, 46.0));
    assert_eq!(radii, [6.0, 6.0, 0.0, 0.0]);

    attrs.border_side = BorderSide::Outside;
    let (shape, radii) = adjust_for_border(&rect, &attrs);
    assert_eq!(shape, Rect::new(8.0, 8.0, 104.0, 54.0));
    assert_eq!(radii, [10.0, 10.0, 3.0, 2.0]);
}

#[test]
fn box_vertices_describe_shape() {
    let mut surf = built_surface(800, 600);
    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    ctx.set_depth(0.25);

    let clip = Rect::new(0.0, 0.0, 800.0, 600.0);
    let attrs = BoxAttributes {
        fill_color: [1.0, 0.0, 0.0, 1.0],
        line_width: 4.0,
        border_side: BorderSide::Inside,
        ..Default::default()
    };
    assert!(ctx.draw_box(&clip, &Rect::new(10.0, 10.0, 100.0, 50.0), &attrs));

    let v = ctx.boxes().as_slice();
    assert_eq!(v.len(), 4);
    // shape (12,12)-(108,58) grown by half the line plus a pixel
    assert_eq!((v[0].position.x, v[0].position.y), (9.0, 9.0));
    assert_eq!((v[3].position.x, v[3].position.y), (111.0, 61.0));
    assert_eq!(v[0].position.z, 0.25);
    assert_eq!(v[0].corner_coordinate.x, 9.0 - 60.0);
    assert_eq!(v[0].corner_coordinate.y, 9.0 - 35.0);
    assert_eq!(v[0].corner_coordinate.z, 48.0);
    assert_eq!(v[0].corner_coordinate.w, 23.0);
    assert_eq!(v[2].clipping_rectangle.w, 600.0);
    surf.render_finish(ctx).unwrap();
}

#[test]
fn only_uploaded_images_draw() {
    let atlas = MockAtlas::new(16);
    let mut surf = built_surface(800, 600);
    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    let clip = Rect::new(0.0, 0.0, 800.0, 600.0);
    let dst = Rect::new(0.0, 0.0, 100.0, 70.0);

    let mut image = PagedImage::new(atlas.clone(), 100, 70).unwrap();
    assert!(!ctx.draw_image(&clip, &dst, &image));
    image.begin_drawing();
    assert_eq!(image.state(), PagedImageState::Drawing);
    assert!(!ctx.draw_image(&clip, &dst, &image));
    assert!(ctx.images().is_empty());

    image.upload(&Pixmap::new(100, 70)).unwrap();
    assert!(ctx.draw_image(&clip, &dst, &image));
    // 2x2 pages
    assert_eq!(ctx.images().len(), 16);
    let (ax, ay, layer) = atlas_position(image.pages()[0]);
    let first = ctx.images().as_slice()[0];
    assert_eq!(first.atlas_position.x, ax as f32);
    assert_eq!(first.atlas_position.y, ay as f32);
    assert_eq!(first.atlas_position.z, layer as f32);

    assert!(!ctx.draw_image(&clip, &dst, &PagedImage::default()));
    surf.render_finish(ctx).unwrap();
}

#[test]
fn glyph_quad_samples_atlas() {
    let mut surf = built_surface(800, 600);
    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    let clip = Rect::new(0.0, 0.0, 800.0, 600.0);
    let glyph = GlyphRect {
        layer: 1,
        x: 10,
        y: 20,
        w: 8,
        h: 12,
    };
    let color = [0.0, 0.0, 0.0, 1.0];

    assert!(ctx.draw_glyph(&clip, &Rect::new(5.0, 5.0, 8.0, 12.0), &glyph, color));
    let v = ctx.glyphs().as_slice();
    assert_eq!(v.len(), 4);
    assert_eq!(
        (v[0].texture_coord.x, v[0].texture_coord.y, v[0].texture_coord.z),
        (10.0, 20.0, 1.0)
    );
    assert_eq!(
        (v[3].texture_coord.x, v[3].texture_coord.y, v[3].texture_coord.z),
        (18.0, 32.0, 1.0)
    );
    assert_eq!((v[3].position.x, v[3].position.y), (13.0, 17.0));

    assert!(!ctx.draw_glyph(&clip, &Rect::new(5.0, 5.0, 8.0, 12.0), &GlyphRect::default(), color));
    surf.render_finish(ctx).unwrap();
}

#[test]
fn full_glyph_span_draws_magenta_box() {
    let mut surf = built_surface(800, 600);
    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    let clip = Rect::new(0.0, 0.0, 800.0, 600.0);
    let glyph = GlyphRect {
        layer: 0,
        x: 0,
        y: 0,
        w: 8,
        h: 8,
    };

    while !ctx.glyphs().is_full() {
        assert!(ctx.draw_glyph(&clip, &Rect::new(0.0, 0.0, 8.0, 8.0), &glyph, [1.0; 4]));
    }
    assert!(!ctx.draw_glyph(&clip, &Rect::new(0.0, 0.0, 8.0, 8.0), &glyph, [1.0; 4]));

    assert_eq!(ctx.glyphs().overflow_count(), 4);
    assert_eq!(ctx.glyphs().len(), MAX_VERTICES);
    assert_eq!(ctx.boxes().len(), 4);
    assert_eq!(ctx.boxes().as_slice()[0].fill_color.y, 0.0);
    assert_eq!(ctx.boxes().as_slice()[0].fill_color.z, 1.0);
    surf.render_finish(ctx).unwrap();
}

#[test]
fn alpha_override_quad() {
    let mut surf = built_surface(800, 600);
    let mut ctx = surf.render_start(Rect::new(0.0, 0.0, 800.0, 600.0));
    let clip = Rect::new(0.0, 0.0, 800.0, 600.0);

    assert!(ctx.override_alpha(&clip, &Rect::new(0.0, 0.0, 50.0, 50.0), 0.0));
    assert_eq!(ctx.overrides().len(), 4);
    assert!(ctx.overrides().as_slice().iter().all(|v| v.alpha == 0.0));
    surf.render_finish(ctx).unwrap();
}

// ------------------------------------------------------------------
// Atlas
// ------------------------------------------------------------------

#[test]
fn page_counts() {
    assert_eq!(page_count(0, 10), 0);
    assert_eq!(page_count(10, 0), 0);
    assert_eq!(page_count(1, 1), 1);
    assert_eq!(page_count(64, 64), 1);
    assert_eq!(page_count(65, 64), 2);
    assert_eq!(page_count(100, 70), 4);
    assert_eq!(page_count(2048, 2048), 1024);

    let atlas = MockAtlas::new(16);
    for (w, h) in [(1, 1), (64, 200), (300, 65)] {
        let image = PagedImage::new(atlas.clone(), w, h).unwrap();
        assert_eq!(image.pages().len(), page_count(w, h));
    }
}

#[test]
fn atlas_grows_by_whole_images() {
    let mut pages = PageAllocator::new(16);
    let mut added = Vec::new();

    let big = pages
        .allocate(page_count(2048, 2048), |nr| {
            added.push(nr);
            Ok(())
        })
        .unwrap();
    assert_eq!(big.len(), 1024);
    assert_eq!(added, vec![0, 1, 2, 3]);
    assert_eq!(pages.version(), 4);
    assert_eq!(pages.free_count(), 0);

    // freeing never shrinks the atlas
    pages.free(&big);
    assert_eq!(pages.version(), 4);
    let small = pages.allocate(10, |_| panic!("the atlas has room")).unwrap();
    assert_eq!(small.len(), 10);
    assert_eq!(pages.version(), 4);

    let more = pages.allocate(PAGES_PER_IMAGE * 4, |_| Ok(())).unwrap();
    assert_eq!(more.len(), PAGES_PER_IMAGE * 4);
    assert_eq!(pages.version(), 5);
}

#[test]
fn atlas_reports_exhaustion() {
    let mut pages = PageAllocator::new(1);

    assert!(pages.allocate(PAGES_PER_IMAGE, |_| Ok(())).is_ok());
    assert_eq!(
        pages.allocate(1, |_| Ok(())),
        Err(SquallError::VRAM_EXHAUSTED)
    );
    assert_eq!(pages.version(), 1);
}

#[test]
fn paged_image_returns_pages() {
    let atlas = MockAtlas::new(16);
    let image = PagedImage::new(atlas.clone(), 200, 100).unwrap();
    let held: Vec<PageIndex> = image.pages().to_vec();

    {
        let pages = atlas.pages.lock();
        assert!(held.iter().all(|p| !pages.is_free(*p)));
        assert_eq!(pages.free_count(), pages.total_pages() - held.len());
    }

    // moving keeps the pages with the image
    let moved = image;
    assert_eq!(moved.pages(), held.as_slice());
    drop(moved);

    let pages = atlas.pages.lock();
    assert!(held.iter().all(|p| pages.is_free(*p)));
    assert_eq!(pages.free_count(), pages.total_pages());
}

#[test]
fn empty_paged_image() {
    let atlas = MockAtlas::new(16);
    let mut image = PagedImage::new(atlas.clone(), 0, 32).unwrap();

    assert!(image.is_empty());
    assert!(image.pages().is_empty());
    assert_eq!(atlas.pages.lock().version(), 0);

    image.upload(&Pixmap::new(0, 32)).unwrap();
    assert_eq!(image.state(), PagedImageState::Uploaded);
    assert_eq!(*atlas.uploads.lock(), 0);

    let mut placed = 0;
    place_pages(
        &Rect::new(0.0, 0.0, 10.0, 10.0),
        image.width(),
        image.height(),
        image.pages(),
        |_| placed += 1,
    );
    assert_eq!(placed, 0);
}

#[test]
fn upload_checks_size() {
    let atlas = MockAtlas::new(16);
    let mut image = PagedImage::new(atlas.clone(), 10, 10).unwrap();

    assert_eq!(
        image.upload(&Pixmap::new(10, 11)),
        Err(SquallError::INVALID_PIXMAP_SIZE(10, 11))
    );
    assert_eq!(image.state(), PagedImageState::Uninitialized);

    // the null device ignores uploads
    let mut null = PagedImage::default();
    null.begin_drawing();
    assert_eq!(null.state(), PagedImageState::Uninitialized);
    assert!(null.upload(&Pixmap::new(3, 3)).is_ok());
}

#[test]
fn edge_pages_are_clipped() {
    let pages: Vec<PageIndex> = (0..4).collect();
    let mut quads = Vec::new();
    place_pages(&Rect::new(0.0, 0.0, 100.0, 70.0), 100, 70, &pages, |q| {
        quads.push(q)
    });

    assert_eq!(quads.len(), 4);
    assert_eq!(quads[0].corners[0], (0.0, 0.0));
    assert_eq!(quads[0].corners[3], (64.0, 64.0));
    // right column only covers the last 36 pixels
    assert_eq!(quads[1].corners[3], (100.0, 64.0));
    let (ax, ay, _) = atlas_position(1);
    assert_eq!(quads[1].uv[3], ((ax + 36) as f32, (ay + PAGE_SIZE) as f32));
    // top row only covers 6 pixels
    assert_eq!(quads[3].corners[0], (64.0, 64.0));
    assert_eq!(quads[3].corners[3], (100.0, 70.0));
}

#[test]
fn staged_image_has_border() {
    let mut src = Pixmap::new(2, 2);
    src.set(0, 0, Rgba16F::new(1.0, 0.0, 0.0, 1.0));
    src.set(1, 0, Rgba16F::new(0.0, 1.0, 0.0, 1.0));
    src.set(0, 1, Rgba16F::new(0.0, 0.0, 1.0, 1.0));
    src.set(1, 1, Rgba16F::new(1.0, 1.0, 1.0, 1.0));

    let staged = stage_with_border(&src);
    assert_eq!((staged.width(), staged.height()), (PAGE_SIZE + 2, PAGE_SIZE + 2));
    assert_eq!(staged.get(1, 1), src.get(0, 0));
    assert_eq!(staged.get(0, 1), src.get(0, 0));
    assert_eq!(staged.get(3, 1), src.get(1, 0));
    assert_eq!(staged.get(0, 0), src.get(0, 0));
    assert_eq!(staged.get(3, 3), src.get(1, 1));
    assert!(staged.get(10, 10).is_transparent());

    let clear = stage_with_border(&Pixmap::new(2, 2));
    assert!(clear.pixels().iter().all(|p| p.is_transparent()));
}

#[test]
fn glyphs_are_packed_in_shelves() {
    let mut shelves = ShelfAllocator::new(16, 2);
    let mut images = 0;
    let mut add = |_: usize| -> sq::Result<()> {
        images += 1;
        Ok(())
    };

    let r = |layer, x, y, w, h| GlyphRect {
        layer: layer,
        x: x,
        y: y,
        w: w,
        h: h,
    };
    assert_eq!(shelves.place(6, 4, &mut add), Ok(r(0, 0, 0, 6, 4)));
    assert_eq!(shelves.place(6, 4, &mut add), Ok(r(0, 7, 0, 6, 4)));
    // does not fit in the row, starts a new one below the gap
    assert_eq!(shelves.place(6, 4, &mut add), Ok(r(0, 0, 5, 6, 4)));
    // does not fit below, starts a new image
    assert_eq!(shelves.place(16, 12, &mut add), Ok(r(1, 0, 0, 16, 12)));

    assert_eq!(
        shelves.place(17, 1, &mut add),
        Err(SquallError::IMAGE_TOO_LARGE(17, 1))
    );
    assert_eq!(
        shelves.place(16, 16, &mut add),
        Err(SquallError::VRAM_EXHAUSTED)
    );
    assert_eq!(shelves.image_count(), 2);
    drop(add);
    assert_eq!(images, 2);
}

#[test]
fn sdf_atlas_fills_every_image() {
    let mut shelves = ShelfAllocator::new(SDF_IMAGE_AXIS, SDF_MAX_IMAGES);
    let mut created = Vec::new();
    let mut add = |n: usize| -> sq::Result<()> {
        created.push(n);
        Ok(())
    };

    // three rows of three glyphs, with the gap a fourth does not fit
    let per_image = 9;
    let mut rects = Vec::new();
    for _ in 0..per_image * SDF_MAX_IMAGES {
        rects.push(
            shelves
                .place(SDF_STAGING_AXIS, SDF_STAGING_AXIS, &mut add)
                .unwrap(),
        );
    }
    let at = |i: usize| (rects[i].layer, rects[i].x, rects[i].y);
    assert_eq!(at(2), (0, 130, 0));
    assert_eq!(at(3), (0, 0, 65));
    assert_eq!(at(8), (0, 130, 130));
    assert_eq!(at(9), (1, 0, 0));
    assert_eq!(at(per_image * SDF_MAX_IMAGES - 1), (SDF_MAX_IMAGES - 1, 130, 130));

    // small glyphs still use what is left of the last row
    assert_eq!(
        shelves.place(8, 8, &mut add).map(|r| (r.layer, r.x, r.y)),
        Ok((SDF_MAX_IMAGES - 1, 195, 130))
    );
    assert_eq!(
        shelves.place(SDF_STAGING_AXIS, SDF_STAGING_AXIS, &mut add),
        Err(SquallError::VRAM_EXHAUSTED)
    );
    assert_eq!(
        shelves.place(SDF_IMAGE_AXIS + 1, 1, &mut add),
        Err(SquallError::IMAGE_TOO_LARGE(SDF_IMAGE_AXIS + 1, 1))
    );

    drop(add);
    assert_eq!(created, (0..SDF_MAX_IMAGES).collect::<Vec<_>>());
    assert_eq!(shelves.image_count(), SDF_MAX_IMAGES);
}

// ------------------------------------------------------------------
// Pipelines and render pass
// ------------------------------------------------------------------

#[test]
fn descriptor_versions_only_grow() {
    let mut version = DescriptorVersion::default();
    assert!(!version.needs_update(0));
    assert!(version.needs_update(1));

    version.record(4);
    assert!(!version.needs_update(4));
    assert!(!version.needs_update(3));
    assert!(version.needs_update(5));

    version.reset();
    assert!(version.needs_update(4));
}

#[test]
fn atlas_descriptors_are_rewritten_when_the_atlas_grows() {
    let mut version = DescriptorVersion::default();
    // nothing to point the set at yet
    assert!(!version.needs_rewrite(0, 0));
    assert!(!version.needs_rewrite(1, 0));
    assert!(version.needs_rewrite(1, 1));

    version.record(1);
    assert!(!version.needs_rewrite(1, 1));
    // a new atlas image was added
    assert!(version.needs_rewrite(2, 2));
    version.record(2);
    assert!(!version.needs_rewrite(2, 2));

    // a device rebuild creates an unwritten set
    version.reset();
    assert!(version.needs_rewrite(2, 2));
    assert_eq!(AtlasDescriptors::null().version(), 0);
}

#[test]
fn fresh_images_transition_after_acquire() {
    let ((src_access, src_stage), (dst_access, dst_stage)) =
        sq::swapchain::present_transition_masks();

    // the stage the acquire semaphore is waited on
    assert_eq!(src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert!(src_access.is_empty());
    assert_eq!(
        dst_access,
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
    );
}

#[test]
fn subpixel_offsets() {
    let third = 1.0 / 3.0;
    assert_eq!(SubpixelOrientation::Unknown.offsets(), None);
    assert_eq!(
        SubpixelOrientation::HorizontalRGB.offsets(),
        Some(([-third, 0.0], [third, 0.0]))
    );
    assert_eq!(
        SubpixelOrientation::VerticalBGR.offsets(),
        Some(([0.0, -third], [0.0, third]))
    );

    let push = SdfPushConstants::new(extent(800, 600), SubpixelOrientation::HorizontalBGR);
    assert_eq!(push.has_subpixels, 1);
    assert_eq!(push.red_subpixel_offset, [third, 0.0]);
    assert_eq!(push.viewport_scale, [2.0 / 800.0, 2.0 / 600.0]);

    let push = SdfPushConstants::new(extent(800, 600), SubpixelOrientation::Unknown);
    assert_eq!(push.has_subpixels, 0);
}

#[test]
fn sdf_blending_depends_on_dual_source() {
    let dual = sdf_blend_attachment(true);
    assert_eq!(dual.src_color_blend_factor, vk::BlendFactor::ONE);
    assert_eq!(
        dual.dst_color_blend_factor,
        vk::BlendFactor::ONE_MINUS_SRC1_COLOR
    );

    let single = sdf_blend_attachment(false);
    assert_eq!(
        single.dst_color_blend_factor,
        vk::BlendFactor::ONE_MINUS_SRC_ALPHA
    );
    assert_eq!(single.blend_enable, vk::TRUE);
}

#[test]
fn subpasses_form_a_chain() {
    let deps = sq::swapchain::subpass_dependencies();
    assert_eq!(deps.len(), 6);
    assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
    assert_eq!(deps[5].dst_subpass, vk::SUBPASS_EXTERNAL);

    for (i, dep) in deps.iter().enumerate().skip(1).take(4) {
        assert_eq!(dep.src_subpass, i as u32 - 1);
        assert_eq!(dep.dst_subpass, i as u32);
    }
    assert!(deps
        .iter()
        .all(|d| d.dependency_flags == vk::DependencyFlags::BY_REGION));
    assert!(deps[4]
        .dst_access_mask
        .contains(vk::AccessFlags::INPUT_ATTACHMENT_READ));
}

#[test]
fn quad_index_pattern() {
    let indices = sq::device::quad_indices();
    assert_eq!(indices.len(), sq::vertex_span::MAX_QUADS * 6);
    assert_eq!(&indices[..12], &[0, 1, 2, 2, 1, 3, 4, 5, 6, 6, 5, 7]);
    assert_eq!(*indices.last().unwrap(), (MAX_VERTICES - 1) as u16);
}

#[test]
fn surface_format_scores() {
    let srgb = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    let hdr = vk::SurfaceFormatKHR {
        format: vk::Format::R16G16B16A16_SFLOAT,
        color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_NONLINEAR_EXT,
    };
    let formats = [srgb, hdr];

    assert_eq!(
        sq::platform::choose_surface_format(&formats, false).map(|(_, f)| f),
        Some(srgb)
    );
    assert_eq!(
        sq::platform::choose_surface_format(&formats, true).map(|(_, f)| f),
        Some(hdr)
    );
    assert_eq!(
        sq::platform::choose_present_mode(&[
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO
        ])
        .map(|(_, m)| m),
        Some(vk::PresentModeKHR::FIFO)
    );
    assert_eq!(
        sq::platform::select_queue_families(&[
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::COMPUTE, true),
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, true),
        ]),
        Some((2, 2))
    );
}
