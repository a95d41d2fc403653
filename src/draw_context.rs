// The per-frame drawing interface handed to the widget layer
//
// A DrawContext owns the vertex spans of the four quad pipelines for
// the duration of one frame. The widget layer fills them, either
// directly or through the helpers below, and hands the context back to
// `Surface::render_finish`.

use cgmath::{Vector3, Vector4};

use crate::atlas::place_pages;
use crate::paged_image::{PagedImage, PagedImageState};
use crate::pipelines::{BoxVertex, ImageVertex, OverrideVertex, SdfVertex, SubpixelOrientation};
use crate::sdf_atlas::GlyphRect;
use crate::vertex_span::VertexSpan;
use utils::region::Rect;

use std::time::{Duration, Instant};

/// Drawn in place of glyphs that did not fit
const OVERFLOW_COLOR: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

/// The vertex spans of one surface
///
/// These are reused from frame to frame.
#[derive(Debug, Default)]
pub struct FrameSpans {
    pub boxes: VertexSpan<BoxVertex>,
    pub images: VertexSpan<ImageVertex>,
    pub glyphs: VertexSpan<SdfVertex>,
    pub overrides: VertexSpan<OverrideVertex>,
}

impl FrameSpans {
    pub fn clear(&mut self) {
        self.boxes.clear();
        self.images.clear();
        self.glyphs.clear();
        self.overrides.clear();
    }
}

/// Where the line of a box is drawn relative to its rectangle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BorderSide {
    /// centered on the edge
    On,
    Inside,
    Outside,
}

impl Default for BorderSide {
    fn default() -> Self {
        BorderSide::On
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BoxAttributes {
    pub fill_color: [f32; 4],
    pub line_color: [f32; 4],
    pub line_width: f32,
    /// left-bottom, right-bottom, left-top, right-top
    pub corner_radii: [f32; 4],
    pub border_side: BorderSide,
}

fn clip_vector(clip: &Rect<f32>) -> Vector4<f32> {
    Vector4::new(clip.left(), clip.bottom(), clip.right(), clip.top())
}

fn quad_corners(rect: &Rect<f32>) -> [(f32, f32); 4] {
    [
        (rect.left(), rect.bottom()),
        (rect.right(), rect.bottom()),
        (rect.left(), rect.top()),
        (rect.right(), rect.top()),
    ]
}

/// Move the shape of a box so its line lands on the requested side
///
/// The box shader centers the line on the edge of the shape, so the
/// shape and its corner radii are shrunk or grown by half the line.
pub fn adjust_for_border(rect: &Rect<f32>, attrs: &BoxAttributes) -> (Rect<f32>, [f32; 4]) {
    let amount = match attrs.border_side {
        BorderSide::On => 0.0,
        BorderSide::Inside => -attrs.line_width * 0.5,
        BorderSide::Outside => attrs.line_width * 0.5,
    };

    let mut radii = attrs.corner_radii;
    for r in radii.iter_mut() {
        *r = (*r + amount).max(0.0);
    }
    (rect.expand(amount), radii)
}

/// Everything needed to draw one frame
///
/// A context without a frame buffer index is blank: nothing will be
/// submitted and the caller may skip producing vertices.
pub struct DrawContext {
    dc_frame_buffer_index: Option<u32>,
    /// swapchain the frame buffer index belongs to
    dc_generation: u64,
    dc_spans: FrameSpans,
    /// union of the redraw rectangles of every swapchain image
    dc_scissor: Rect<f32>,
    /// redraw rectangle of the acquired image
    dc_redraw: Rect<f32>,
    dc_frame_count: u64,
    /// when the frame is expected to be on screen
    dc_display_time: Instant,
    dc_subpixel_orientation: SubpixelOrientation,
    dc_saturation: f32,
    /// depth of the next primitive, larger values are in front
    dc_depth: f32,
}

impl DrawContext {
    /// A blank context, the spans are cleared
    pub(crate) fn new(
        mut spans: FrameSpans,
        frame_count: u64,
        latency: Duration,
        orientation: SubpixelOrientation,
        saturation: f32,
    ) -> Self {
        spans.clear();
        Self {
            dc_frame_buffer_index: None,
            dc_generation: 0,
            dc_spans: spans,
            dc_scissor: Rect::default(),
            dc_redraw: Rect::default(),
            dc_frame_count: frame_count,
            dc_display_time: Instant::now() + latency,
            dc_subpixel_orientation: orientation,
            dc_saturation: saturation,
            dc_depth: 0.0,
        }
    }

    pub(crate) fn set_frame(
        &mut self,
        index: u32,
        generation: u64,
        scissor: Rect<f32>,
        redraw: Rect<f32>,
    ) {
        self.dc_frame_buffer_index = Some(index);
        self.dc_generation = generation;
        self.dc_scissor = scissor;
        self.dc_redraw = redraw;
    }

    /// Give the spans back to the surface
    pub(crate) fn into_spans(self) -> FrameSpans {
        self.dc_spans
    }

    pub fn frame_buffer_index(&self) -> Option<u32> {
        self.dc_frame_buffer_index
    }

    /// The swapchain generation of the surface when this frame started
    pub fn swapchain_generation(&self) -> u64 {
        self.dc_generation
    }

    /// False if this frame should be skipped
    pub fn is_valid(&self) -> bool {
        self.dc_frame_buffer_index.is_some()
    }

    pub fn scissor_rectangle(&self) -> Rect<f32> {
        self.dc_scissor
    }

    pub fn redraw_rectangle(&self) -> Rect<f32> {
        self.dc_redraw
    }

    pub fn frame_count(&self) -> u64 {
        self.dc_frame_count
    }

    /// When the frame is expected to reach the screen, for animations
    pub fn display_time(&self) -> Instant {
        self.dc_display_time
    }

    pub fn subpixel_orientation(&self) -> SubpixelOrientation {
        self.dc_subpixel_orientation
    }

    pub fn saturation(&self) -> f32 {
        self.dc_saturation
    }

    pub fn depth(&self) -> f32 {
        self.dc_depth
    }

    /// Set the depth used by the helpers for following primitives
    pub fn set_depth(&mut self, depth: f32) {
        self.dc_depth = depth;
    }

    pub fn boxes(&self) -> &VertexSpan<BoxVertex> {
        &self.dc_spans.boxes
    }

    pub fn boxes_mut(&mut self) -> &mut VertexSpan<BoxVertex> {
        &mut self.dc_spans.boxes
    }

    pub fn images(&self) -> &VertexSpan<ImageVertex> {
        &self.dc_spans.images
    }

    pub fn images_mut(&mut self) -> &mut VertexSpan<ImageVertex> {
        &mut self.dc_spans.images
    }

    pub fn glyphs(&self) -> &VertexSpan<SdfVertex> {
        &self.dc_spans.glyphs
    }

    pub fn glyphs_mut(&mut self) -> &mut VertexSpan<SdfVertex> {
        &mut self.dc_spans.glyphs
    }

    pub fn overrides(&self) -> &VertexSpan<OverrideVertex> {
        &self.dc_spans.overrides
    }

    pub fn overrides_mut(&mut self) -> &mut VertexSpan<OverrideVertex> {
        &mut self.dc_spans.overrides
    }

    /// Draw a rounded box with an optional border
    ///
    /// The quad is grown past the shape by half the line width plus a
    /// pixel so the anti-aliased edge is not cut off.
    pub fn draw_box(&mut self, clip: &Rect<f32>, rect: &Rect<f32>, attrs: &BoxAttributes) -> bool {
        let (shape, radii) = adjust_for_border(rect, attrs);
        let quad = shape.expand(attrs.line_width * 0.5 + 1.0);

        let center = (
            shape.left() + shape.width() * 0.5,
            shape.bottom() + shape.height() * 0.5,
        );
        let half_size = (shape.width() * 0.5, shape.height() * 0.5);
        let clip = clip_vector(clip);
        let depth = self.dc_depth;

        let vertices = quad_corners(&quad).map(|(x, y)| BoxVertex {
            position: Vector3::new(x, y, depth),
            clipping_rectangle: clip,
            corner_coordinate: Vector4::new(x - center.0, y - center.1, half_size.0, half_size.1),
            fill_color: attrs.fill_color.into(),
            line_color: attrs.line_color.into(),
            corner_radii: radii.into(),
            line_width: attrs.line_width,
        });

        self.dc_spans.boxes.push_quad(vertices)
    }

    /// Draw `image` stretched over `rect`
    ///
    /// Only uploaded images are drawn. Returns false if the image was
    /// skipped or did not completely fit in the span.
    pub fn draw_image(&mut self, clip: &Rect<f32>, rect: &Rect<f32>, image: &PagedImage) -> bool {
        if image.state() != PagedImageState::Uploaded || image.is_empty() {
            return false;
        }

        let clip = clip_vector(clip);
        let depth = self.dc_depth;
        let span = &mut self.dc_spans.images;
        let mut placed = true;

        place_pages(rect, image.width(), image.height(), image.pages(), |quad| {
            let mut vertices = [ImageVertex {
                position: Vector3::new(0.0, 0.0, depth),
                clipping_rectangle: clip,
                atlas_position: Vector3::new(0.0, 0.0, quad.layer),
            }; 4];

            for (i, v) in vertices.iter_mut().enumerate() {
                v.position.x = quad.corners[i].0;
                v.position.y = quad.corners[i].1;
                v.atlas_position.x = quad.uv[i].0;
                v.atlas_position.y = quad.uv[i].1;
            }
            placed &= span.push_quad(vertices);
        });

        placed
    }

    /// Draw a glyph of the SDF atlas over `rect`
    ///
    /// If the glyph span is full a magenta box is drawn instead so that
    /// the missing text is noticed.
    pub fn draw_glyph(
        &mut self,
        clip: &Rect<f32>,
        rect: &Rect<f32>,
        glyph: &GlyphRect,
        color: [f32; 4],
    ) -> bool {
        if glyph.is_empty() {
            return false;
        }

        if self.dc_spans.glyphs.remaining() < 4 {
            self.dc_spans.glyphs.count_dropped(4);
            let attrs = BoxAttributes {
                fill_color: OVERFLOW_COLOR,
                ..Default::default()
            };
            self.draw_box(clip, rect, &attrs);
            return false;
        }

        let u0 = glyph.x as f32;
        let u1 = (glyph.x + glyph.w) as f32;
        let v0 = glyph.y as f32;
        let v1 = (glyph.y + glyph.h) as f32;
        let uv = [(u0, v0), (u1, v0), (u0, v1), (u1, v1)];
        let clip = clip_vector(clip);
        let depth = self.dc_depth;
        let layer = glyph.layer as f32;

        let corners = quad_corners(rect);
        let vertices = [0, 1, 2, 3].map(|i| SdfVertex {
            position: Vector3::new(corners[i].0, corners[i].1, depth),
            clipping_rectangle: clip,
            texture_coord: Vector3::new(uv[i].0, uv[i].1, layer),
            color: color.into(),
        });

        self.dc_spans.glyphs.push_quad(vertices)
    }

    /// Replace the alpha of everything drawn below `rect`
    pub fn override_alpha(&mut self, clip: &Rect<f32>, rect: &Rect<f32>, alpha: f32) -> bool {
        let clip = clip_vector(clip);
        let depth = self.dc_depth;

        let vertices = quad_corners(rect).map(|(x, y)| OverrideVertex {
            position: Vector3::new(x, y, depth),
            clipping_rectangle: clip,
            alpha: alpha,
        });

        self.dc_spans.overrides.push_quad(vertices)
    }
}
