//! Scene rasterization. Elements are drawn as SVG and, with the `png`
//! feature, rendered through resvg into an RGBA bitmap.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::element::{Asset, AssetId, ElementKind, LinearData, SceneElement, StrokeStyle};
use crate::error::RenderError;

/// Premultiplied RGBA pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

#[derive(Debug, Clone, Copy)]
pub struct RasterRequest<'a> {
    pub elements: &'a [SceneElement],
    pub assets: &'a BTreeMap<AssetId, Asset>,
    /// Longest bitmap edge; the scene is scaled to fit it.
    pub max_edge: u32,
    /// Scene-unit padding around the content bounds.
    pub padding: f32,
}

#[async_trait(?Send)]
pub trait Rasterizer {
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the scene is empty, the target size is
    /// invalid, or the bitmap cannot be produced.
    async fn rasterize(&self, request: &RasterRequest<'_>) -> Result<Bitmap, RenderError>;

    /// # Errors
    ///
    /// Returns a [`RenderError`] if the bitmap cannot be encoded.
    async fn encode_png(&self, bitmap: &Bitmap) -> Result<Vec<u8>, RenderError>;
}

/// Scene-space bounding box of the elements as `(min_x, min_y, max_x, max_y)`.
pub fn scene_bounds(elements: &[SceneElement]) -> Option<(f32, f32, f32, f32)> {
    let mut bounds: Option<(f32, f32, f32, f32)> = None;
    let mut extend = |x: f32, y: f32| {
        bounds = Some(match bounds {
            Some((x1, y1, x2, y2)) => (x1.min(x), y1.min(y), x2.max(x), y2.max(y)),
            None => (x, y, x, y),
        });
    };
    for element in elements {
        match element.linear() {
            Some(data) => {
                for [px, py] in &data.points {
                    extend(element.x + px, element.y + py);
                }
            }
            None => {
                extend(element.x, element.y);
                extend(element.x + element.width, element.y + element.height);
            }
        }
    }
    bounds
}

/// Pixel size of the scaled scene, longest edge equal to `max_edge`.
pub fn bitmap_size(content_width: f32, content_height: f32, max_edge: u32) -> (u32, u32) {
    let longest = content_width.max(content_height).max(f32::EPSILON);
    let scale = max_edge as f32 / longest;
    let w = (content_width * scale).round().max(1.0) as u32;
    let h = (content_height * scale).round().max(1.0) as u32;
    (w, h)
}

/// SVG document for the request, sized in pixels, with a transparent
/// background. Returns `None` for an empty scene.
pub fn render_scene_svg(request: &RasterRequest<'_>, font_family: &str) -> Option<(String, u32, u32)> {
    let (x1, y1, x2, y2) = scene_bounds(request.elements)?;
    let pad = request.padding.max(0.0);
    let view_x = x1 - pad;
    let view_y = y1 - pad;
    let view_w = (x2 - x1 + pad * 2.0).max(1.0);
    let view_h = (y2 - y1 + pad * 2.0).max(1.0);
    let (width, height) = bitmap_size(view_w, view_h, request.max_edge);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"{view_x:.2} {view_y:.2} {view_w:.2} {view_h:.2}\">"
    ));
    for element in request.elements {
        element_svg(&mut svg, element, request.assets, font_family);
    }
    svg.push_str("</svg>");
    Some((svg, width, height))
}

fn stroke_attrs(element: &SceneElement) -> String {
    let dash = match element.stroke_style {
        StrokeStyle::Solid => "",
        StrokeStyle::Dashed => " stroke-dasharray=\"8 6\"",
        StrokeStyle::Dotted => " stroke-dasharray=\"2 6\"",
    };
    format!(
        "stroke=\"{}\" stroke-width=\"{:.2}\"{dash}",
        escape_xml(&element.stroke_color),
        element.stroke_width
    )
}

fn fill_attr(element: &SceneElement) -> String {
    if element.background_color == "transparent" {
        "fill=\"none\"".to_string()
    } else {
        format!("fill=\"{}\"", escape_xml(&element.background_color))
    }
}

fn element_svg(svg: &mut String, element: &SceneElement, assets: &BTreeMap<AssetId, Asset>, font_family: &str) {
    let (x, y, w, h) = (element.x, element.y, element.width, element.height);
    match &element.kind {
        ElementKind::Rectangle => {
            let radius = if element.rounded { (w.min(h) * 0.25).min(16.0) } else { 0.0 };
            svg.push_str(&format!(
                "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"{radius:.2}\" {} {}/>",
                fill_attr(element),
                stroke_attrs(element)
            ));
        }
        ElementKind::Ellipse => {
            svg.push_str(&format!(
                "<ellipse cx=\"{:.2}\" cy=\"{:.2}\" rx=\"{:.2}\" ry=\"{:.2}\" {} {}/>",
                x + w / 2.0,
                y + h / 2.0,
                w / 2.0,
                h / 2.0,
                fill_attr(element),
                stroke_attrs(element)
            ));
        }
        ElementKind::Diamond => {
            let points = [(x + w / 2.0, y), (x + w, y + h / 2.0), (x + w / 2.0, y + h), (x, y + h / 2.0)];
            svg.push_str(&format!(
                "<polygon points=\"{}\" {} {}/>",
                polygon_points(&points),
                fill_attr(element),
                stroke_attrs(element)
            ));
        }
        ElementKind::Frame(frame) => {
            svg.push_str(&format!(
                "<rect x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" rx=\"8\" {} stroke=\"{}\" stroke-width=\"1\" stroke-dasharray=\"6 4\"/>",
                fill_attr(element),
                escape_xml(&element.stroke_color)
            ));
            if let Some(name) = &frame.name {
                svg.push_str(&format!(
                    "<text x=\"{:.2}\" y=\"{:.2}\" font-family=\"{}\" font-size=\"14\" fill=\"{}\">{}</text>",
                    x + 8.0,
                    y + 20.0,
                    escape_xml(font_family),
                    escape_xml(&element.stroke_color),
                    escape_xml(name)
                ));
            }
        }
        ElementKind::Text(text) => {
            let line_height = text.font_size * 1.25;
            let lines: Vec<&str> = text.text.split('\n').collect();
            let cx = x + w / 2.0;
            let start_y = y + h / 2.0 - line_height * lines.len() as f32 / 2.0 + text.font_size;
            svg.push_str(&format!(
                "<text x=\"{cx:.2}\" y=\"{start_y:.2}\" text-anchor=\"middle\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\">",
                escape_xml(font_family),
                text.font_size,
                escape_xml(&element.stroke_color)
            ));
            for (idx, line) in lines.iter().enumerate() {
                let dy = if idx == 0 { 0.0 } else { line_height };
                svg.push_str(&format!("<tspan x=\"{cx:.2}\" dy=\"{dy:.2}\">{}</tspan>", escape_xml(line)));
            }
            svg.push_str("</text>");
        }
        ElementKind::Arrow(data) | ElementKind::Line(data) => {
            linear_svg(svg, element, data);
        }
        ElementKind::Image(image) => {
            let Some(asset) = assets.get(&image.file_id) else {
                return;
            };
            svg.push_str(&format!(
                "<image x=\"{x:.2}\" y=\"{y:.2}\" width=\"{w:.2}\" height=\"{h:.2}\" preserveAspectRatio=\"xMidYMid meet\" href=\"data:{};base64,{}\"/>",
                escape_xml(&asset.mime_type),
                BASE64.encode(&asset.data)
            ));
        }
    }
}

fn linear_svg(svg: &mut String, element: &SceneElement, data: &LinearData) {
    let points: Vec<(f32, f32)> = data
        .points
        .iter()
        .map(|[px, py]| (element.x + px, element.y + py))
        .collect();
    if points.len() < 2 {
        return;
    }
    svg.push_str(&format!(
        "<path d=\"{}\" fill=\"none\" {}/>",
        points_to_path(&points),
        stroke_attrs(element)
    ));
    let color = escape_xml(&element.stroke_color);
    if data.end_arrowhead.is_some() {
        let tip = points[points.len() - 1];
        let from = points[points.len() - 2];
        svg.push_str(&format!("<polygon points=\"{}\" fill=\"{color}\"/>", polygon_points(&arrowhead(from, tip))));
    }
    if data.start_arrowhead.is_some() {
        svg.push_str(&format!(
            "<polygon points=\"{}\" fill=\"{color}\"/>",
            polygon_points(&arrowhead(points[1], points[0]))
        ));
    }
}

fn arrowhead(from: (f32, f32), tip: (f32, f32)) -> [(f32, f32); 3] {
    let (dx, dy) = (tip.0 - from.0, tip.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
    let (ux, uy) = (dx / len, dy / len);
    let size = 10.0;
    let base = (tip.0 - ux * size, tip.1 - uy * size);
    let half = size * 0.5;
    [tip, (base.0 - uy * half, base.1 + ux * half), (base.0 + uy * half, base.1 - ux * half)]
}

fn polygon_points(points: &[(f32, f32)]) -> String {
    points
        .iter()
        .map(|(x, y)| format!("{x:.2},{y:.2}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn points_to_path(points: &[(f32, f32)]) -> String {
    let mut d = String::new();
    for (idx, (x, y)) in points.iter().enumerate() {
        let op = if idx == 0 { "M" } else { " L" };
        d.push_str(&format!("{op} {x:.2} {y:.2}"));
    }
    d
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(feature = "png")]
pub use svg_rasterizer::SvgRasterizer;

#[cfg(feature = "png")]
mod svg_rasterizer {
    use std::sync::Arc;

    use async_trait::async_trait;
    use resvg::tiny_skia::{IntSize, Pixmap, Transform};
    use tracing::debug;

    use super::{Bitmap, RasterRequest, Rasterizer, render_scene_svg};
    use crate::config::PreviewConfig;
    use crate::error::RenderError;

    /// Renders through usvg/resvg, refusing bitmaps past the configured
    /// canvas limits.
    pub struct SvgRasterizer {
        font_family: String,
        max_canvas_edge: u32,
        max_canvas_area: u64,
        fontdb: Arc<usvg::fontdb::Database>,
    }

    impl SvgRasterizer {
        pub fn new(config: &PreviewConfig, font_family: &str) -> Self {
            let mut db = usvg::fontdb::Database::new();
            db.load_system_fonts();
            Self {
                font_family: font_family.to_string(),
                max_canvas_edge: config.max_canvas_edge,
                max_canvas_area: config.max_canvas_area,
                fontdb: Arc::new(db),
            }
        }

        fn check_limits(&self, width: u32, height: u32) -> Result<(), RenderError> {
            let area = u64::from(width) * u64::from(height);
            if width > self.max_canvas_edge || height > self.max_canvas_edge || area > self.max_canvas_area {
                return Err(RenderError::CanvasLimit { width, height });
            }
            Ok(())
        }
    }

    #[async_trait(?Send)]
    impl Rasterizer for SvgRasterizer {
        async fn rasterize(&self, request: &RasterRequest<'_>) -> Result<Bitmap, RenderError> {
            if request.max_edge == 0 {
                return Err(RenderError::InvalidSize { width: 0, height: 0 });
            }
            let (svg, width, height) =
                render_scene_svg(request, &self.font_family).ok_or(RenderError::EmptyScene)?;
            self.check_limits(width, height)?;

            let mut opt = usvg::Options::default();
            opt.font_family = self.font_family.clone();
            opt.fontdb = self.fontdb.clone();
            let tree = usvg::Tree::from_str(&svg, &opt).map_err(|err| RenderError::Rasterize(err.to_string()))?;
            let size = tree.size().to_int_size();
            let mut pixmap = Pixmap::new(size.width(), size.height()).ok_or(RenderError::InvalidSize {
                width: size.width(),
                height: size.height(),
            })?;
            resvg::render(&tree, Transform::default(), &mut pixmap.as_mut());
            debug!(width = pixmap.width(), height = pixmap.height(), "scene rasterized");
            Ok(Bitmap {
                width: pixmap.width(),
                height: pixmap.height(),
                pixels: pixmap.take(),
            })
        }

        async fn encode_png(&self, bitmap: &Bitmap) -> Result<Vec<u8>, RenderError> {
            self.check_limits(bitmap.width, bitmap.height)?;
            let size = IntSize::from_wh(bitmap.width, bitmap.height).ok_or(RenderError::InvalidSize {
                width: bitmap.width,
                height: bitmap.height,
            })?;
            let pixmap = Pixmap::from_vec(bitmap.pixels.clone(), size)
                .ok_or_else(|| RenderError::Encode("pixel buffer does not match bitmap size".to_string()))?;
            pixmap.encode_png().map_err(|err| RenderError::Encode(err.to_string()))
        }
    }
}
