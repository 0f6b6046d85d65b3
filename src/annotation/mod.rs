use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const DEFAULT_COLOR: &str = "#ff0000";
const FALLBACK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

// ===================================================================
// Geometry
// ===================================================================

/// The drawing surface laid exactly over the displayed image: its size is
/// the image's displayed size (after zoom) and its offset is where the image
/// sits on screen (after pan).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_y: f32,
}

impl Overlay {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn with_offset(self, offset_x: f32, offset_y: f32) -> Self {
        Self {
            offset_x,
            offset_y,
            ..self
        }
    }

    /// Surface coordinates to image-local displayed pixels, or `None` when
    /// the point falls outside the image.
    pub fn to_local(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        let (lx, ly) = (x - self.offset_x, y - self.offset_y);
        ((0.0..=self.width).contains(&lx) && (0.0..=self.height).contains(&ly)).then_some((lx, ly))
    }

    /// Per-axis factor from displayed pixels to native pixels.
    pub fn scale_to(&self, native_width: u32, native_height: u32) -> (f32, f32) {
        let factor = |native: u32, displayed: f32| {
            if displayed > 0.0 {
                native as f32 / displayed
            } else {
                1.0
            }
        };
        (
            factor(native_width, self.width),
            factor(native_height, self.height),
        )
    }
}

// ===================================================================
// Drawings
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawingKind {
    Pen,
    Circle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drawing {
    pub kind: DrawingKind,
    /// Flat `x, y, x, y, ...` in displayed pixel space.
    pub points: Vec<f32>,
    pub color: String,
}

impl Drawing {
    pub fn point_pairs(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.points.chunks_exact(2).map(|p| (p[0], p[1]))
    }

    /// Points rescaled into another pixel space.
    pub fn scaled(&self, sx: f32, sy: f32) -> Vec<(f32, f32)> {
        self.point_pairs().map(|(x, y)| (x * sx, y * sy)).collect()
    }
}

// ===================================================================
// Canvas state machine
// ===================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Idle,
    DrawingPen,
    DrawingCircle,
}

/// Marks drawn over the selected plan's image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    tool: Tool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overlay: Option<Overlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stroke: Option<Vec<f32>>,
    #[serde(default)]
    drawings: Vec<Drawing>,
    color: String,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(DEFAULT_COLOR)
    }
}

impl Canvas {
    pub fn new(color: &str) -> Self {
        Self {
            tool: Tool::Idle,
            overlay: None,
            stroke: None,
            drawings: Vec::new(),
            color: color.to_string(),
        }
    }

    #[cfg(test)]
    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn drawings(&self) -> &[Drawing] {
        &self.drawings
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.overlay
    }

    pub fn set_color(&mut self, color: &str) {
        self.color = color.to_string();
    }

    /// Resize or move the overlay to follow the displayed image. Existing
    /// drawings are rescaled so they stay on the same image features.
    pub fn set_overlay(&mut self, overlay: Overlay) {
        if let Some(old) = self.overlay {
            if old.width > 0.0 && old.height > 0.0 {
                let (sx, sy) = (overlay.width / old.width, overlay.height / old.height);
                if (sx, sy) != (1.0, 1.0) {
                    for d in &mut self.drawings {
                        for pair in d.points.chunks_exact_mut(2) {
                            pair[0] *= sx;
                            pair[1] *= sy;
                        }
                    }
                }
            }
        }
        self.overlay = Some(overlay);
    }

    /// Enter a drawing mode (or `Idle`). Any half-drawn stroke is dropped.
    pub fn arm(&mut self, tool: Tool) {
        self.tool = tool;
        self.stroke = None;
    }

    /// Returns whether the event was captured.
    pub fn pointer_down(&mut self, x: f32, y: f32) -> bool {
        let Some((lx, ly)) = self.local(x, y) else {
            return false;
        };
        match self.tool {
            Tool::Idle => false,
            Tool::DrawingPen => {
                self.stroke = Some(vec![lx, ly]);
                true
            }
            Tool::DrawingCircle => {
                self.drawings.push(Drawing {
                    kind: DrawingKind::Circle,
                    points: vec![lx, ly],
                    color: self.color.clone(),
                });
                true
            }
        }
    }

    pub fn pointer_move(&mut self, x: f32, y: f32) -> bool {
        if self.tool != Tool::DrawingPen || self.stroke.is_none() {
            return false;
        }
        let Some((lx, ly)) = self.local(x, y) else {
            return false;
        };
        if let Some(stroke) = &mut self.stroke {
            stroke.extend([lx, ly]);
        }
        true
    }

    pub fn pointer_up(&mut self) {
        self.commit_stroke();
    }

    pub fn pointer_leave(&mut self) {
        self.commit_stroke();
    }

    fn commit_stroke(&mut self) {
        if let Some(points) = self.stroke.take() {
            if !points.is_empty() {
                self.drawings.push(Drawing {
                    kind: DrawingKind::Pen,
                    points,
                    color: self.color.clone(),
                });
            }
        }
    }

    fn local(&self, x: f32, y: f32) -> Option<(f32, f32)> {
        self.overlay?.to_local(x, y)
    }

    /// Drop every mark and return to `Idle`. The overlay geometry is kept.
    pub fn reset(&mut self) {
        self.drawings.clear();
        self.stroke = None;
        self.tool = Tool::Idle;
    }

    pub fn can_apply(&self) -> bool {
        !self.drawings.is_empty()
    }
}

// ===================================================================
// Compositing
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    /// Line width in displayed pixels.
    pub width: f32,
    /// Circle mark radius in displayed pixels.
    pub circle_radius: f32,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 3.0,
            circle_radius: 20.0,
        }
    }
}

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_color(color: &str) -> Option<Rgba<u8>> {
    let hex = color.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgba([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
            255,
        ])),
        3 => {
            let short = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgba([short(0)?, short(1)?, short(2)?, 255]))
        }
        _ => None,
    }
}

/// Draw `drawings` over `native` at the image's native resolution. Points
/// are recorded in displayed pixels, so they are rescaled by the
/// native/displayed ratio of `overlay` first.
pub fn composite(
    native: &DynamicImage,
    overlay: &Overlay,
    drawings: &[Drawing],
    style: &StrokeStyle,
) -> RgbaImage {
    let mut out = native.to_rgba8();
    let (sx, sy) = overlay.scale_to(out.width(), out.height());
    let scale = (sx + sy) / 2.0;
    let width = (style.width * scale).max(1.0);

    for drawing in drawings {
        let color = parse_color(&drawing.color).unwrap_or_else(|| {
            log::warn!("unparseable color {:?}, using red", drawing.color);
            FALLBACK_COLOR
        });
        let points = drawing.scaled(sx, sy);
        match drawing.kind {
            DrawingKind::Pen => match points.as_slice() {
                [] => {}
                [only] => stamp_disc(&mut out, *only, width / 2.0, color),
                _ => {
                    for seg in points.windows(2) {
                        draw_segment(&mut out, seg[0], seg[1], width, color);
                    }
                }
            },
            DrawingKind::Circle => {
                if let Some(&center) = points.first() {
                    draw_ring(&mut out, center, style.circle_radius * scale, width, color);
                }
            }
        }
    }
    out
}

fn stamp_disc(img: &mut RgbaImage, (cx, cy): (f32, f32), radius: f32, color: Rgba<u8>) {
    let r = radius.max(0.5);
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = (cx - r).floor() as i64;
    let x1 = (cx + r).ceil() as i64;
    let y0 = (cy - r).floor() as i64;
    let y1 = (cy + r).ceil() as i64;
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            if dx * dx + dy * dy <= r * r {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn draw_segment(img: &mut RgbaImage, a: (f32, f32), b: (f32, f32), width: f32, color: Rgba<u8>) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length = (dx * dx + dy * dy).sqrt();
    let steps = (length * 2.0).ceil().max(1.0) as u32;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        stamp_disc(img, (a.0 + dx * t, a.1 + dy * t), width / 2.0, color);
    }
}

fn draw_ring(img: &mut RgbaImage, (cx, cy): (f32, f32), radius: f32, width: f32, color: Rgba<u8>) {
    let half = width / 2.0;
    let outer = radius + half;
    let (w, h) = (img.width() as i64, img.height() as i64);
    let x0 = (cx - outer).floor() as i64;
    let x1 = (cx + outer).ceil() as i64;
    let y0 = (cy - outer).floor() as i64;
    let y1 = (cy + outer).ceil() as i64;
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            let (dx, dy) = (x as f32 - cx, y as f32 - cy);
            if ((dx * dx + dy * dy).sqrt() - radius).abs() <= half {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
