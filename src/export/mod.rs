// Document export
//
// Slides go in, document bytes come out. Both renderers walk the same per-slide order:
// background, theme geometry, title, body, optional image, then the watermark overlay.

pub mod pdf;
pub mod pptx;
pub mod text;
pub mod theme;

use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::error::{ModyfireError, Result};
use crate::parse::Slide;

pub use pdf::PdfRenderer;
pub use pptx::PptxRenderer;
pub use theme::ExportTheme;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Widescreen,
    Square,
}

impl AspectRatio {
    pub fn page_size(self) -> PageSize {
        match self {
            AspectRatio::Widescreen => PageSize { width: 960.0, height: 540.0 },
            AspectRatio::Square => PageSize { width: 720.0, height: 720.0 },
        }
    }

    /// Lenient parse; anything unrecognised is widescreen.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "1:1" | "square" | "1x1" => AspectRatio::Square,
            _ => AspectRatio::Widescreen,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Pptx,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Pptx => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ModyfireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(ExportFormat::Pdf),
            "pptx" | "ppt" | "powerpoint" => Ok(ExportFormat::Pptx),
            other => Err(ModyfireError::Unsupported(format!("export format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub theme: &'static ExportTheme,
    pub aspect_ratio: AspectRatio,
    pub watermark: bool,
    pub watermark_text: String,
    /// Directory that relative image references resolve against
    pub asset_root: PathBuf,
}

impl RenderOptions {
    pub fn new(theme: &str, aspect_ratio: AspectRatio) -> Self {
        Self {
            theme: ExportTheme::lookup(theme),
            aspect_ratio,
            watermark: false,
            watermark_text: String::new(),
            asset_root: PathBuf::from("static"),
        }
    }

    pub fn with_watermark(mut self, text: impl Into<String>) -> Self {
        self.watermark = true;
        self.watermark_text = text.into();
        self
    }

    pub fn with_asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = root.into();
        self
    }
}

pub trait Renderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn render(&self, slides: &[Slide], options: &RenderOptions) -> Result<Vec<u8>>;
}

pub fn renderer_for(format: ExportFormat) -> Box<dyn Renderer> {
    match format {
        ExportFormat::Pdf => Box::new(PdfRenderer::new()),
        ExportFormat::Pptx => Box::new(PptxRenderer::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// A local image a slide refers to, already read into memory.
#[derive(Debug, Clone)]
pub struct SlideImage {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    /// JPEG component count; 3 for PNG
    pub components: u8,
    pub bytes: Vec<u8>,
}

impl SlideImage {
    /// Fit the image into a box, preserving aspect ratio. Returns (w, h).
    pub fn fit(&self, max_w: f32, max_h: f32) -> (f32, f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        let scale = (max_w / w).min(max_h / h);
        (w * scale, h * scale)
    }
}

/// Resolve an image reference under `root`. References may carry a leading `/` but
/// never escape the root.
fn resolve_asset(root: &Path, reference: &str) -> Option<PathBuf> {
    let relative = Path::new(reference.trim().trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative.components().any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let path = root.join(relative);
    path.is_file().then_some(path)
}

/// Load the slide's image if it resolves to a readable png or jpeg. Problems are
/// logged and the slide renders without the image.
pub fn load_slide_image(root: &Path, reference: Option<&str>) -> Option<SlideImage> {
    let reference = reference.filter(|r| !r.trim().is_empty())?;
    let Some(path) = resolve_asset(root, reference) else {
        warn!("Image '{}' not found under {}, skipping", reference, root.display());
        return None;
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read image {}: {}", path.display(), e);
            return None;
        }
    };
    let image = probe_image(bytes);
    if image.is_none() {
        warn!("Unsupported image format: {}", path.display());
    }
    image
}

fn probe_image(bytes: Vec<u8>) -> Option<SlideImage> {
    const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.starts_with(PNG_SIGNATURE) && bytes.len() >= 24 {
        let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
        let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        return (width > 0 && height > 0).then_some(SlideImage { kind: ImageKind::Png, width, height, components: 3, bytes });
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        let (width, height, components) = jpeg_frame(&bytes)?;
        return Some(SlideImage { kind: ImageKind::Jpeg, width, height, components, bytes });
    }
    None
}

/// Read dimensions and component count from the first JPEG start-of-frame marker.
fn jpeg_frame(bytes: &[u8]) -> Option<(u32, u32, u8)> {
    let mut i = 2;
    while i + 4 <= bytes.len() {
        if bytes[i] != 0xFF {
            i += 1;
            continue;
        }
        let marker = bytes[i + 1];
        if marker == 0xD8 || marker == 0x01 || (0xD0..=0xD7).contains(&marker) || marker == 0xFF {
            i += if marker == 0xFF { 1 } else { 2 };
            continue;
        }
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = bytes.get(i + 4..i + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return (width > 0 && height > 0).then_some((width, height, seg[5]));
        }
        i += 2 + len;
    }
    None
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::parse::Slide;

    pub fn slides() -> Vec<Slide> {
        vec![
            Slide::points("Why Rust", vec!["Memory safety".into(), "No garbage collector".into(), "Fearless concurrency".into()]),
            Slide::block("Ownership", "Every value has a single owner. ".repeat(30)),
        ]
    }

    /// Smallest JPEG header the frame probe accepts: SOI, one SOF0 segment, EOI.
    pub fn tiny_jpeg() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x20, 0x00, 0x40, 0x03]);
        bytes.extend_from_slice(&[0x01, 0x22, 0x00, 0x02, 0x11, 0x01, 0x03, 0x11, 0x01]);
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    pub fn tiny_png() -> Vec<u8> {
        let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 13]);
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&100u32.to_be_bytes());
        bytes.extend_from_slice(&50u32.to_be_bytes());
        bytes.extend_from_slice(&[8, 2, 0, 0, 0]);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_aspect_ratio_parse() {
        assert_eq!(AspectRatio::parse_lenient("1:1"), AspectRatio::Square);
        assert_eq!(AspectRatio::parse_lenient("16:9"), AspectRatio::Widescreen);
        assert_eq!(AspectRatio::parse_lenient("4:3"), AspectRatio::Widescreen);
        assert_eq!(AspectRatio::Square.page_size().width, AspectRatio::Square.page_size().height);
    }

    #[test]
    fn test_export_format() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!("pptx".parse::<ExportFormat>().unwrap().extension(), "pptx");
        assert!("docx".parse::<ExportFormat>().unwrap_err().is_client_error());
        assert_eq!(renderer_for(ExportFormat::Pptx).format(), ExportFormat::Pptx);
    }

    #[test]
    fn test_probe_jpeg_and_png() {
        let jpeg = probe_image(fixtures::tiny_jpeg()).unwrap();
        assert_eq!((jpeg.kind, jpeg.width, jpeg.height, jpeg.components), (ImageKind::Jpeg, 64, 32, 3));
        let png = probe_image(fixtures::tiny_png()).unwrap();
        assert_eq!((png.kind, png.width, png.height), (ImageKind::Png, 100, 50));
        assert!(probe_image(b"GIF89a".to_vec()).is_none());
    }

    #[test]
    fn test_load_slide_image_stays_under_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/chart.jpg"), fixtures::tiny_jpeg()).unwrap();

        assert!(load_slide_image(dir.path(), Some("/img/chart.jpg")).is_some());
        assert!(load_slide_image(dir.path(), Some("img/missing.jpg")).is_none());
        assert!(load_slide_image(dir.path(), Some("../img/chart.jpg")).is_none());
        assert!(load_slide_image(dir.path(), None).is_none());
    }

    #[test]
    fn test_fit_preserves_aspect() {
        let image = probe_image(fixtures::tiny_png()).unwrap();
        let (w, h) = image.fit(300.0, 300.0);
        assert_eq!((w, h), (300.0, 150.0));
    }
}
