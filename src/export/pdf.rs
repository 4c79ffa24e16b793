use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::{info, warn};

use crate::error::{ModyfireError, Result};
use crate::parse::{Slide, SlideBody};
use super::text::{body_font_size, latin1_bytes, sanitize, wrap};
use super::theme::{ExportTheme, Rgb, ShapeKind};
use super::{load_slide_image, ExportFormat, ImageKind, PageSize, RenderOptions, Renderer, SlideImage};

const REGULAR: &str = "F1";
const BOLD: &str = "F2";
const TITLE_SIZE: f32 = 32.0;
const WATERMARK_SIZE: f32 = 12.0;
const LINE_SPACING: f32 = 1.3;
const A4: PageSize = PageSize { width: 595.0, height: 842.0 };

fn num(v: f32) -> Object {
    Object::Real(v.into())
}

/// Content-stream builder working in top-left page coordinates.
struct PageOps {
    size: PageSize,
    ops: Vec<Operation>,
}

impl PageOps {
    fn new(size: PageSize) -> Self {
        Self { size, ops: Vec::new() }
    }

    fn fill_color(&mut self, color: Rgb) {
        let (r, g, b) = color.unit();
        self.ops.push(Operation::new("rg", vec![num(r), num(g), num(b)]));
    }

    fn rect(&mut self, x: f32, top: f32, w: f32, h: f32, color: Rgb) {
        self.fill_color(color);
        let y = self.size.height - top - h;
        self.ops.push(Operation::new("re", vec![num(x), num(y), num(w), num(h)]));
        self.ops.push(Operation::new("f", vec![]));
    }

    fn ellipse(&mut self, x: f32, top: f32, w: f32, h: f32, color: Rgb) {
        const K: f32 = 0.552_284_8;
        let (rx, ry) = (w / 2.0, h / 2.0);
        let (cx, cy) = (x + rx, self.size.height - top - ry);
        self.fill_color(color);
        self.ops.push(Operation::new("m", vec![num(cx + rx), num(cy)]));
        let curves = [
            [cx + rx, cy + K * ry, cx + K * rx, cy + ry, cx, cy + ry],
            [cx - K * rx, cy + ry, cx - rx, cy + K * ry, cx - rx, cy],
            [cx - rx, cy - K * ry, cx - K * rx, cy - ry, cx, cy - ry],
            [cx + K * rx, cy - ry, cx + rx, cy - K * ry, cx + rx, cy],
        ];
        for c in curves {
            self.ops.push(Operation::new("c", c.iter().map(|v| num(*v)).collect()));
        }
        self.ops.push(Operation::new("f", vec![]));
    }

    /// One line of text whose glyph tops sit at `top`.
    fn text(&mut self, font: &str, size: f32, color: Rgb, x: f32, top: f32, line: &str) {
        let baseline = self.size.height - top - size;
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), num(size)]));
        self.fill_color(color);
        self.ops.push(Operation::new("Td", vec![num(x), num(baseline)]));
        self.ops.push(Operation::new("Tj", vec![Object::String(latin1_bytes(line), StringFormat::Literal)]));
        self.ops.push(Operation::new("ET", vec![]));
    }

    fn image(&mut self, name: &str, x: f32, top: f32, w: f32, h: f32) {
        let y = self.size.height - top - h;
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new("cm", vec![num(w), num(0.0), num(0.0), num(h), num(x), num(y)]));
        self.ops.push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
        self.ops.push(Operation::new("Q", vec![]));
    }
}

struct PageContent {
    ops: Vec<Operation>,
    image: Option<SlideImage>,
    /// Body text ran past the bottom margin and was cut
    truncated: bool,
}

/// PDF output using the standard Helvetica fonts. Content streams are left
/// uncompressed.
#[derive(Debug, Default, Clone)]
pub struct PdfRenderer;

impl PdfRenderer {
    pub fn new() -> Self {
        Self
    }

    fn slide_page(&self, slide: &Slide, options: &RenderOptions) -> PageContent {
        let theme = options.theme;
        let size = options.aspect_ratio.page_size();
        let layout = theme.layout(size);
        let mut page = PageOps::new(size);

        page.rect(0.0, 0.0, size.width, size.height, theme.background);
        draw_geometry(&mut page, theme, size);

        let title = sanitize(&slide.title);
        let mut top = layout.title_top;
        for line in wrap(&title, layout.width, TITLE_SIZE).into_iter().take(2) {
            page.text(BOLD, TITLE_SIZE, theme.title, layout.left, top, &line);
            top += TITLE_SIZE * 1.15;
        }

        let image = load_slide_image(&options.asset_root, slide.image_reference.as_deref()).filter(|img| {
            if img.kind != ImageKind::Jpeg {
                warn!("Only JPEG images can be embedded in PDF output, skipping image on '{}'", slide.title);
            }
            img.kind == ImageKind::Jpeg
        });
        let text_width = if image.is_some() { layout.width * 0.58 } else { layout.width };

        let font_size = body_font_size(slide.body.char_count());
        let line_height = font_size * LINE_SPACING;
        let mut top = layout.body_top.max(top + 12.0);
        let mut overflowed = false;

        match &slide.body {
            SlideBody::Points { points } => {
                let indent = font_size * 0.9;
                for point in points {
                    let lines = wrap(&sanitize(point), text_width - indent, font_size);
                    if lines.is_empty() {
                        continue;
                    }
                    if top + line_height > layout.body_bottom {
                        overflowed = true;
                        break;
                    }
                    let marker = font_size * 0.25;
                    page.rect(layout.left, top + font_size * 0.4, marker, marker, theme.accent);
                    for line in lines {
                        if top + line_height > layout.body_bottom {
                            overflowed = true;
                            break;
                        }
                        page.text(REGULAR, font_size, theme.body, layout.left + indent, top, &line);
                        top += line_height;
                    }
                    top += font_size * 0.35;
                }
            }
            SlideBody::Block { content } => {
                for line in wrap(&sanitize(content), text_width, font_size) {
                    if top + line_height > layout.body_bottom {
                        overflowed = true;
                        break;
                    }
                    page.text(REGULAR, font_size, theme.body, layout.left, top, &line);
                    top += line_height;
                }
            }
        }
        if overflowed {
            warn!("Body text of '{}' did not fit and was truncated at the page bottom", slide.title);
        }

        if let Some(img) = &image {
            let box_left = layout.left + layout.width * 0.62;
            let (w, h) = img.fit(layout.width * 0.38, layout.body_bottom - layout.body_top);
            page.image("Im1", box_left, layout.body_top, w, h);
        }

        if options.watermark {
            draw_watermark(&mut page, theme, size, &options.watermark_text);
        }

        PageContent { ops: page.ops, image, truncated: overflowed }
    }

    /// Plain multi-page A4 text document.
    pub fn render_report(&self, text: &str) -> Result<Vec<u8>> {
        const MARGIN: f32 = 56.0;
        const SIZE: f32 = 11.0;
        let leading = SIZE * 1.4;
        let ink = Rgb(0, 0, 0);

        let lines = wrap(&sanitize(text), A4.width - 2.0 * MARGIN, SIZE);
        let per_page = ((A4.height - 2.0 * MARGIN) / leading).floor().max(1.0) as usize;

        let mut pages = Vec::new();
        for chunk in lines.chunks(per_page) {
            let mut page = PageOps::new(A4);
            for (i, line) in chunk.iter().enumerate() {
                page.text(REGULAR, SIZE, ink, MARGIN, MARGIN + i as f32 * leading, line);
            }
            pages.push(PageContent { ops: page.ops, image: None, truncated: false });
        }
        if pages.is_empty() {
            pages.push(PageContent { ops: Vec::new(), image: None, truncated: false });
        }

        info!("Rendering {} page text report", pages.len());
        assemble(pages, A4)
    }
}

impl Renderer for PdfRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn render(&self, slides: &[Slide], options: &RenderOptions) -> Result<Vec<u8>> {
        if slides.is_empty() {
            return Err(ModyfireError::Rendering("no slides to render".to_string()));
        }
        info!(
            "Rendering {} slides to PDF (theme: {}, watermark: {})",
            slides.len(),
            options.theme.name,
            options.watermark
        );
        let pages: Vec<PageContent> = slides.iter().map(|s| self.slide_page(s, options)).collect();
        let truncated = pages.iter().filter(|p| p.truncated).count();
        if truncated > 0 {
            warn!("{} of {} slides lost body text to truncation", truncated, pages.len());
        }
        assemble(pages, options.aspect_ratio.page_size())
    }
}

fn draw_geometry(page: &mut PageOps, theme: &ExportTheme, size: PageSize) {
    for shape in theme.shapes(size) {
        match shape.kind {
            ShapeKind::Rect => page.rect(shape.x, shape.y, shape.w, shape.h, shape.color),
            ShapeKind::Ellipse => page.ellipse(shape.x, shape.y, shape.w, shape.h, shape.color),
        }
    }
}

fn draw_watermark(page: &mut PageOps, theme: &ExportTheme, size: PageSize, text: &str) {
    let text = sanitize(text);
    let width = text.chars().count() as f32 * WATERMARK_SIZE * 0.5;
    let x = ((size.width - width) / 2.0).max(0.0);
    let top = size.height - WATERMARK_SIZE - 18.0;
    page.text(BOLD, WATERMARK_SIZE, theme.body.over(theme.background, 0.6), x, top, &text);
}

fn font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

fn image_object(doc: &mut Document, image: &SlideImage) -> ObjectId {
    let color_space = match image.components {
        1 => "DeviceGray",
        4 => "DeviceCMYK",
        _ => "DeviceRGB",
    };
    let stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(image.width as i64),
            "Height" => Object::Integer(image.height as i64),
            "ColorSpace" => color_space,
            "BitsPerComponent" => Object::Integer(8),
            "Filter" => "DCTDecode",
        },
        image.bytes.clone(),
    );
    doc.add_object(stream)
}

fn assemble(pages: Vec<PageContent>, size: PageSize) -> Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = font(&mut doc, "Helvetica");
    let bold = font(&mut doc, "Helvetica-Bold");

    let mut kids = Vec::with_capacity(pages.len());
    for page in pages {
        let mut resources = dictionary! {
            "Font" => dictionary! { REGULAR => regular, BOLD => bold },
        };
        if let Some(image) = &page.image {
            let image_id = image_object(&mut doc, image);
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }

        let content = Content { operations: page.ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources,
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => Object::Integer(count),
        "MediaBox" => vec![num(0.0), num(0.0), num(size.width), num(size.height)],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;
    use crate::export::theme::THEMES;
    use crate::export::AspectRatio;
    use tempfile::tempdir;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_every_theme_and_aspect_renders() {
        for theme in THEMES.iter() {
            for aspect in [AspectRatio::Widescreen, AspectRatio::Square] {
                let options = RenderOptions::new(theme.name, aspect);
                let bytes = PdfRenderer::new().render(&fixtures::slides(), &options).unwrap();
                assert!(bytes.starts_with(b"%PDF"), "theme {} did not produce a PDF", theme.name);
            }
        }
    }

    fn op_signature(ops: &[Operation]) -> Vec<String> {
        ops.iter().map(|op| format!("{} {:?}", op.operator, op.operands)).collect()
    }

    #[test]
    fn test_watermark_changes_output_and_is_visible() {
        let plain = RenderOptions::new("default", AspectRatio::Widescreen);
        let marked = plain.clone().with_watermark("Generated by MODYFIRE");

        let without = PdfRenderer::new().render(&fixtures::slides(), &plain).unwrap();
        let with = PdfRenderer::new().render(&fixtures::slides(), &marked).unwrap();

        assert_ne!(without, with);
        assert!(contains(&with, b"(Generated by MODYFIRE)"));
        assert!(!contains(&without, b"Generated by MODYFIRE"));
        assert_eq!(
            Document::load_mem(&without).unwrap().get_pages().len(),
            Document::load_mem(&with).unwrap().get_pages().len()
        );
    }

    #[test]
    fn test_watermark_only_adds_its_own_operations() {
        let renderer = PdfRenderer::new();
        for theme in THEMES.iter() {
            let plain = RenderOptions::new(theme.name, AspectRatio::Square);
            let marked = plain.clone().with_watermark("Generated by MODYFIRE");

            for slide in fixtures::slides() {
                let base = op_signature(&renderer.slide_page(&slide, &plain).ops);
                let stamped = op_signature(&renderer.slide_page(&slide, &marked).ops);

                assert!(stamped.len() > base.len());
                assert_eq!(&stamped[..base.len()], &base[..], "theme {} changed slide content", theme.name);
                assert!(stamped[base.len()..].iter().any(|op| op.starts_with("Tj ")));
            }
        }
    }

    #[test]
    fn test_overflowing_body_is_flagged_as_truncated() {
        let renderer = PdfRenderer::new();
        let options = RenderOptions::new("default", AspectRatio::Widescreen);

        let long = Slide::block("Raw output", "The model wrote far too much. ".repeat(200));
        let short = Slide::block("Raw output", "Fits on one page.");
        assert!(renderer.slide_page(&long, &options).truncated);
        assert!(!renderer.slide_page(&short, &options).truncated);
    }

    #[test]
    fn test_page_count_matches_slides() {
        let bytes = PdfRenderer::new()
            .render(&fixtures::slides(), &RenderOptions::new("dark", AspectRatio::Square))
            .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);
    }

    #[test]
    fn test_non_latin_text_is_sanitized() {
        let slides = vec![Slide::block("\u{201C}Quoted\u{201D} \u{4E2D}", "em\u{2014}dash")];
        let bytes = PdfRenderer::new()
            .render(&slides, &RenderOptions::new("default", AspectRatio::Widescreen))
            .unwrap();
        assert!(contains(&bytes, b"(\"Quoted\" ?)"));
        assert!(contains(&bytes, b"(em-dash)"));
    }

    #[test]
    fn test_missing_image_is_skipped() {
        let dir = tempdir().unwrap();
        let mut slide = Slide::block("Chart", "See the chart");
        slide.image_reference = Some("charts/missing.jpg".into());
        let options = RenderOptions::new("ocean", AspectRatio::Widescreen).with_asset_root(dir.path());

        let bytes = PdfRenderer::new().render(&[slide], &options).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(!contains(&bytes, b"DCTDecode"));
    }

    #[test]
    fn test_jpeg_image_is_embedded() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("chart.jpg"), fixtures::tiny_jpeg()).unwrap();
        let mut slide = Slide::block("Chart", "See the chart");
        slide.image_reference = Some("/chart.jpg".into());
        let options = RenderOptions::new("default", AspectRatio::Widescreen).with_asset_root(dir.path());

        let bytes = PdfRenderer::new().render(&[slide], &options).unwrap();
        assert!(contains(&bytes, b"DCTDecode"));
        assert!(contains(&bytes, b"/Im1 Do"));
    }

    #[test]
    fn test_empty_slide_list_is_rendering_error() {
        let err = PdfRenderer::new()
            .render(&[], &RenderOptions::new("default", AspectRatio::Widescreen))
            .unwrap_err();
        assert!(matches!(err, ModyfireError::Rendering(_)));
    }

    #[test]
    fn test_report_paginates() {
        let text = "A long paragraph of report text that keeps going. ".repeat(400);
        let bytes = PdfRenderer::new().render_report(&text).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }
}
