use std::fmt::Write as _;
use std::io::{Cursor, Write};

use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ModyfireError, Result};
use crate::parse::{Slide, SlideBody};
use super::text::{body_font_size, xml_escape};
use super::theme::{ExportTheme, Rgb, ShapeKind};
use super::{load_slide_image, ExportFormat, ImageKind, PageSize, RenderOptions, Renderer, SlideImage};

const EMU_PER_POINT: f32 = 12_700.0;
const TITLE_SIZE: f32 = 32.0;
const WATERMARK_SIZE: f32 = 12.0;

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

fn emu(points: f32) -> i64 {
    (points * EMU_PER_POINT).round() as i64
}

/// Builds one slide's shape tree.
struct SlideXml {
    next_id: u32,
    body: String,
}

impl SlideXml {
    fn new() -> Self {
        Self { next_id: 2, body: String::new() }
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn xfrm(x: f32, y: f32, w: f32, h: f32) -> String {
        format!(
            r#"<a:xfrm><a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></a:xfrm>"#,
            emu(x),
            emu(y),
            emu(w.max(0.0)),
            emu(h.max(0.0))
        )
    }

    fn shape(&mut self, kind: ShapeKind, x: f32, y: f32, w: f32, h: f32, color: Rgb) {
        let id = self.id();
        let prst = match kind {
            ShapeKind::Rect => "rect",
            ShapeKind::Ellipse => "ellipse",
        };
        let _ = write!(
            self.body,
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="Accent {id}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="{prst}"><a:avLst/></a:prstGeom><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:ln><a:noFill/></a:ln></p:spPr></p:sp>"#,
            Self::xfrm(x, y, w, h),
            color.hex()
        );
    }

    /// Text box; `paragraphs` are already-built `<a:p>` elements.
    fn text_box(&mut self, name: &str, x: f32, y: f32, w: f32, h: f32, paragraphs: &str) {
        let id = self.id();
        let _ = write!(
            self.body,
            r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" lIns="0" rIns="0" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#,
            Self::xfrm(x, y, w, h)
        );
    }

    fn picture(&mut self, rel_id: &str, x: f32, y: f32, w: f32, h: f32) {
        let id = self.id();
        let _ = write!(
            self.body,
            r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="Picture {id}"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>{}<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#,
            Self::xfrm(x, y, w, h)
        );
    }

    fn finish(self, background: Rgb) -> String {
        format!(
            r#"{XML_HEADER}<p:sld {NS}><p:cSld><p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:effectLst/></p:bgPr></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
            background.hex(),
            self.body
        )
    }
}

fn run(text: &str, size: f32, bold: bool, color: Rgb) -> String {
    format!(
        r#"<a:r><a:rPr lang="en-US" sz="{}" b="{}" dirty="0"><a:solidFill><a:srgbClr val="{}"/></a:solidFill><a:latin typeface="Arial"/></a:rPr><a:t>{}</a:t></a:r>"#,
        (size * 100.0).round() as u32,
        if bold { 1 } else { 0 },
        color.hex(),
        xml_escape(text)
    )
}

fn paragraph(text: &str, size: f32, bold: bool, color: Rgb) -> String {
    format!("<a:p>{}</a:p>", run(text, size, bold, color))
}

fn centered_paragraph(text: &str, size: f32, color: Rgb) -> String {
    format!(r#"<a:p><a:pPr algn="ctr"/>{}</a:p>"#, run(text, size, true, color))
}

fn bullet(text: &str, size: f32, color: Rgb, accent: Rgb) -> String {
    format!(
        r#"<a:p><a:pPr marL="342900" indent="-342900"><a:spcBef><a:spcPts val="600"/></a:spcBef><a:buClr><a:srgbClr val="{}"/></a:buClr><a:buFont typeface="Arial"/><a:buChar char="&#8226;"/></a:pPr>{}</a:p>"#,
        accent.hex(),
        run(text, size, false, color)
    )
}

struct SlidePart {
    xml: String,
    image: Option<SlideImage>,
}

/// PowerPoint output as a minimal OpenXML package.
#[derive(Debug, Default, Clone)]
pub struct PptxRenderer;

impl PptxRenderer {
    pub fn new() -> Self {
        Self
    }

    fn slide_part(&self, slide: &Slide, options: &RenderOptions) -> SlidePart {
        let theme = options.theme;
        let size = options.aspect_ratio.page_size();
        let layout = theme.layout(size);
        let mut xml = SlideXml::new();

        for shape in theme.shapes(size) {
            xml.shape(shape.kind, shape.x, shape.y, shape.w, shape.h, shape.color);
        }

        xml.text_box(
            "Title",
            layout.left,
            layout.title_top,
            layout.width,
            layout.body_top - layout.title_top,
            &paragraph(&slide.title, TITLE_SIZE, true, theme.title),
        );

        let image = load_slide_image(&options.asset_root, slide.image_reference.as_deref());
        let text_width = if image.is_some() { layout.width * 0.58 } else { layout.width };
        let font_size = body_font_size(slide.body.char_count());
        let mut paragraphs = match &slide.body {
            SlideBody::Points { points } => points
                .iter()
                .filter(|p| !p.trim().is_empty())
                .map(|p| bullet(p, font_size, theme.body, theme.accent))
                .collect::<String>(),
            SlideBody::Block { content } => content
                .split('\n')
                .map(|line| paragraph(line, font_size, false, theme.body))
                .collect::<String>(),
        };
        if paragraphs.is_empty() {
            paragraphs.push_str("<a:p/>");
        }
        xml.text_box("Body", layout.left, layout.body_top, text_width, layout.body_bottom - layout.body_top, &paragraphs);

        if let Some(img) = &image {
            let (w, h) = img.fit(layout.width * 0.38, layout.body_bottom - layout.body_top);
            xml.picture("rId2", layout.left + layout.width * 0.62, layout.body_top, w, h);
        }

        if options.watermark {
            let watermark_color = theme.body.over(theme.background, 0.6);
            xml.text_box(
                "Watermark",
                0.0,
                size.height - WATERMARK_SIZE - 24.0,
                size.width,
                WATERMARK_SIZE * 2.0,
                &centered_paragraph(&options.watermark_text, WATERMARK_SIZE, watermark_color),
            );
        }

        SlidePart { xml: xml.finish(theme.background), image }
    }
}

impl Renderer for PptxRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pptx
    }

    fn render(&self, slides: &[Slide], options: &RenderOptions) -> Result<Vec<u8>> {
        if slides.is_empty() {
            return Err(ModyfireError::Rendering("no slides to render".to_string()));
        }
        info!(
            "Rendering {} slides to PPTX (theme: {}, watermark: {})",
            slides.len(),
            options.theme.name,
            options.watermark
        );
        let parts: Vec<SlidePart> = slides.iter().map(|s| self.slide_part(s, options)).collect();
        package(&parts, options.theme, options.aspect_ratio.page_size())
    }
}

fn image_extension(kind: ImageKind) -> &'static str {
    match kind {
        ImageKind::Png => "png",
        ImageKind::Jpeg => "jpeg",
    }
}

fn package(parts: &[SlidePart], theme: &ExportTheme, size: PageSize) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let mut put = |name: &str, body: &str| -> Result<()> {
        zip.start_file(name, options)?;
        zip.write_all(body.as_bytes())?;
        Ok(())
    };

    put("[Content_Types].xml", &content_types(parts.len()))?;
    put(
        "_rels/.rels",
        &relationships(&[("rId1", "officeDocument", "ppt/presentation.xml")]),
    )?;
    put("ppt/presentation.xml", &presentation(parts.len(), size))?;

    let mut presentation_rels = vec![
        ("rId1".to_string(), "slideMaster", "slideMasters/slideMaster1.xml".to_string()),
        ("rId2".to_string(), "theme", "theme/theme1.xml".to_string()),
    ];
    for i in 1..=parts.len() {
        presentation_rels.push((format!("rId{}", i + 2), "slide", format!("slides/slide{}.xml", i)));
    }
    let rels: Vec<(&str, &str, &str)> =
        presentation_rels.iter().map(|(id, kind, target)| (id.as_str(), *kind, target.as_str())).collect();
    put("ppt/_rels/presentation.xml.rels", &relationships(&rels))?;

    put("ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER)?;
    put(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        &relationships(&[
            ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
            ("rId2", "theme", "../theme/theme1.xml"),
        ]),
    )?;
    put("ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT)?;
    put(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        &relationships(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]),
    )?;
    put("ppt/theme/theme1.xml", &office_theme(theme))?;

    for (i, part) in parts.iter().enumerate() {
        let n = i + 1;
        put(&format!("ppt/slides/slide{}.xml", n), &part.xml)?;
        let media = part
            .image
            .as_ref()
            .map(|img| format!("../media/image{}.{}", n, image_extension(img.kind)));
        let mut rels = vec![("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml")];
        if let Some(target) = media.as_deref() {
            rels.push(("rId2", "image", target));
        }
        put(&format!("ppt/slides/_rels/slide{}.xml.rels", n), &relationships(&rels))?;
    }
    drop(put);

    for (i, part) in parts.iter().enumerate() {
        if let Some(img) = &part.image {
            zip.start_file(format!("ppt/media/image{}.{}", i + 1, image_extension(img.kind)), options)?;
            zip.write_all(&img.bytes)?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

fn content_types(slide_count: usize) -> String {
    let mut xml = format!(
        r#"{XML_HEADER}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Default Extension="jpeg" ContentType="image/jpeg"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#
    );
    for i in 1..=slide_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/ppt/slides/slide{}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#,
            i
        );
    }
    xml.push_str("</Types>");
    xml
}

fn relationships(rels: &[(&str, &str, &str)]) -> String {
    let mut xml = format!(r#"{XML_HEADER}<Relationships xmlns="{REL_NS}">"#);
    for (id, kind, target) in rels {
        let _ = write!(xml, r#"<Relationship Id="{id}" Type="{REL_TYPE}/{kind}" Target="{target}"/>"#);
    }
    xml.push_str("</Relationships>");
    xml
}

fn presentation(slide_count: usize, size: PageSize) -> String {
    let mut ids = String::new();
    for i in 0..slide_count {
        let _ = write!(ids, r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 3);
    }
    format!(
        r#"{XML_HEADER}<p:presentation {NS} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{}" cy="{}"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        emu(size.width),
        emu(size.height)
    )
}

const SLIDE_MASTER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">"#,
    r#"<p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg>"#,
    r#"<p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld>"#,
    r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
    r#"<p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst>"#,
    r#"</p:sldMaster>"#
);

const SLIDE_LAYOUT: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1">"#,
    r#"<p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld>"#,
    r#"<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
);

/// Office theme part. Scheme colors follow the export theme so placeholder text
/// added later in an editor matches.
fn office_theme(theme: &ExportTheme) -> String {
    let solid = |c: &str| format!(r#"<a:solidFill><a:schemeClr val="{c}"/></a:solidFill>"#);
    let line = |w: u32| format!(r#"<a:ln w="{w}"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#);
    let fills = solid("phClr").repeat(3);
    let effects = "<a:effectStyle><a:effectLst/></a:effectStyle>".repeat(3);
    format!(
        r#"{XML_HEADER}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="{name}"><a:themeElements><a:clrScheme name="{name}"><a:dk1><a:srgbClr val="{title}"/></a:dk1><a:lt1><a:srgbClr val="{bg}"/></a:lt1><a:dk2><a:srgbClr val="{body}"/></a:dk2><a:lt2><a:srgbClr val="F3F4F6"/></a:lt2><a:accent1><a:srgbClr val="{accent}"/></a:accent1><a:accent2><a:srgbClr val="10B981"/></a:accent2><a:accent3><a:srgbClr val="F59E0B"/></a:accent3><a:accent4><a:srgbClr val="EF4444"/></a:accent4><a:accent5><a:srgbClr val="8B5CF6"/></a:accent5><a:accent6><a:srgbClr val="06B6D4"/></a:accent6><a:hlink><a:srgbClr val="2563EB"/></a:hlink><a:folHlink><a:srgbClr val="7C3AED"/></a:folHlink></a:clrScheme><a:fontScheme name="Arial"><a:majorFont><a:latin typeface="Arial"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Arial"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst>{fills}</a:fillStyleLst><a:lnStyleLst>{l1}{l2}{l3}</a:lnStyleLst><a:effectStyleLst>{effects}</a:effectStyleLst><a:bgFillStyleLst>{fills}</a:bgFillStyleLst></a:fmtScheme></a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>"#,
        name = theme.name,
        title = theme.title.hex(),
        bg = theme.background.hex(),
        body = theme.body.hex(),
        accent = theme.accent.hex(),
        l1 = line(6350),
        l2 = line(12700),
        l3 = line(19050),
    )
}
