use serde::Serialize;

use super::PageSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    /// Components scaled to 0.0..=1.0 for PDF color operators.
    pub fn unit(&self) -> (f32, f32, f32) {
        (self.0 as f32 / 255.0, self.1 as f32 / 255.0, self.2 as f32 / 255.0)
    }

    /// Mix `self` over `base` at the given opacity.
    pub fn over(&self, base: Rgb, opacity: f32) -> Rgb {
        let mix = |a: u8, b: u8| (a as f32 * opacity + b as f32 * (1.0 - opacity)).round() as u8;
        Rgb(mix(self.0, base.0), mix(self.1, base.1), mix(self.2, base.2))
    }
}

/// The decorative shapes a theme draws behind slide text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Geometry {
    None,
    /// Full-height accent bar on the left edge; body text shifts right
    Sidebar,
    /// Thin accent line across the top plus a faded circle bottom-right
    TopBandWithCircle,
    /// Soft block behind the title; title moves up into it
    HeaderBlock(Rgb),
    /// Accent outline inset from the page edge
    Frame,
    /// Faded circle in the top-right corner
    CornerCircle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rect,
    Ellipse,
}

/// A filled shape in points, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub color: Rgb,
}

/// Where title and body text go on a page, in points from the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub left: f32,
    pub width: f32,
    pub title_top: f32,
    pub body_top: f32,
    pub body_bottom: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportTheme {
    pub name: &'static str,
    pub background: Rgb,
    pub title: Rgb,
    pub body: Rgb,
    pub accent: Rgb,
    pub geometry: Geometry,
}

const INCH: f32 = 72.0;

pub const THEMES: [ExportTheme; 6] = [
    ExportTheme {
        name: "default",
        background: Rgb(255, 255, 255),
        title: Rgb(0, 0, 0),
        body: Rgb(80, 80, 80),
        accent: Rgb(59, 130, 246),
        geometry: Geometry::None,
    },
    ExportTheme {
        name: "dark",
        background: Rgb(15, 23, 42),
        title: Rgb(255, 255, 255),
        body: Rgb(203, 213, 225),
        accent: Rgb(139, 92, 246),
        geometry: Geometry::TopBandWithCircle,
    },
    ExportTheme {
        name: "corporate",
        background: Rgb(255, 255, 255),
        title: Rgb(30, 58, 138),
        body: Rgb(71, 85, 105),
        accent: Rgb(37, 99, 235),
        geometry: Geometry::Sidebar,
    },
    ExportTheme {
        name: "warm",
        background: Rgb(255, 251, 235),
        title: Rgb(120, 53, 15),
        body: Rgb(146, 64, 14),
        accent: Rgb(217, 119, 6),
        geometry: Geometry::HeaderBlock(Rgb(253, 230, 138)),
    },
    ExportTheme {
        name: "minimal",
        background: Rgb(250, 250, 250),
        title: Rgb(17, 24, 39),
        body: Rgb(55, 65, 81),
        accent: Rgb(17, 24, 39),
        geometry: Geometry::Frame,
    },
    ExportTheme {
        name: "ocean",
        background: Rgb(240, 249, 255),
        title: Rgb(12, 74, 110),
        body: Rgb(7, 89, 133),
        accent: Rgb(14, 165, 233),
        geometry: Geometry::CornerCircle,
    },
];

impl ExportTheme {
    /// Look a theme up by name. Unknown names get the default theme.
    pub fn lookup(name: &str) -> &'static ExportTheme {
        let wanted = name.trim().to_lowercase();
        THEMES.iter().find(|t| t.name == wanted).unwrap_or(&THEMES[0])
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        THEMES.iter().map(|t| t.name)
    }

    /// Accent shapes for a page, back to front.
    pub fn shapes(&self, page: PageSize) -> Vec<Shape> {
        let (w, h) = (page.width, page.height);
        let faded = self.accent.over(self.background, 0.2);
        match self.geometry {
            Geometry::None => Vec::new(),
            Geometry::Sidebar => vec![Shape { kind: ShapeKind::Rect, x: 0.0, y: 0.0, w: 0.5 * INCH, h, color: self.accent }],
            Geometry::TopBandWithCircle => vec![
                Shape { kind: ShapeKind::Rect, x: 0.0, y: 0.0, w, h: 0.1 * INCH, color: self.accent },
                Shape { kind: ShapeKind::Ellipse, x: w - 2.0 * INCH, y: h - 2.0 * INCH, w: 3.0 * INCH, h: 3.0 * INCH, color: faded },
            ],
            Geometry::HeaderBlock(fill) => vec![Shape { kind: ShapeKind::Rect, x: 0.0, y: 0.0, w, h: 1.2 * INCH, color: fill }],
            Geometry::Frame => {
                let inset = 0.25 * INCH;
                let stroke = 0.06 * INCH;
                vec![
                    Shape { kind: ShapeKind::Rect, x: inset, y: inset, w: w - 2.0 * inset, h: stroke, color: self.accent },
                    Shape { kind: ShapeKind::Rect, x: inset, y: h - inset - stroke, w: w - 2.0 * inset, h: stroke, color: self.accent },
                    Shape { kind: ShapeKind::Rect, x: inset, y: inset, w: stroke, h: h - 2.0 * inset, color: self.accent },
                    Shape { kind: ShapeKind::Rect, x: w - inset - stroke, y: inset, w: stroke, h: h - 2.0 * inset, color: self.accent },
                ]
            }
            Geometry::CornerCircle => vec![Shape {
                kind: ShapeKind::Ellipse,
                x: w - 1.75 * INCH,
                y: -1.25 * INCH,
                w: 3.0 * INCH,
                h: 3.0 * INCH,
                color: faded,
            }],
        }
    }

    /// Text placement that keeps clear of this theme's accent shapes.
    pub fn layout(&self, page: PageSize) -> Layout {
        let margin = 0.6 * INCH;
        let (left, title_top) = match self.geometry {
            Geometry::Sidebar => (1.0 * INCH, 0.5 * INCH),
            Geometry::HeaderBlock(_) => (margin, 0.2 * INCH),
            Geometry::Frame => (0.8 * INCH, 0.6 * INCH),
            _ => (margin, 0.5 * INCH),
        };
        let body_top = match self.geometry {
            Geometry::HeaderBlock(_) => 1.5 * INCH,
            _ => title_top + 1.25 * INCH,
        };
        Layout {
            left,
            width: page.width - left - margin,
            title_top,
            body_top,
            body_bottom: page.height - 0.8 * INCH,
        }
    }
}
