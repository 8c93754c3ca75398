use std::{fmt, str::FromStr};

use crate::foundation::error::{ForgeError, ForgeResult};

/// Calibration resolution shared by every reference in a panel.
pub const PIXELS_PER_CM: u32 = 10;
/// Smallest accepted character height.
pub const MIN_HEIGHT_CM: u32 = 50;
/// Largest accepted character height.
pub const MAX_HEIGHT_CM: u32 = 250;
/// Upper bound for a configured calibration resolution.
pub const MAX_PIXELS_PER_CM: u32 = 100;
/// Upper bound for label band height and label padding.
pub const MAX_LABEL_PX: u32 = 1_000;

/// Straight-alpha RGB color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    /// The chroma key every character render is drawn against.
    pub const KEY_GREEN: Rgb8 = Rgb8 { r: 0, g: 255, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Euclidean distance in RGB space.
    pub fn distance(self, other: [u8; 3]) -> f32 {
        let dr = f32::from(self.r) - f32::from(other[0]);
        let dg = f32::from(self.g) - f32::from(other[1]);
        let db = f32::from(self.b) - f32::from(other[2]);
        (dr * dr + dg * dg + db * db).sqrt()
    }

    /// Index of the strongest channel (0 = r, 1 = g, 2 = b); ties resolve to the lower index.
    pub fn dominant_channel(self) -> usize {
        let c = self.to_array();
        let mut best = 0;
        for i in 1..3 {
            if c[i] > c[best] {
                best = i;
            }
        }
        best
    }
}

impl Default for Rgb8 {
    fn default() -> Self {
        Self::KEY_GREEN
    }
}

/// Axis-aligned pixel rectangle, `x`/`y` inclusive origin, `width`/`height` extents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(self) -> u32 {
        self.y + self.height
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the rectangle reaches all four borders of a `width` x `height` image.
    pub fn touches_all_edges(self, width: u32, height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.right() == width && self.bottom() == height
    }
}

/// Panel orientation implied by an [`AspectRatio`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Portrait,
    Landscape,
    Square,
}

/// The fixed set of panel aspect ratios accepted by the generator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    /// `1:1`
    Square,
    /// `3:4`
    #[default]
    Portrait3x4,
    /// `4:3`
    Landscape4x3,
    /// `9:16`
    Tall9x16,
    /// `16:9`
    Wide16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Tall9x16,
        AspectRatio::Wide16x9,
    ];

    /// Canonical `w:h` tag.
    pub fn tag(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Tall9x16 => "9:16",
            AspectRatio::Wide16x9 => "16:9",
        }
    }

    /// Nominal output size in pixels `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Portrait3x4 => (1024, 1365),
            AspectRatio::Landscape4x3 => (1365, 1024),
            AspectRatio::Tall9x16 => (1008, 1792),
            AspectRatio::Wide16x9 => (1792, 1008),
        }
    }

    pub fn orientation(self) -> Orientation {
        let (w, h) = self.dimensions();
        match w.cmp(&h) {
            std::cmp::Ordering::Less => Orientation::Portrait,
            std::cmp::Ordering::Greater => Orientation::Landscape,
            std::cmp::Ordering::Equal => Orientation::Square,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for AspectRatio {
    type Err = ForgeError;

    fn from_str(s: &str) -> ForgeResult<Self> {
        let s = s.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ar| ar.tag() == s)
            .ok_or_else(|| {
                ForgeError::validation(format!(
                    "unsupported aspect ratio '{s}' (expected one of 1:1, 3:4, 4:3, 9:16, 16:9)"
                ))
            })
    }
}

impl serde::Serialize for AspectRatio {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

impl<'de> serde::Deserialize<'de> for AspectRatio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
