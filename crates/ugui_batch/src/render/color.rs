//! Linear colors and the 8-bit tint blend used by every merge path

/// 8-bit RGBA as stored in vertices
pub type Rgba8 = [u8; 4];

/// Linear floating-point RGBA color
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearColor {
    /// Red
    pub r: f32,
    /// Green
    pub g: f32,
    /// Blue
    pub b: f32,
    /// Alpha
    pub a: f32,
}

impl Default for LinearColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl LinearColor {
    /// Opaque white, the identity tint
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Create a color from components
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with a different alpha
    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Section tint: own color with alpha scaled by the inherited alpha
    pub fn tint(self, inherited_alpha: f32) -> Self {
        Self {
            a: self.a * inherited_alpha,
            ..self
        }
    }

    /// Whether multiplying by this tint leaves colors untouched
    pub fn is_identity(&self) -> bool {
        *self == Self::WHITE
    }

    /// Quantize to 8 bits per channel
    pub fn to_rgba8(self) -> Rgba8 {
        let q = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

/// Multiply a stored vertex color by a section tint
///
/// Every path that writes merged vertex colors goes through this function,
/// so a patched buffer matches a fully rebuilt one byte for byte.
#[inline]
pub fn blend(source: Rgba8, tint: &LinearColor) -> Rgba8 {
    let mul = |c: u8, t: f32| (f32::from(c) * t).clamp(0.0, 255.0) as u8;
    [
        mul(source[0], tint.r),
        mul(source[1], tint.g),
        mul(source[2], tint.b),
        mul(source[3], tint.a),
    ]
}
