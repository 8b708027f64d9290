//! Colors and color-stop configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StyleError};

/// Color value in RGBA format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Fully transparent; used for no-data.
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

    /// Neutral gray for category codes missing from the legend.
    pub const UNKNOWN_CATEGORY: Color = Color::new(160, 160, 160, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (the `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Self> {
        let digits = hex.trim().trim_start_matches('#');
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| StyleError::InvalidColor(hex.to_string()))
        };

        if !digits.is_ascii() {
            return Err(StyleError::InvalidColor(hex.to_string()));
        }
        match digits.len() {
            6 => Ok(Self::opaque(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Self::new(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(StyleError::InvalidColor(hex.to_string())),
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Linear color interpolation, rounding each channel.
pub fn interpolate_color(color1: Color, color2: Color, t: f64) -> Color {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;

    Color::new(
        mix(color1.r, color2.r),
        mix(color1.g, color2.g),
        mix(color1.b, color2.b),
        mix(color1.a, color2.a),
    )
}

/// Color stop for a continuous ramp
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ColorStop {
    pub value: f64,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl ColorStop {
    pub fn new(value: f64, color: impl Into<String>) -> Self {
        Self {
            value,
            color: color.into(),
            label: None,
        }
    }
}
