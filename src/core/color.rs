//! Color utilities
//!
//! Functions for parsing configured colors and turning them into terminal
//! escape sequences.

/// An opaque 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    /// ANSI true-color foreground escape for this color
    pub fn ansi_fg(&self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }
}

/// ANSI reset sequence
pub const ANSI_RESET: &str = "\x1b[0m";

/// Parse hex color "#RRGGBB"
///
/// Falls back to white if the hex string is too short; invalid components
/// fall back to 255.
///
/// # Examples
///
/// ```
/// use live_quiz_client::core::color::{parse_hex_color, Rgb};
///
/// let red = parse_hex_color("#FF0000");
/// assert_eq!(red, Rgb { r: 255, g: 0, b: 0 });
/// ```
pub fn parse_hex_color(hex: &str) -> Rgb {
    let hex = hex.trim_start_matches('#');
    if hex.len() < 6 || !hex.is_ascii() {
        return Rgb::WHITE;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).unwrap_or(255);
    let g = u8::from_str_radix(&hex[2..4], 16).unwrap_or(255);
    let b = u8::from_str_radix(&hex[4..6], 16).unwrap_or(255);
    Rgb { r, g, b }
}
