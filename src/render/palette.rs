//! Level encoding: a normalized intensity becomes a block glyph and an ANSI
//! foreground color. The two tables have different sizes; the color index is
//! scaled from the glyph index so both climb together.

/// Block elements, lowest intensity first.
pub const GLYPHS: [char; 5] = [' ', '░', '▒', '▓', '█'];

/// Rainbow foreground colors, violet (quiet) to bright red (loud).
pub const COLORS: [&str; 9] = [
    "\x1b[35m",   // violet
    "\x1b[34m",   // blue
    "\x1b[94m",   // light blue
    "\x1b[36m",   // cyan
    "\x1b[32m",   // green
    "\x1b[33m",   // yellow
    "\x1b[91m",   // light red
    "\x1b[31m",   // red
    "\x1b[31;1m", // bright red
];

pub const RESET: &str = "\x1b[0m";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Level {
    pub glyph_index: usize,
    pub color_index: usize,
}

impl Level {
    pub fn glyph(&self) -> char {
        GLYPHS[self.glyph_index]
    }

    pub fn color(&self) -> &'static str {
        COLORS[self.color_index]
    }
}

/// `floor(v * (levels - 1))`, clamped. NaN counts as silence.
pub fn glyph_index(value: f32, levels: usize) -> usize {
    if levels <= 1 || value.is_nan() {
        return 0;
    }
    let top = levels - 1;
    let scaled = (value.clamp(0.0, 1.0) * top as f32).floor() as usize;
    scaled.min(top)
}

/// Proportional mapping of a glyph index onto a palette of `colors` entries.
pub fn color_index(glyph_index: usize, glyph_levels: usize, colors: usize) -> usize {
    if glyph_levels <= 1 || colors <= 1 {
        return 0;
    }
    let glyph_index = glyph_index.min(glyph_levels - 1);
    (glyph_index * (colors - 1) / (glyph_levels - 1)).min(colors - 1)
}

pub fn encode(value: f32) -> Level {
    let glyph_index = glyph_index(value, GLYPHS.len());
    Level {
        glyph_index,
        color_index: color_index(glyph_index, GLYPHS.len(), COLORS.len()),
    }
}
