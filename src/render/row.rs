use std::io::{self, Write};

use super::palette::{self, RESET};

/// Builds one line: color escape, glyph, reset, for every intensity. The row is
/// expected to be fitted already; nothing is trimmed here.
pub fn render_line(row: &[f32]) -> String {
    // escape (<= 8 bytes) + glyph (3 bytes) + reset (4 bytes)
    let mut line = String::with_capacity(row.len() * 16);
    for &value in row {
        let level = palette::encode(value);
        line.push_str(level.color());
        line.push(level.glyph());
        line.push_str(RESET);
    }
    line
}

pub fn write_row<W: Write>(out: &mut W, row: &[f32]) -> io::Result<()> {
    let line = render_line(row);
    writeln!(out, "{}", line)?;
    out.flush()
}
