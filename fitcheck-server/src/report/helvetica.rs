//! Static Helvetica metrics and WinAnsi encoding for the base-14 font.
//!
//! Widths are in 1/1000 em, covering ASCII 0x20..=0x7E (index = byte - 32).
//! Bytes outside that range use an average glyph width.

const ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

const AVERAGE_WIDTH: u16 = 556;

fn byte_width(b: u8) -> u16 {
    match b {
        0x20..=0x7E => ASCII_WIDTHS[(b - 0x20) as usize],
        _ => AVERAGE_WIDTH,
    }
}

/// Width of WinAnsi-encoded text in points at `font_size`.
pub fn text_width(encoded: &[u8], font_size: f32) -> f32 {
    let units: u32 = encoded.iter().map(|&b| byte_width(b) as u32).sum();
    units as f32 * font_size / 1000.0
}

/// Encode to WinAnsi. Unmappable characters become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\t' => b' ',
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            _ => b'?',
        })
        .collect()
}
