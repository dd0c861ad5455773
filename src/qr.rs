//! Minimal QR code generator.
//!
//! Byte mode only, versions 1–10, a fixed capacity table, mask pattern 0 and
//! the format string for low error correction. No error-correction codewords
//! are appended; unused data modules stay light. Good enough for short URLs on
//! a screen, not a conformant ISO/IEC 18004 encoder.

use thiserror::Error;

pub const MAX_VERSION: usize = 10;

/// The 8-bit character count field caps the payload.
pub const MAX_PAYLOAD_BYTES: usize = 255;

/// Payload bytes each version accepts.
const PAYLOAD_CAPACITY: [usize; MAX_VERSION] = [17, 32, 53, 78, 106, 134, 154, 192, 230, 271];

/// Data codewords each version carries (payload + mode/length/terminator).
const CODEWORD_CAPACITY: [usize; MAX_VERSION] = [19, 34, 55, 80, 108, 136, 156, 194, 232, 274];

const BYTE_MODE: [bool; 4] = [false, true, false, false];
const PAD_CODEWORDS: [u8; 2] = [236, 17];

/// Format string for error correction L with mask 0.
const FORMAT_BITS: [u8; 15] = [1, 1, 1, 0, 1, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QrError {
    #[error("QR payload is {len} bytes; at most {MAX_PAYLOAD_BYTES} fit")]
    TooLong { len: usize },
}

/// A finished symbol: `true` is a dark module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrMatrix {
    version: usize,
    size: usize,
    modules: Vec<bool>,
}

impl QrMatrix {
    pub fn version(&self) -> usize {
        self.version
    }

    /// Modules per side (`4 * version + 17`).
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_dark(&self, row: usize, col: usize) -> bool {
        self.modules[row * self.size + col]
    }

    pub fn dark_count(&self) -> usize {
        self.modules.iter().filter(|m| **m).count()
    }
}

/// Smallest version whose payload capacity fits `len` bytes.
pub fn version_for(len: usize) -> Option<usize> {
    PAYLOAD_CAPACITY
        .iter()
        .position(|cap| len <= *cap)
        .map(|idx| idx + 1)
}

/// Alignment pattern centre coordinates for `version` (empty for version 1).
fn alignment_positions(version: usize) -> Vec<usize> {
    if version == 1 {
        return Vec::new();
    }

    let last = version * 4 + 10;
    let step = last / (version / 7 + 1);
    let mut positions = vec![6];
    let mut pos = last;
    while pos > 10 {
        positions.push(pos);
        pos = pos.saturating_sub(step);
    }
    positions
}

fn push_bits(bits: &mut Vec<bool>, value: u8) {
    for shift in (0..8).rev() {
        bits.push((value >> shift) & 1 == 1);
    }
}

/// Mode indicator, length, payload, terminator and pad codewords, filled up to
/// the version's codeword capacity.
fn encode_data(payload: &[u8], version: usize) -> Vec<bool> {
    let capacity_bits = CODEWORD_CAPACITY[version - 1] * 8;
    let mut bits = Vec::with_capacity(capacity_bits);

    bits.extend_from_slice(&BYTE_MODE);
    push_bits(&mut bits, payload.len() as u8);
    for byte in payload {
        push_bits(&mut bits, *byte);
    }
    bits.extend_from_slice(&[false; 4]);
    while bits.len() % 8 != 0 {
        bits.push(false);
    }

    let mut pad = PAD_CODEWORDS.iter().cycle();
    while bits.len() < capacity_bits {
        if let Some(codeword) = pad.next() {
            push_bits(&mut bits, *codeword);
        }
    }

    bits
}

/// Symbol under construction; `None` marks a module no step has claimed yet.
struct Grid {
    size: usize,
    cells: Vec<Option<bool>>,
}

impl Grid {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    fn get(&self, row: usize, col: usize) -> Option<bool> {
        self.cells[row * self.size + col]
    }

    fn set(&mut self, row: usize, col: usize, dark: bool) {
        self.cells[row * self.size + col] = Some(dark);
    }

    fn set_if_free(&mut self, row: usize, col: usize, dark: bool) {
        if self.get(row, col).is_none() {
            self.set(row, col, dark);
        }
    }

    /// Coordinates offset by `(dr, dc)`, if they fall inside the symbol.
    fn offset(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let r = row.checked_add_signed(dr)?;
        let c = col.checked_add_signed(dc)?;
        (r < self.size && c < self.size).then_some((r, c))
    }

    /// 7×7 finder with its light separator ring, anchored at its top-left corner.
    fn finder(&mut self, row: usize, col: usize) {
        for dr in -1..=7isize {
            for dc in -1..=7isize {
                let Some((r, c)) = self.offset(row, col, dr, dc) else {
                    continue;
                };
                let separator = dr == -1 || dr == 7 || dc == -1 || dc == 7;
                let ring = dr == 0 || dr == 6 || dc == 0 || dc == 6;
                let core = (2..=4).contains(&dr) && (2..=4).contains(&dc);
                self.set(r, c, !separator && (ring || core));
            }
        }
    }

    /// 5×5 alignment pattern around a centre; never overwrites claimed modules.
    fn alignment(&mut self, row: usize, col: usize) {
        for dr in -2..=2isize {
            for dc in -2..=2isize {
                let Some((r, c)) = self.offset(row, col, dr, dc) else {
                    continue;
                };
                let dark = dr.abs() == 2 || dc.abs() == 2 || (dr == 0 && dc == 0);
                self.set_if_free(r, c, dark);
            }
        }
    }

    /// Zig-zag over column pairs from the right edge, skipping the vertical
    /// timing column. Modules left over after the bit stream ends stay light.
    /// Returns which modules received data.
    fn place_data(&mut self, bits: &[bool]) -> Vec<bool> {
        let size = self.size;
        let mut filled = vec![false; size * size];
        let mut stream = bits.iter().copied();
        let mut upward = true;
        let mut col = size - 1;

        loop {
            if col == 6 {
                col = 5;
            }

            for step in 0..size {
                let row = if upward { size - 1 - step } else { step };
                for c in [col, col - 1] {
                    if self.get(row, c).is_none() {
                        self.set(row, c, stream.next().unwrap_or(false));
                        filled[row * size + c] = true;
                    }
                }
            }
            upward = !upward;

            if col < 3 {
                break;
            }
            col -= 2;
        }

        filled
    }

    /// Outside the three finder corners and the timing row/column.
    fn in_data_region(&self, row: usize, col: usize) -> bool {
        let size = self.size;
        let top_left = row < 9 && col < 9;
        let top_right = row < 9 && col >= size - 8;
        let bottom_left = row >= size - 8 && col < 9;
        !(top_left || top_right || bottom_left || row == 6 || col == 6)
    }

    /// Mask 0: invert data modules where `(row + col)` is even.
    fn apply_mask(&mut self, filled: &[bool]) {
        for row in 0..self.size {
            for col in 0..self.size {
                if filled[row * self.size + col]
                    && self.in_data_region(row, col)
                    && (row + col) % 2 == 0
                {
                    let dark = self.get(row, col).unwrap_or(false);
                    self.set(row, col, !dark);
                }
            }
        }
    }

    fn format_info(&mut self) {
        let size = self.size;
        let bit = |i: usize| FORMAT_BITS[i] == 1;

        for i in 0..6 {
            self.set(8, i, bit(i));
            self.set(i, 8, bit(14 - i));
        }
        self.set(8, 7, bit(6));
        self.set(8, 8, bit(7));
        self.set(7, 8, bit(8));

        for i in 0..7 {
            self.set(8, size - 1 - i, bit(14 - i));
            self.set(size - 1 - i, 8, bit(i));
        }
        self.set(size - 8, 8, true);
    }
}

/// Encode `text` (as UTF-8 bytes) into a QR symbol.
pub fn generate_qr(text: &str) -> Result<QrMatrix, QrError> {
    let payload = text.as_bytes();
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(QrError::TooLong { len: payload.len() });
    }
    let version = version_for(payload.len()).ok_or(QrError::TooLong { len: payload.len() })?;
    let size = version * 4 + 17;
    let mut grid = Grid::new(size);

    grid.finder(0, 0);
    grid.finder(size - 7, 0);
    grid.finder(0, size - 7);

    let centres = alignment_positions(version);
    for &row in &centres {
        for &col in &centres {
            if row < size && col < size && grid.get(row, col).is_none() {
                grid.alignment(row, col);
            }
        }
    }

    for i in 8..size - 8 {
        grid.set(6, i, i % 2 == 0);
        grid.set(i, 6, i % 2 == 0);
    }

    grid.set(size - 8, 8, true);

    for i in 0..9 {
        grid.set_if_free(8, i, false);
        grid.set_if_free(i, 8, false);
        grid.set_if_free(8, size - 1 - i, false);
        grid.set_if_free(size - 1 - i, 8, false);
    }

    let bits = encode_data(payload, version);
    let filled = grid.place_data(&bits);
    grid.apply_mask(&filled);
    grid.format_info();

    Ok(QrMatrix {
        version,
        size,
        modules: grid.cells.into_iter().map(|m| m.unwrap_or(false)).collect(),
    })
}

/// Render as a square SVG `pixel_size` wide: a white background followed by
/// one black `<rect>` per dark module.
pub fn qr_to_svg(matrix: &QrMatrix, pixel_size: u32) -> String {
    let module = f64::from(pixel_size) / matrix.size() as f64;

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {pixel_size} {pixel_size}" width="{pixel_size}" height="{pixel_size}">"#
    );
    svg.push_str(&format!(
        r#"<rect width="{pixel_size}" height="{pixel_size}" fill="white"/>"#
    ));

    for row in 0..matrix.size() {
        for col in 0..matrix.size() {
            if matrix.is_dark(row, col) {
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{module}" height="{module}" fill="black"/>"#,
                    col as f64 * module,
                    row as f64 * module,
                ));
            }
        }
    }

    svg.push_str("</svg>");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Finder at (row, col): dark outer ring, light inner ring, dark 3×3 core.
    fn assert_finder(m: &QrMatrix, row: usize, col: usize) {
        for dr in 0..7 {
            for dc in 0..7 {
                let ring = dr == 0 || dr == 6 || dc == 0 || dc == 6;
                let core = (2..=4).contains(&dr) && (2..=4).contains(&dc);
                assert_eq!(
                    m.is_dark(row + dr, col + dc),
                    ring || core,
                    "finder at ({row},{col}) broken at +({dr},{dc})"
                );
            }
        }
    }

    #[test]
    fn short_url_fits_version_one() {
        let m = generate_qr("https://x.io/a").unwrap();
        assert_eq!(m.version(), 1);
        assert_eq!(m.size(), 21);

        let size = m.size();
        assert_finder(&m, 0, 0);
        assert_finder(&m, 0, size - 7);
        assert_finder(&m, size - 7, 0);

        // Separators stay light.
        for i in 0..8 {
            assert!(!m.is_dark(7, i));
            assert!(!m.is_dark(i, size - 8));
            assert!(!m.is_dark(size - 8, i));
        }
        assert!(m.is_dark(size - 8, 8), "dark module");
    }

    #[test]
    fn size_follows_version() {
        for (text_len, version) in [(17, 1), (18, 2), (53, 3), (150, 7), (255, 10)] {
            let m = generate_qr(&"a".repeat(text_len)).unwrap();
            assert_eq!(m.version(), version, "{text_len} bytes");
            assert_eq!(m.size(), 4 * version + 17);
            assert_finder(&m, 0, 0);
            assert_finder(&m, 0, m.size() - 7);
            assert_finder(&m, m.size() - 7, 0);
        }
    }

    #[test]
    fn timing_row_alternates() {
        let m = generate_qr("https://example.com/some/longer/path").unwrap();
        for i in 8..m.size() - 8 {
            assert_eq!(m.is_dark(6, i), i % 2 == 0);
            assert_eq!(m.is_dark(i, 6), i % 2 == 0);
        }
    }

    #[test]
    fn version_two_places_alignment_pattern() {
        let m = generate_qr(&"b".repeat(20)).unwrap();
        assert_eq!(m.version(), 2);
        // Centre at (18, 18): dark centre, light ring, dark border.
        assert!(m.is_dark(18, 18));
        assert!(!m.is_dark(17, 18));
        assert!(!m.is_dark(19, 19));
        assert!(m.is_dark(16, 16));
        assert!(m.is_dark(20, 18));
    }

    #[test]
    fn format_bits_are_written() {
        let m = generate_qr("https://x.io/a").unwrap();
        let size = m.size();
        for i in 0..6 {
            assert_eq!(m.is_dark(8, i), FORMAT_BITS[i] == 1);
            assert_eq!(m.is_dark(i, 8), FORMAT_BITS[14 - i] == 1);
        }
        for i in 0..7 {
            assert_eq!(m.is_dark(size - 1 - i, 8), FORMAT_BITS[i] == 1);
            assert_eq!(m.is_dark(8, size - 1 - i), FORMAT_BITS[14 - i] == 1);
        }
    }

    #[test]
    fn encoding_starts_with_mode_and_length_then_pads() {
        let bits = encode_data(b"AB", 1);
        assert_eq!(bits.len(), 19 * 8);

        let byte = |i: usize| {
            bits[i * 8..i * 8 + 8]
                .iter()
                .fold(0u8, |acc, b| (acc << 1) | u8::from(*b))
        };
        // 0100 | 0000 0010 | 'A' | 'B' | 0000 → 0x40 0x24 0x14 0x24 0x20
        assert_eq!(
            [byte(0), byte(1), byte(2), byte(3)],
            [0x40, 0x24, 0x14, 0x20]
        );
        assert_eq!(byte(4), 236);
        assert_eq!(byte(5), 17);
        assert_eq!(byte(6), 236);
    }

    #[test]
    fn alignment_positions_per_version() {
        assert!(alignment_positions(1).is_empty());
        assert_eq!(alignment_positions(2), vec![6, 18]);
        assert_eq!(alignment_positions(7), vec![6, 38, 19]);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        assert_eq!(
            generate_qr(&"z".repeat(256)),
            Err(QrError::TooLong { len: 256 })
        );
    }

    #[test]
    fn svg_has_one_rect_per_dark_module_plus_background() {
        let m = generate_qr("https://x.io/a").unwrap();
        let svg = qr_to_svg(&m, 210);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect").count(), m.dark_count() + 1);
        assert!(svg.contains(r#"<rect width="210" height="210" fill="white"/>"#));
        assert!(svg.contains(r#"<rect x="0" y="0" width="10" height="10" fill="black"/>"#));
    }
}
