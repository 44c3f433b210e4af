use super::constants::*;
use super::VgaCard;
use std::path::Path;

/// Expand a 6-bit DAC component to 8 bits.
#[inline]
fn expand6(value: u8) -> u8 {
    let value = value & 0x3F;
    (value << 2) | (value >> 4)
}

/// Pack an 8-bit colour as `0xAABBGGRR` (RGBA bytes in little-endian order).
#[inline]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (b as u32) << 16 | (g as u32) << 8 | r as u32
}

impl VgaCard {
    /// Output size in pixels, derived from the current CRTC, sequencer and
    /// attribute registers.
    pub fn get_output_resolution(&self) -> (usize, usize) {
        let regs = &self.regs;
        let chars = regs.crtc[CRTC_HORIZ_DISPLAY_END] as usize + 1;
        let dot = if regs.graphics_mode() || regs.seq[SEQ_CLOCKING_MODE] & CLOCK_DOT8 != 0 {
            8
        } else {
            9
        };
        let mut width = chars * dot;
        if regs.attr_mode & ATTR_MODE_8BIT != 0 {
            width /= 2;
        }

        let overflow = regs.crtc[CRTC_OVERFLOW] as usize;
        let lines = (regs.crtc[CRTC_VERT_DISPLAY_END] as usize
            | ((overflow >> 1) & 1) << 8
            | ((overflow >> 6) & 1) << 9)
            + 1;
        let height = if regs.graphics_mode() {
            lines / self.scan_repeat()
        } else {
            lines
        };

        (width.max(1), height.max(1))
    }

    /// Output lines per memory row in graphics modes.
    fn scan_repeat(&self) -> usize {
        let max_scan = self.regs.crtc[CRTC_MAX_SCAN_LINE];
        let repeat = (max_scan & 0x1F) as usize + 1;
        if max_scan & MAX_SCAN_DOUBLE != 0 {
            repeat * 2
        } else {
            repeat
        }
    }

    /// Memory units per row: character cells, planar bytes or chain-4
    /// pixels.
    fn row_stride(&self, fallback: usize) -> usize {
        match self.regs.crtc[CRTC_OFFSET] as usize * 2 {
            0 => fallback,
            stride => stride,
        }
    }

    pub fn dac_colour(&self, index: u8) -> u32 {
        let i = (index & self.regs.pel_mask) as usize * 3;
        let dac = &self.regs.dac;
        pack_rgb(expand6(dac[i]), expand6(dac[i + 1]), expand6(dac[i + 2]))
    }

    fn attribute_colour(&self, index: u8) -> u32 {
        self.dac_colour(self.regs.palette[(index & 0x0F) as usize] & 0x3F)
    }

    /// Render output line `line` into `out`. Pixels past the end of `out`
    /// are dropped; lines past the output height are left untouched.
    pub fn draw_scanline(&self, line: usize, out: &mut [u32]) {
        let (width, height) = self.get_output_resolution();
        if line >= height {
            return;
        }
        let width = width.min(out.len());
        let out = &mut out[..width];

        if !self.regs.graphics_mode() {
            self.draw_text_line(line, out);
        } else if self.regs.seq[SEQ_MEMORY_MODE] & MEM_CHAIN4 != 0 {
            self.draw_chain4_line(line, out);
        } else {
            self.draw_planar_line(line, out);
        }
    }

    fn draw_text_line(&self, line: usize, out: &mut [u32]) {
        let regs = &self.regs;
        let char_height = (regs.crtc[CRTC_MAX_SCAN_LINE] & 0x1F) as usize + 1;
        let dot = if regs.seq[SEQ_CLOCKING_MODE] & CLOCK_DOT8 != 0 { 8 } else { 9 };
        let cols = regs.crtc[CRTC_HORIZ_DISPLAY_END] as usize + 1;
        let row = line / char_height;
        let glyph_line = line % char_height;

        let cursor_start = regs.crtc[CRTC_CURSOR_START];
        let cursor_end = regs.crtc[CRTC_CURSOR_END] & 0x1F;
        let cursor_on_line = cursor_start & CURSOR_DISABLE == 0
            && (cursor_start & 0x1F) as usize <= glyph_line
            && glyph_line <= cursor_end as usize;
        let cursor = regs.cursor_address() % PLANE_SIZE;

        let line_graphics = regs.attr_mode & ATTR_MODE_LINE_GRAPHICS != 0;
        let blink = regs.attr_mode & ATTR_MODE_BLINK != 0;
        let row_start = regs.start_address() + row * self.row_stride(cols);

        let (chars, attrs, font) = (self.plane(0), self.plane(1), self.plane(2));
        for (col, pixels) in out.chunks_mut(dot).enumerate() {
            let cell = (row_start + col) % PLANE_SIZE;
            let ch = chars[cell];
            let attr = attrs[cell];
            let glyph = font[(ch as usize * GLYPH_STRIDE + glyph_line) % PLANE_SIZE];

            let fg = self.attribute_colour(attr & 0x0F);
            let bg = self.attribute_colour(if blink { (attr >> 4) & 0x07 } else { attr >> 4 });
            let solid = cursor_on_line && cell == cursor;

            for (x, pixel) in pixels.iter_mut().enumerate() {
                let on = match x {
                    0..=7 => glyph & (0x80 >> x) != 0,
                    // Ninth column repeats the eighth for box drawing characters
                    _ => line_graphics && (0xC0..=0xDF).contains(&ch) && glyph & 1 != 0,
                };
                *pixel = if on || solid { fg } else { bg };
            }
        }
    }

    fn draw_planar_line(&self, line: usize, out: &mut [u32]) {
        let base = self.regs.start_address() + line * self.row_stride(out.len().div_ceil(8));
        let planes = [self.plane(0), self.plane(1), self.plane(2), self.plane(3)];
        let enable = self.regs.attr_plane_enable;

        for (x, pixel) in out.iter_mut().enumerate() {
            let offset = (base + x / 8) % PLANE_SIZE;
            let bit = 7 - (x % 8);
            let index = planes
                .iter()
                .enumerate()
                .fold(0u8, |acc, (p, plane)| acc | ((plane[offset] >> bit) & 1) << p);
            *pixel = self.attribute_colour(index & enable);
        }
    }

    fn draw_chain4_line(&self, line: usize, out: &mut [u32]) {
        let stride = self.row_stride(out.len() / 4) * 4;
        let base = self.regs.start_address() * 4 + line * stride;

        for (x, pixel) in out.iter_mut().enumerate() {
            let address = base + x;
            let value = self.plane(address & 3)[(address >> 2) % PLANE_SIZE];
            *pixel = self.dac_colour(value);
        }
    }

    /// Render the whole output into `frame`, resizing it to fit. Returns the
    /// output resolution.
    pub fn render_frame(&self, frame: &mut Vec<u32>) -> (usize, usize) {
        let (width, height) = self.get_output_resolution();
        frame.resize(width * height, 0);
        for (line, row) in frame.chunks_mut(width).enumerate() {
            self.draw_scanline(line, row);
        }
        (width, height)
    }

    pub fn screenshot(&self) -> image::RgbaImage {
        let mut frame = Vec::new();
        let (width, height) = self.render_frame(&mut frame);
        image::RgbaImage::from_fn(width as u32, height as u32, |x, y| {
            image::Rgba(frame[y as usize * width + x as usize].to_le_bytes())
        })
    }

    pub fn save_screenshot(&self, path: impl AsRef<Path>) -> Result<(), image::ImageError> {
        self.screenshot().save(path)
    }
}
