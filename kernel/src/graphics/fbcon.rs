//! Framebuffer text console.
//!
//! Renders text onto a [`Framebuffer`] using the 8x8 bitmap font:
//! cursor tracking, newline/carriage-return/tab/backspace handling,
//! column wrap, and scrolling. The cursor is always inside the character
//! grid, whatever byte sequence is written.

use core::fmt;

use spin::Mutex;

use super::font8x8::{self, FONT_HEIGHT, FONT_WIDTH};
use super::framebuffer::Framebuffer;
use crate::error::{KernelError, KernelResult};
use crate::sync::once_lock::GlobalState;

/// Text console over a pixel framebuffer.
pub struct Console {
    fb: Framebuffer,
    cols: u32,
    rows: u32,
    cursor_col: u32,
    cursor_row: u32,
    fg: u32,
    bg: u32,
}

impl Console {
    /// Build a console over a framebuffer; the surface must hold at least
    /// one character cell.
    pub fn new(fb: Framebuffer, fg: u32, bg: u32) -> KernelResult<Self> {
        let cols = fb.width() / FONT_WIDTH as u32;
        let rows = fb.height() / FONT_HEIGHT as u32;
        if cols == 0 || rows == 0 {
            return Err(KernelError::InvalidArgument {
                name: "fb",
                value: "framebuffer smaller than one character cell",
            });
        }
        let mut console = Self {
            fb,
            cols,
            rows,
            cursor_col: 0,
            cursor_row: 0,
            fg,
            bg,
        };
        console.fb.clear(bg);
        Ok(console)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn cursor(&self) -> (u32, u32) {
        (self.cursor_col, self.cursor_row)
    }

    /// Process one byte: control characters move the cursor, printable
    /// ASCII renders a glyph and advances. Everything else is ignored.
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            b'\r' => self.cursor_col = 0,
            b'\t' => {
                for _ in 0..4 {
                    self.put_char(b' ');
                }
            }
            0x08 => self.backspace(),
            0x20..=0x7E => self.put_char(byte),
            _ => {}
        }
    }

    pub fn write_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.write_byte(byte);
        }
    }

    fn put_char(&mut self, c: u8) {
        self.render_glyph(c, self.cursor_col, self.cursor_row);
        self.cursor_col += 1;
        if self.cursor_col == self.cols {
            self.newline();
        }
    }

    fn newline(&mut self) {
        self.cursor_col = 0;
        if self.cursor_row + 1 == self.rows {
            self.fb.scroll_up(FONT_HEIGHT as u32, self.bg);
        } else {
            self.cursor_row += 1;
        }
    }

    fn backspace(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
            self.render_glyph(b' ', self.cursor_col, self.cursor_row);
        }
    }

    /// Draw one glyph cell. Codepoints without a glyph paint background.
    fn render_glyph(&mut self, c: u8, col: u32, row: u32) {
        let origin_x = col * FONT_WIDTH as u32;
        let origin_y = row * FONT_HEIGHT as u32;
        let bitmap = font8x8::glyph(c);
        for r in 0..FONT_HEIGHT as u32 {
            let bits = bitmap.map_or(0, |g| g[r as usize]);
            for b in 0..FONT_WIDTH as u32 {
                let color = if bits & (1 << b) != 0 { self.fg } else { self.bg };
                self.fb.write_pixel(origin_x + b, origin_y + r, color);
            }
        }
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Console::write_str(self, s);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Global console
// ---------------------------------------------------------------------------

static CONSOLE: GlobalState<Mutex<Console>> = GlobalState::new();

/// Install the boot console. Called once after the ramfb handshake.
pub fn init(console: Console) -> KernelResult<()> {
    CONSOLE
        .init(Mutex::new(console))
        .map_err(|_| KernelError::AlreadyExists {
            resource: "framebuffer console",
            id: 0,
        })
}

pub fn is_initialized() -> bool {
    CONSOLE.is_initialized()
}

/// Write a string to the global console, if one is installed.
pub fn write_str(s: &str) {
    CONSOLE.with(|mtx| {
        let mut console = mtx.lock();
        console.write_str(s);
    });
}

/// Write a single byte to the global console, if one is installed.
pub fn write_byte(byte: u8) {
    CONSOLE.with(|mtx| {
        let mut console = mtx.lock();
        console.write_byte(byte);
    });
}

/// Write a single byte from IRQ context.
///
/// Uses a non-blocking lock: if the kernel thread is mid-print when the
/// interrupt fires, the byte is dropped rather than deadlocking the core.
pub fn write_byte_irq(byte: u8) {
    CONSOLE.with(|mtx| {
        if let Some(mut console) = mtx.try_lock() {
            console.write_byte(byte);
        }
    });
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use super::*;

    const FG: u32 = 0x00FF_FFFF;
    const BG: u32 = 0x0000_0000;

    /// An 8x4-cell console over plain memory.
    fn test_console(width: u32, height: u32) -> (std::vec::Vec<u8>, Console) {
        let mut buf = std::vec![0u8; (width * height * 4) as usize];
        let ptr = buf.as_mut_ptr();
        // SAFETY: buf outlives the console within each test.
        let fb = unsafe { Framebuffer::new(ptr, width, height, width * 4) };
        (buf, Console::new(fb, FG, BG).unwrap())
    }

    /// Count foreground pixels inside one character cell.
    fn fg_pixels_in_cell(console: &Console, col: u32, row: u32) -> usize {
        let mut count = 0;
        for y in 0..FONT_HEIGHT as u32 {
            for x in 0..FONT_WIDTH as u32 {
                let px = console
                    .fb
                    .read_pixel(col * FONT_WIDTH as u32 + x, row * FONT_HEIGHT as u32 + y)
                    .unwrap();
                if px == FG {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn rejects_subcell_framebuffer() {
        let mut buf = std::vec![0u8; 4 * 4 * 4];
        let ptr = buf.as_mut_ptr();
        // SAFETY: buf outlives the call.
        let fb = unsafe { Framebuffer::new(ptr, 4, 4, 16) };
        assert!(Console::new(fb, FG, BG).is_err());
    }

    #[test]
    fn printable_renders_and_advances() {
        let (_buf, mut console) = test_console(64, 32);
        assert_eq!(console.size(), (8, 4));

        console.write_byte(b'A');
        assert_eq!(console.cursor(), (1, 0));
        assert!(fg_pixels_in_cell(&console, 0, 0) > 0);
        // The next cell is untouched background.
        assert_eq!(fg_pixels_in_cell(&console, 1, 0), 0);
    }

    #[test]
    fn control_characters() {
        let (_buf, mut console) = test_console(64, 32);

        console.write_str("ab");
        console.write_byte(b'\r');
        assert_eq!(console.cursor(), (0, 0));

        console.write_byte(b'\n');
        assert_eq!(console.cursor(), (0, 1));

        console.write_byte(b'\t');
        assert_eq!(console.cursor(), (4, 1));

        console.write_byte(0x08);
        assert_eq!(console.cursor(), (3, 1));

        // Backspace at column zero stays put.
        console.write_byte(b'\r');
        console.write_byte(0x08);
        assert_eq!(console.cursor(), (0, 1));

        // Non-printable bytes render nothing and do not move the cursor.
        console.write_byte(0x01);
        console.write_byte(0x80);
        assert_eq!(console.cursor(), (0, 1));
    }

    #[test]
    fn backspace_erases_the_cell() {
        let (_buf, mut console) = test_console(64, 32);
        console.write_byte(b'X');
        assert!(fg_pixels_in_cell(&console, 0, 0) > 0);
        console.write_byte(0x08);
        assert_eq!(fg_pixels_in_cell(&console, 0, 0), 0);
    }

    #[test]
    fn wraps_at_the_last_column() {
        let (_buf, mut console) = test_console(64, 32);
        for _ in 0..8 {
            console.write_byte(b'x');
        }
        assert_eq!(console.cursor(), (0, 1));
    }

    #[test]
    fn scrolls_at_the_bottom_row() {
        let (_buf, mut console) = test_console(64, 32);
        // Rows 0..3: 'A', 'B', 'C', 'D'; the next newline scrolls.
        console.write_str("A\nB\nC\nD");
        assert_eq!(console.cursor(), (1, 3));

        console.write_str("\nE");
        // Cursor stays on the bottom row.
        assert_eq!(console.cursor(), (1, 3));

        // Row 0 now shows 'B': compare against a reference rendering.
        let (_ref_buf, mut reference) = test_console(64, 32);
        reference.write_byte(b'B');
        for y in 0..FONT_HEIGHT as u32 {
            for x in 0..FONT_WIDTH as u32 {
                assert_eq!(console.fb.read_pixel(x, y), reference.fb.read_pixel(x, y));
            }
        }
        // The old bottom row content moved up; 'E' sits at (0, 3).
        assert!(fg_pixels_in_cell(&console, 0, 3) > 0);
    }

    #[test]
    fn single_row_scroll_clears_the_row() {
        let (_buf, mut console) = test_console(64, 8);
        assert_eq!(console.size(), (8, 1));
        console.write_str("hi");
        assert!(fg_pixels_in_cell(&console, 0, 0) > 0);
        console.write_byte(b'\n');
        assert_eq!(console.cursor(), (0, 0));
        for col in 0..8 {
            assert_eq!(fg_pixels_in_cell(&console, col, 0), 0);
        }
    }

    #[test]
    fn cursor_stays_in_bounds_for_arbitrary_input() {
        let (_buf, mut console) = test_console(64, 32);
        let (cols, rows) = console.size();
        for round in 0..4 {
            for byte in 0..=255u8 {
                console.write_byte(byte.wrapping_add(round));
                let (col, row) = console.cursor();
                assert!(col < cols, "column escaped the grid");
                assert!(row < rows, "row escaped the grid");
            }
        }
    }
}
