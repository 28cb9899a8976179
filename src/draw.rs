// Window + software drawing utilities.
// Provided here:
// 1) A window that shows the annotated frame with a scrub bar under it.
// 2) Key and mouse handling that turns input into player commands.
// 3) Filled circles/rectangles and a tiny 5x7 bitmap font for the overlay.

use crate::error::Error;
use crate::player::{Scrub, Ui};
use crate::types::{Command, FrameBuffer, TrackedPoint};
use minifb::{Key, KeyRepeat, MouseButton, MouseMode, Window, WindowOptions};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Height of the scrub bar below the frame.
pub const SCRUB_HEIGHT: usize = 14;

/// How often input is polled while waiting for a command.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

const SCRUB_TRACK: u32 = 0x00_30_30_30;
const SCRUB_FILL: u32 = 0x00_50_80_FF;
const SCRUB_KNOB: u32 = 0x00_FF_FF_FF;

pub struct Drawer {
    window: Window,          // the on-screen window you see
    width: usize,            // frame area, the scrub bar sits below it
    height: usize,
    scrub: bool,
    buffer: Vec<u32>,        // frame area + scrub bar
    frame_count: usize,
    input: InputState,
}

/// Mouse edge and scrub drag state between polls. A key and a click landing
/// in the same poll are both delivered, key first.
#[derive(Debug, Default)]
struct InputState {
    left_was_down: bool,
    last_seek: Option<usize>,
    queued: VecDeque<Command>,
}

impl InputState {
    /// Fold one sample of the window into at most one command. `scrub` is the
    /// bar width and frame count when a scrub bar is shown below `frame_height`.
    fn poll(
        &mut self,
        key: Option<Command>,
        left_down: bool,
        mouse: Option<(f32, f32)>,
        frame_height: usize,
        scrub: Option<(usize, usize)>,
    ) -> Option<Command> {
        let clicked = self.mouse_command(left_down, mouse, frame_height, scrub);
        self.queued.extend(key);
        self.queued.extend(clicked);
        self.queued.pop_front()
    }

    fn mouse_command(
        &mut self,
        down: bool,
        mouse: Option<(f32, f32)>,
        frame_height: usize,
        scrub: Option<(usize, usize)>,
    ) -> Option<Command> {
        let pressed = down && !self.left_was_down;
        self.left_was_down = down;
        if !down {
            self.last_seek = None;
        }

        let (mx, my) = mouse?;
        if my < frame_height as f32 {
            return pressed.then(|| Command::AddPoint(TrackedPoint::new(mx.floor(), my.floor())));
        }
        let (width, count) = scrub?;
        if down && count > 0 {
            let pos = scrub_position(mx, width, count);
            if self.last_seek != Some(pos) {
                self.last_seek = Some(pos);
                return Some(Command::Seek(pos));
            }
        }
        None
    }
}

impl Drawer {
    /// Create a window sized to the frames, plus a scrub bar when `scrub` is set.
    pub fn new(title: &str, width: usize, height: usize, scrub: bool) -> Result<Self, Error> {
        let total_height = height + if scrub { SCRUB_HEIGHT } else { 0 };
        let window = Window::new(title, width, total_height, WindowOptions::default())
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        Ok(Self {
            window,
            width,
            height,
            scrub,
            buffer: vec![0u32; width * total_height],
            frame_count: 0,
            input: InputState::default(),
        })
    }

    fn poll_command(&mut self) -> Option<Command> {
        let key = self
            .window
            .get_keys_pressed(KeyRepeat::No)
            .into_iter()
            .find_map(command_for_key);
        let down = self.window.get_mouse_down(MouseButton::Left);
        let mouse = self.window.get_mouse_pos(MouseMode::Discard);
        let scrub = (self.scrub && self.frame_count > 0).then_some((self.width, self.frame_count));
        self.input.poll(key, down, mouse, self.height, scrub)
    }
}

impl Ui for Drawer {
    /// Push the frame (and scrub bar) for this tick to the screen.
    fn present(&mut self, screen: &FrameBuffer, scrub: Option<Scrub>) -> Result<(), Error> {
        let w = self.width.min(screen.width);
        for y in 0..self.height.min(screen.height) {
            let src = &screen.pixels[y * screen.width..y * screen.width + w];
            self.buffer[y * self.width..y * self.width + w].copy_from_slice(src);
        }

        if let (true, Some(scrub)) = (self.scrub, scrub) {
            self.frame_count = scrub.count;
            let mut bar = FrameBuffer {
                width: self.width,
                height: SCRUB_HEIGHT,
                pixels: vec![SCRUB_TRACK; self.width * SCRUB_HEIGHT],
            };
            let knob = scrub_knob_x(scrub.position, scrub.count, self.width);
            fill_rect(&mut bar, 0, 4, knob as i32, (SCRUB_HEIGHT - 8) as i32, SCRUB_FILL);
            fill_rect(&mut bar, knob as i32 - 2, 1, 5, (SCRUB_HEIGHT - 2) as i32, SCRUB_KNOB);
            let start = self.height * self.width;
            self.buffer[start..start + bar.pixels.len()].copy_from_slice(&bar.pixels);
        }

        let total_height = self.buffer.len() / self.width.max(1);
        self.window
            .update_with_buffer(&self.buffer, self.width, total_height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))
    }

    /// Pump window events until a command arrives or `timeout` passes.
    /// Without a timeout this only returns on a command; closing the window
    /// counts as quitting.
    fn wait_command(&mut self, timeout: Option<Duration>) -> Result<Option<Command>, Error> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if !self.window.is_open() {
                return Ok(Some(Command::Quit));
            }
            if let Some(cmd) = self.poll_command() {
                return Ok(Some(cmd));
            }
            let nap = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return Ok(None);
                    }
                    POLL_INTERVAL.min(d - now)
                }
                None => POLL_INTERVAL,
            };
            std::thread::sleep(nap);
            self.window.update();
        }
    }
}

/// Hot keys. Letters are matched regardless of shift.
pub fn command_for_key(key: Key) -> Option<Command> {
    match key {
        Key::Q | Key::Escape => Some(Command::Quit),
        Key::T => Some(Command::Redetect),
        Key::C => Some(Command::Clear),
        Key::N => Some(Command::ToggleNight),
        Key::R => Some(Command::Run),
        Key::S => Some(Command::Step),
        _ => None,
    }
}

/// Frame index for a click at `x` on a bar `width` pixels wide.
pub fn scrub_position(x: f32, width: usize, count: usize) -> usize {
    if count <= 1 || width <= 1 {
        return 0;
    }
    let t = (x / (width - 1) as f32).clamp(0.0, 1.0);
    (t * (count - 1) as f32).round() as usize
}

/// Knob column for frame `position` of `count`.
pub fn scrub_knob_x(position: usize, count: usize, width: usize) -> usize {
    if count <= 1 || width <= 1 {
        return 0;
    }
    position.min(count - 1) * (width - 1) / (count - 1)
}

/* ---------- Software drawing: pixels, shapes, tiny bitmap font ---------- */

/// Put a pixel on the framebuffer if (x,y) is inside bounds.
#[inline]
pub fn put_pixel(fb: &mut FrameBuffer, x: i32, y: i32, color: u32) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as usize, y as usize);
    if x >= fb.width || y >= fb.height {
        return;
    }
    let idx = y * fb.width + x;
    fb.pixels[idx] = color;
}

/// Filled disc of `radius` pixels centered at (cx,cy), clipped to the frame.
pub fn fill_circle(fb: &mut FrameBuffer, cx: i32, cy: i32, radius: i32, color: u32) {
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put_pixel(fb, cx + dx, cy + dy, color);
            }
        }
    }
}

/// Filled axis-aligned rectangle, clipped to the frame.
pub fn fill_rect(fb: &mut FrameBuffer, x: i32, y: i32, w: i32, h: i32, color: u32) {
    for yy in y..y + h {
        for xx in x..x + w {
            put_pixel(fb, xx, yy, color);
        }
    }
}

/* ---------- 5x7 bitmap font (ASCII subset the HUD needs) ---------- */

/// Return a 5x7 glyph bitmap for a limited character set.
/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch.to_ascii_uppercase() {
        // Digits 0..9
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),

        'A' => g!(0b01110,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'D' => g!(0b11100,0b10010,0b10001,0b10001,0b10001,0b10010,0b11100),
        'E' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b11111),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'G' => g!(0b01110,0b10001,0b10000,0b10111,0b10001,0b10001,0b01111),
        'H' => g!(0b10001,0b10001,0b10001,0b11111,0b10001,0b10001,0b10001),
        'I' => g!(0b01110,0b00100,0b00100,0b00100,0b00100,0b00100,0b01110),
        'L' => g!(0b10000,0b10000,0b10000,0b10000,0b10000,0b10000,0b11111),
        'M' => g!(0b10001,0b11011,0b10101,0b10101,0b10001,0b10001,0b10001),
        'N' => g!(0b10001,0b11001,0b10101,0b10011,0b10001,0b10001,0b10001),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'R' => g!(0b11110,0b10001,0b10001,0b11110,0b10100,0b10010,0b10001),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        'T' => g!(0b11111,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        'U' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b10001,0b01110),
        'V' => g!(0b10001,0b10001,0b10001,0b10001,0b10001,0b01010,0b00100),

        // Punctuation: space, vertical bar, colon, dot, slash
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        '|' => g!(0b00100,0b00100,0b00100,0b00100,0b00100,0b00100,0b00100),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        '.' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00100,0b00000),
        '/' => g!(0b00001,0b00010,0b00010,0b00100,0b01000,0b01000,0b10000),

        _ => None,
    }
}

/// Draw a single 5x7 character at (x,y) with a 1-pixel black shadow for contrast.
fn draw_char_5x7(fb: &mut FrameBuffer, x: i32, y: i32, ch: char, color: u32) {
    if let Some(rows) = glyph5x7(ch) {
        for (offset, c) in [(1, 0x00000000), (0, color)] {
            for (ry, rowbits) in rows.iter().enumerate() {
                for rx in 0..5 {
                    if (rowbits & (1 << (4 - rx))) != 0 {
                        put_pixel(fb, x + rx + offset, y + ry as i32 + offset, c);
                    }
                }
            }
        }
    }
}

/// Draw a text string using 5x7 glyphs, 1-pixel spacing.
pub fn draw_text_5x7(fb: &mut FrameBuffer, mut x: i32, y: i32, text: &str, color: u32) {
    for ch in text.chars() {
        draw_char_5x7(fb, x, y, ch, color);
        x += 6; // 5 pixels glyph width + 1 pixel spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_keys_map_to_commands() {
        assert_eq!(command_for_key(Key::Q), Some(Command::Quit));
        assert_eq!(command_for_key(Key::Escape), Some(Command::Quit));
        assert_eq!(command_for_key(Key::T), Some(Command::Redetect));
        assert_eq!(command_for_key(Key::C), Some(Command::Clear));
        assert_eq!(command_for_key(Key::N), Some(Command::ToggleNight));
        assert_eq!(command_for_key(Key::R), Some(Command::Run));
        assert_eq!(command_for_key(Key::S), Some(Command::Step));
        assert_eq!(command_for_key(Key::X), None);
    }

    #[test]
    fn a_key_does_not_swallow_a_click() {
        let mut input = InputState::default();
        let at = Some((12.7, 30.2));
        let click = Command::AddPoint(TrackedPoint::new(12.0, 30.0));

        assert_eq!(input.poll(Some(Command::Redetect), true, at, 48, None), Some(Command::Redetect));
        // button still held: the click was recorded once, handed out now
        assert_eq!(input.poll(None, true, at, 48, None), Some(click));
        assert_eq!(input.poll(None, true, at, 48, None), None);
        assert_eq!(input.poll(None, false, at, 48, None), None);
        assert_eq!(input.poll(None, true, at, 48, None), Some(click));
    }

    #[test]
    fn dragging_the_bar_seeks_once_per_frame_index() {
        let mut input = InputState::default();
        let bar = Some((101, 11));
        let poll = |input: &mut InputState, down, x| input.poll(None, down, Some((x, 50.0)), 48, bar);

        assert_eq!(poll(&mut input, true, 50.0), Some(Command::Seek(5)));
        assert_eq!(poll(&mut input, true, 51.0), None);
        assert_eq!(poll(&mut input, true, 100.0), Some(Command::Seek(10)));
        assert_eq!(poll(&mut input, false, 100.0), None);
        assert_eq!(poll(&mut input, true, 100.0), Some(Command::Seek(10)));
        // no bar for live sources
        assert_eq!(input.poll(None, true, Some((10.0, 50.0)), 48, None), None);
    }

    #[test]
    fn scrub_maps_both_ways() {
        assert_eq!(scrub_position(0.0, 101, 11), 0);
        assert_eq!(scrub_position(100.0, 101, 11), 10);
        assert_eq!(scrub_position(51.0, 101, 11), 5);
        assert_eq!(scrub_position(500.0, 101, 11), 10);
        assert_eq!(scrub_position(-4.0, 101, 11), 0);
        assert_eq!(scrub_knob_x(5, 11, 101), 50);
        assert_eq!(scrub_knob_x(20, 11, 101), 100);
        assert_eq!(scrub_knob_x(3, 1, 101), 0);
    }

    #[test]
    fn circle_is_clipped_to_the_frame() {
        let mut fb = FrameBuffer::black(5, 5);
        fill_circle(&mut fb, 0, 0, 3, 0x00_00_FF_00);
        assert_eq!(fb.pixels[0], 0x00_00_FF_00);
        assert_eq!(fb.pixels[4 * 5 + 4], 0);
        let lit = fb.pixels.iter().filter(|&&p| p != 0).count();
        // quarter disc of radius 3 incl. axes
        assert_eq!(lit, 11);
    }

    #[test]
    fn text_draws_only_known_glyphs() {
        let mut fb = FrameBuffer::black(40, 10);
        draw_text_5x7(&mut fb, 1, 1, "~", 0x00_FF_FF_FF);
        assert!(fb.pixels.iter().all(|&p| p == 0));
        draw_text_5x7(&mut fb, 1, 1, "run 1/2", 0x00_FF_FF_FF);
        assert!(fb.pixels.iter().any(|&p| p == 0x00_FF_FF_FF));
    }
}
