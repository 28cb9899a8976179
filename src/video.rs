// Seekable file sources: an animated GIF, a single still image, or a directory
// of frame images played in file-name order.
//
// Every frame is delivered at the size of the first one so consecutive
// grayscale frames always line up.

use crate::error::Error;
use crate::source::{FrameSource, SourceInfo, SourceKind};
use crate::types::FrameBuffer;
use image::codecs::gif::GifDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, ImageFormat, RgbImage};
use log::debug;
use std::cmp::Ordering;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

enum Frames {
    /// Decoded up front (GIF, still image).
    Decoded(Vec<FrameBuffer>),
    /// Decoded on demand from disk.
    Files(Vec<PathBuf>),
}

pub struct FrameSequence {
    kind: SourceKind,
    frames: Frames,
    fps: f64,
    width: u32,
    height: u32,
    position: usize,
}

fn open_error(path: &Path, reason: impl ToString) -> Error {
    Error::SourceOpen { path: path.to_path_buf(), reason: reason.to_string() }
}

/// Scale `rgb` to `width` x `height` unless it already has that size.
fn fit(rgb: RgbImage, width: u32, height: u32) -> RgbImage {
    if rgb.dimensions() == (width, height) {
        rgb
    } else {
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    }
}

/// Orders `frame_2` before `frame_10`: runs of digits compare by value.
fn natural_cmp(mut a: &str, mut b: &str) -> Ordering {
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let na = a.find(|c: char| !c.is_ascii_digit()).unwrap_or(a.len());
                let nb = b.find(|c: char| !c.is_ascii_digit()).unwrap_or(b.len());
                let da = a[..na].trim_start_matches('0');
                let db = b[..nb].trim_start_matches('0');
                let ord = da.len().cmp(&db.len()).then_with(|| da.cmp(db));
                if ord != Ordering::Equal {
                    return ord;
                }
                a = &a[na..];
                b = &b[nb..];
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a = &a[x.len_utf8()..];
                b = &b[y.len_utf8()..];
            }
        }
    }
}

impl FrameSequence {
    pub fn open(path: &Path, fallback_fps: f64) -> Result<Self, Error> {
        if path.is_dir() {
            Self::open_dir(path, fallback_fps)
        } else if !path.exists() {
            Err(open_error(path, "no such file or directory"))
        } else if matches!(ImageFormat::from_path(path), Ok(ImageFormat::Gif)) {
            Self::open_gif(path, fallback_fps)
        } else {
            let rgb = image::open(path).map_err(|e| open_error(path, e))?.to_rgb8();
            let (width, height) = rgb.dimensions();
            Ok(Self {
                kind: SourceKind::Image,
                frames: Frames::Decoded(vec![FrameBuffer::from_rgb(&rgb)]),
                fps: fallback_fps,
                width,
                height,
                position: 0,
            })
        }
    }

    fn open_dir(path: &Path, fallback_fps: f64) -> Result<Self, Error> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(|e| open_error(path, e))? {
            let file = entry?.path();
            if file.is_file() && ImageFormat::from_path(&file).is_ok() {
                files.push(file);
            }
        }
        files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()).then_with(|| a.cmp(b)));

        let first = files.first().ok_or_else(|| open_error(path, "no image frames in directory"))?;
        let (width, height) = image::image_dimensions(first).map_err(|e| open_error(first, e))?;
        debug!("{} frame files in {}", files.len(), path.display());

        Ok(Self {
            kind: SourceKind::Sequence,
            frames: Frames::Files(files),
            fps: fallback_fps,
            width,
            height,
            position: 0,
        })
    }

    fn open_gif(path: &Path, fallback_fps: f64) -> Result<Self, Error> {
        let reader = BufReader::new(File::open(path).map_err(|e| open_error(path, e))?);
        let decoder = GifDecoder::new(reader).map_err(|e| open_error(path, e))?;
        let frames = decoder.into_frames().collect_frames().map_err(|e| open_error(path, e))?;

        let first = frames.first().ok_or_else(|| open_error(path, "GIF has no frames"))?;
        let (width, height) = first.buffer().dimensions();

        let total_ms: f64 = frames
            .iter()
            .map(|f| {
                let (num, den) = f.delay().numer_denom_ms();
                if den == 0 { 0.0 } else { num as f64 / den as f64 }
            })
            .sum();
        let fps = if total_ms > 0.0 {
            1000.0 * frames.len() as f64 / total_ms
        } else {
            fallback_fps
        };

        let decoded = frames
            .into_iter()
            .map(|f| {
                let rgb = DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8();
                FrameBuffer::from_rgb(&fit(rgb, width, height))
            })
            .collect();

        Ok(Self {
            kind: SourceKind::Gif,
            frames: Frames::Decoded(decoded),
            fps,
            width,
            height,
            position: 0,
        })
    }

    fn len(&self) -> usize {
        match &self.frames {
            Frames::Decoded(frames) => frames.len(),
            Frames::Files(files) => files.len(),
        }
    }
}

impl FrameSource for FrameSequence {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            kind: self.kind,
            frame_count: self.len(),
            fps: self.fps,
            width: self.width as usize,
            height: self.height as usize,
        }
    }

    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position.min(self.len());
    }

    /// A frame file that fails to decode is still consumed, so the next read
    /// moves on to the following one.
    fn read(&mut self) -> Result<Option<FrameBuffer>, Error> {
        let index = self.position;
        if index >= self.len() {
            return Ok(None);
        }
        self.position += 1;
        let frame = match &self.frames {
            Frames::Decoded(frames) => frames[index].clone(),
            Frames::Files(files) => {
                let rgb = image::open(&files[index])?.to_rgb8();
                FrameBuffer::from_rgb(&fit(rgb, self.width, self.height))
            }
        };
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, Rgb, Rgba, RgbaImage};

    fn write_png(dir: &Path, name: &str, w: u32, h: u32, color: [u8; 3]) {
        RgbImage::from_pixel(w, h, Rgb(color))
            .save(dir.join(name))
            .expect("write test frame");
    }

    #[test]
    fn directory_plays_in_name_order_at_first_frame_size() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "frame_002.png", 8, 6, [0, 0, 255]);
        write_png(dir.path(), "frame_000.png", 8, 6, [255, 0, 0]);
        write_png(dir.path(), "frame_001.png", 16, 12, [0, 255, 0]);
        std::fs::write(dir.path().join("notes.txt"), "not a frame")?;

        let mut seq = FrameSequence::open(dir.path(), 12.0)?;
        let info = seq.info();
        assert_eq!(info.kind, SourceKind::Sequence);
        assert_eq!(info.frame_count, 3);
        assert_eq!((info.width, info.height), (8, 6));
        assert_eq!(info.fps, 12.0);

        let colors: Vec<u32> = std::iter::from_fn(|| seq.read().transpose())
            .map(|f| {
                let f = f.expect("frame decodes");
                assert_eq!((f.width, f.height), (8, 6));
                f.pixels[0]
            })
            .collect();
        assert_eq!(colors, vec![0x00_FF_00_00, 0x00_00_FF_00, 0x00_00_00_FF]);
        assert_eq!(seq.position(), 3);
        assert!(seq.read()?.is_none());
        Ok(())
    }

    #[test]
    fn numbered_frames_play_in_numeric_order() -> Result<(), Error> {
        assert_eq!(natural_cmp("frame_2.png", "frame_10.png"), Ordering::Less);
        assert_eq!(natural_cmp("frame_007.png", "frame_7.png"), Ordering::Equal);
        assert_eq!(natural_cmp("a10b2", "a10b10"), Ordering::Less);
        assert_eq!(natural_cmp("take2", "shot1"), Ordering::Greater);

        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "frame_10.png", 4, 4, [30, 0, 0]);
        write_png(dir.path(), "frame_2.png", 4, 4, [20, 0, 0]);
        write_png(dir.path(), "frame_1.png", 4, 4, [10, 0, 0]);
        let mut seq = FrameSequence::open(dir.path(), 30.0)?;
        let reds: Vec<u32> = std::iter::from_fn(|| seq.read().transpose())
            .map(|f| f.map(|f| f.pixels[0] >> 16))
            .collect::<Result<_, _>>()?;
        assert_eq!(reds, vec![10, 20, 30]);
        Ok(())
    }

    #[test]
    fn seeking_changes_the_next_frame() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        for (i, c) in [10u8, 20, 30, 40].iter().enumerate() {
            write_png(dir.path(), &format!("{i}.png"), 4, 4, [*c, 0, 0]);
        }
        let mut seq = FrameSequence::open(dir.path(), 30.0)?;
        seq.set_position(2);
        assert_eq!(seq.read()?.map(|f| f.pixels[0]), Some(30 << 16));
        seq.set_position(99);
        assert_eq!(seq.position(), 4);
        assert!(seq.read()?.is_none());
        seq.set_position(0);
        assert_eq!(seq.read()?.map(|f| f.pixels[0]), Some(10 << 16));
        Ok(())
    }

    #[test]
    fn bad_frame_file_is_skipped_after_the_error() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "a.png", 4, 4, [10, 0, 0]);
        std::fs::write(dir.path().join("b.png"), b"garbage")?;
        write_png(dir.path(), "c.png", 4, 4, [30, 0, 0]);

        let mut seq = FrameSequence::open(dir.path(), 30.0)?;
        assert!(seq.read()?.is_some());
        assert!(seq.read().is_err());
        assert_eq!(seq.position(), 2);
        assert_eq!(seq.read()?.map(|f| f.pixels[0]), Some(30 << 16));
        Ok(())
    }

    #[test]
    fn still_image_is_a_single_frame() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        write_png(dir.path(), "still.png", 5, 3, [1, 2, 3]);
        let mut seq = FrameSequence::open(&dir.path().join("still.png"), 30.0)?;
        assert_eq!(seq.info().kind, SourceKind::Image);
        assert_eq!(seq.info().frame_count, 1);
        assert!(seq.read()?.is_some());
        assert!(seq.read()?.is_none());
        Ok(())
    }

    #[test]
    fn gif_frame_delays_set_the_rate() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.gif");
        {
            let mut encoder = GifEncoder::new(File::create(&path)?);
            let frames = [Rgba([255, 0, 0, 255]), Rgba([0, 0, 255, 255])]
                .into_iter()
                .map(|c| Frame::from_parts(RgbaImage::from_pixel(6, 4, c), 0, 0, Delay::from_numer_denom_ms(40, 1)));
            encoder.encode_frames(frames)?;
        }

        let mut seq = FrameSequence::open(&path, 30.0)?;
        let info = seq.info();
        assert_eq!(info.kind, SourceKind::Gif);
        assert_eq!(info.frame_count, 2);
        assert_eq!((info.width, info.height), (6, 4));
        assert!((info.fps - 25.0).abs() < 1e-6);
        assert!(seq.read()?.is_some());
        Ok(())
    }

    #[test]
    fn missing_and_empty_sources_fail_to_open() -> Result<(), Error> {
        let dir = tempfile::tempdir()?;
        let missing = FrameSequence::open(&dir.path().join("nope.avi"), 30.0);
        assert!(matches!(missing, Err(Error::SourceOpen { .. })));
        let empty = FrameSequence::open(dir.path(), 30.0);
        assert!(matches!(empty, Err(Error::SourceOpen { .. })));
        Ok(())
    }
}
