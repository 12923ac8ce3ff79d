use std::{fs, path::Path};

use ndarray::Array2;

use crate::{ExperimentErr, Result};

/// A decoded netpbm image, 8 bits per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub width: usize,
    pub height: usize,

    /// 1 for graymaps, 3 for pixmaps.
    pub channels: usize,

    /// Row major samples, `channels` per pixel.
    pub samples: Vec<u8>,
}

impl Image {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }

    /// One row per pixel with its red, green and blue values scaled to `[0, 1]`.
    ///
    /// Graymaps repeat their single channel.
    pub fn rgb_rows(&self) -> Array2<f32> {
        let mut rows = Array2::zeros((self.pixels(), 3));

        let pixels = self.samples.chunks(self.channels);
        for (mut row, pixel) in rows.rows_mut().into_iter().zip(pixels) {
            for (c, v) in row.iter_mut().enumerate() {
                *v = pixel[c % self.channels] as f32 / 255.;
            }
        }

        rows
    }
}

fn err(msg: impl Into<String>) -> ExperimentErr {
    ExperimentErr::Dataset(msg.into())
}

/// Splits the header tokens off, skipping comments.
struct Header<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    fn token(&mut self) -> Result<&'a str> {
        loop {
            match self.bytes.get(self.pos) {
                Some(b'#') => {
                    while self.bytes.get(self.pos).is_some_and(|&b| b != b'\n') {
                        self.pos += 1;
                    }
                }
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(_) => break,
                None => return Err(err("truncated netpbm header")),
            }
        }

        let start = self.pos;
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| !b.is_ascii_whitespace())
        {
            self.pos += 1;
        }

        std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| err("non ascii header"))
    }

    fn number(&mut self) -> Result<usize> {
        let token = self.token()?;
        token
            .parse()
            .map_err(|_| err(format!("{token:?} is not a number")))
    }
}

/// Decodes a binary (`P5`, `P6`) or plain (`P2`, `P3`) graymap or pixmap.
///
/// # Errors
/// `ExperimentErr::Dataset` on any other format, a max value above 255, a sample above the max
/// value, a size that overflows or missing samples.
pub fn decode(bytes: &[u8]) -> Result<Image> {
    let mut header = Header { bytes, pos: 0 };

    let magic = header.token()?;
    let (channels, binary) = match magic {
        "P2" => (1, false),
        "P3" => (3, false),
        "P5" => (1, true),
        "P6" => (3, true),
        other => return Err(err(format!("unsupported netpbm format {other:?}"))),
    };

    let width = header.number()?;
    let height = header.number()?;
    let maxval = header.number()?;
    if maxval == 0 || maxval > 255 {
        return Err(err(format!("unsupported max value {maxval}")));
    }

    let len = width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| err(format!("{width}x{height} image is too large")))?;
    let scale = |v: usize| {
        if v > maxval {
            return Err(err(format!("sample {v} is above the max value {maxval}")));
        }
        Ok(((v * 255) / maxval) as u8)
    };

    let samples: Vec<u8> = if binary {
        // A single whitespace byte separates the header from the raster.
        let start = header.pos + 1;
        let raster = start
            .checked_add(len)
            .and_then(|end| bytes.get(start..end))
            .ok_or_else(|| err(format!("expected {len} samples")))?;
        raster
            .iter()
            .map(|&v| scale(v as usize))
            .collect::<Result<_>>()?
    } else {
        (0..len)
            .map(|_| header.number().and_then(scale))
            .collect::<Result<_>>()?
    };

    Ok(Image {
        width,
        height,
        channels,
        samples,
    })
}

/// Encodes a binary graymap.
pub fn encode_pgm(width: usize, height: usize, samples: &[u8]) -> Vec<u8> {
    let mut bytes = format!("P5\n{width} {height}\n255\n").into_bytes();
    bytes.extend_from_slice(samples);
    bytes
}

pub fn read(path: &Path) -> Result<Image> {
    let bytes = fs::read(path)?;
    decode(&bytes).map_err(|e| err(format!("{}: {e}", path.display())))
}
