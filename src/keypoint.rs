use nalgebra::Matrix3;
use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Error;

/// Descriptor length used when none is specified, matching the classic
/// 128-dimensional SIFT layout.
pub const DEFAULT_DESCRIPTOR_LENGTH: usize = 128;

/// A local image feature: a position with scale and dominant orientation
/// plus a byte-quantized descriptor vector.
///
/// The descriptor length is fixed when the keypoint is constructed and
/// never changes afterwards. Neither the binary nor the text serialization
/// carries the length; readers must know it from context.
///
/// Equality is two-tier: [`Keypoint::location_eq`] compares (x, y, scale)
/// bitwise, while `==` additionally requires exact descriptor contents.
/// Orientation is not part of keypoint identity in either tier.
#[derive(Debug)]
pub struct Keypoint {
    /// The horizontal coordinate in a coordinate system defined s.t. +x
    /// faces right and starts from the left side of the image.
    pub x: f32,
    /// The vertical coordinate in a coordinate system defined s.t. +y faces
    /// toward the bottom of the image and starts from the top.
    pub y: f32,
    /// The dominant orientation angle, in radians.
    pub orientation: f32,
    /// The scale of the keypoint.
    pub scale: f32,
    descriptor: Arc<[i8]>,
}

impl Keypoint {
    pub fn new(
        x: f32,
        y: f32,
        orientation: f32,
        scale: f32,
        descriptor: impl Into<Arc<[i8]>>,
    ) -> Self {
        Keypoint {
            x,
            y,
            orientation,
            scale,
            descriptor: descriptor.into(),
        }
    }

    /// A keypoint at the origin with a zeroed descriptor of the given
    /// length.
    pub fn with_length(length: usize) -> Self {
        Keypoint::new(0.0, 0.0, 0.0, 0.0, vec![0i8; length])
    }

    /// The quantized descriptor vector.
    pub fn descriptor(&self) -> &[i8] {
        &self.descriptor
    }

    /// View of (x, y, orientation, scale) as one unit.
    pub fn location(&self) -> KeypointLocation {
        KeypointLocation {
            x: self.x,
            y: self.y,
            orientation: self.orientation,
            scale: self.scale,
        }
    }

    /// Update (x, y, orientation, scale) as one unit.
    pub fn set_location(&mut self, location: KeypointLocation) {
        self.x = location.x;
        self.y = location.y;
        self.orientation = location.orientation;
        self.scale = location.scale;
    }

    /// Move the keypoint in place. The descriptor is untouched.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.x += dx;
        self.y += dy;
    }

    /// Apply a 3x3 projective transform to (x, y, 1) with homogeneous
    /// divide, returning a new record with its own copy of the descriptor.
    /// The original keypoint is unmodified.
    ///
    /// A zero homogeneous divisor fails with
    /// [`Error::DegenerateTransform`]; infinities are never produced.
    pub fn transform(&self, transform: &Matrix3<f32>) -> Result<Keypoint, Error> {
        let xt = transform[(0, 0)] * self.x + transform[(0, 1)] * self.y + transform[(0, 2)];
        let yt = transform[(1, 0)] * self.x + transform[(1, 1)] * self.y + transform[(1, 2)];
        let zt = transform[(2, 0)] * self.x + transform[(2, 1)] * self.y + transform[(2, 2)];
        if zt == 0.0 {
            return Err(Error::DegenerateTransform {
                x: self.x,
                y: self.y,
            });
        }
        Ok(Keypoint {
            x: xt / zt,
            y: yt / zt,
            orientation: self.orientation,
            scale: self.scale,
            descriptor: Arc::from(&*self.descriptor),
        })
    }

    /// Location-only equality: bitwise (x, y, scale), ignoring orientation
    /// and descriptor.
    pub fn location_eq(&self, other: &Keypoint) -> bool {
        self.x.to_bits() == other.x.to_bits()
            && self.y.to_bits() == other.y.to_bits()
            && self.scale.to_bits() == other.scale.to_bits()
    }

    /// Write the record in binary: the location as 4 big-endian `f32`
    /// values (x, y, orientation, scale) followed by the raw descriptor
    /// bytes. No header and no length prefix.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.location().write_binary(writer)?;
        let bytes: Vec<u8> = self.descriptor.iter().map(|&v| v as u8).collect();
        writer.write_all(&bytes)
    }

    /// Read a binary record. The descriptor length is not part of the wire
    /// format and must be known from context.
    pub fn read_binary<R: Read>(reader: &mut R, length: usize) -> io::Result<Keypoint> {
        let location = KeypointLocation::read_binary(reader)?;
        let mut bytes = vec![0u8; length];
        reader.read_exact(&mut bytes)?;
        let descriptor: Vec<i8> = bytes.into_iter().map(|v| v as i8).collect();
        Ok(Keypoint::new(
            location.x,
            location.y,
            location.orientation,
            location.scale,
            descriptor,
        ))
    }

    /// Write the record as text: one line `x y orientation scale`, then the
    /// descriptor values offset by +128 into `[0, 255]`, space-separated
    /// and wrapped at 20 values per line, newline-terminated.
    pub fn write_ascii<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        self.location().write_ascii(writer)?;
        for (i, &v) in self.descriptor.iter().enumerate() {
            if i > 0 && i % 20 == 0 {
                writeln!(writer)?;
            }
            write!(writer, " {}", i16::from(v) + 128)?;
        }
        writeln!(writer)
    }

    /// Read a text record, consuming whitespace-separated tokens across
    /// lines: 4 floats then exactly `length` integers in `[0, 255]`, each
    /// mapped back by -128.
    pub fn read_ascii<R: BufRead>(reader: &mut R, length: usize) -> Result<Keypoint, Error> {
        let mut tokens = Tokens::new(reader);
        let x = parse_float(&tokens.next()?)?;
        let y = parse_float(&tokens.next()?)?;
        let orientation = parse_float(&tokens.next()?)?;
        let scale = parse_float(&tokens.next()?)?;
        let mut descriptor = Vec::with_capacity(length);
        for _ in 0..length {
            let token = tokens.next()?;
            let value: i16 = token
                .parse()
                .map_err(|_| Error::InvalidKeypointToken {
                    token: token.clone(),
                })?;
            if !(0..=255).contains(&value) {
                return Err(Error::DescriptorByteRange { value });
            }
            descriptor.push((value - 128) as i8);
        }
        Ok(Keypoint::new(x, y, orientation, scale, descriptor))
    }
}

impl Clone for Keypoint {
    /// Deep copy: the clone owns a distinct descriptor allocation with
    /// equal contents. [`shift_keypoints`] and [`rescale_keypoints`] are
    /// the only operations that share descriptor storage between records.
    fn clone(&self) -> Self {
        Keypoint {
            x: self.x,
            y: self.y,
            orientation: self.orientation,
            scale: self.scale,
            descriptor: Arc::from(&*self.descriptor),
        }
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Keypoint::with_length(DEFAULT_DESCRIPTOR_LENGTH)
    }
}

impl PartialEq for Keypoint {
    fn eq(&self, other: &Keypoint) -> bool {
        self.location_eq(other) && self.descriptor == other.descriptor
    }
}

impl Eq for Keypoint {}

impl Hash for Keypoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.y.to_bits().hash(state);
        self.x.to_bits().hash(state);
        self.scale.to_bits().hash(state);
    }
}

impl fmt::Display for Keypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Keypoint({}, {}, {}, {})",
            self.x, self.y, self.scale, self.orientation
        )
    }
}

/// The location fields of a [`Keypoint`], viewed and serialized as one
/// unit: x, y, orientation, scale, in that order.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeypointLocation {
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
    pub scale: f32,
}

impl KeypointLocation {
    /// Write the 4 fields as big-endian `f32` values.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.x.to_be_bytes())?;
        writer.write_all(&self.y.to_be_bytes())?;
        writer.write_all(&self.orientation.to_be_bytes())?;
        writer.write_all(&self.scale.to_be_bytes())
    }

    pub fn read_binary<R: Read>(reader: &mut R) -> io::Result<KeypointLocation> {
        Ok(KeypointLocation {
            x: read_f32_be(reader)?,
            y: read_f32_be(reader)?,
            orientation: read_f32_be(reader)?,
            scale: read_f32_be(reader)?,
        })
    }

    /// Write the 4 fields as one whitespace-separated line. Floats are
    /// formatted so that parsing them back reproduces the exact value.
    pub fn write_ascii<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "{} {} {} {}",
            self.x, self.y, self.orientation, self.scale
        )
    }
}

fn read_f32_be<R: Read>(reader: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_be_bytes(buf))
}

fn parse_float(token: &str) -> Result<f32, Error> {
    token.parse().map_err(|_| Error::InvalidKeypointToken {
        token: token.to_owned(),
    })
}

/// Whitespace token stream over a line-oriented reader. Lines are consumed
/// whole, so a record reader stops at the end of the line holding its last
/// token.
struct Tokens<'a, R> {
    reader: &'a mut R,
    pending: VecDeque<String>,
}

impl<'a, R: BufRead> Tokens<'a, R> {
    fn new(reader: &'a mut R) -> Self {
        Tokens {
            reader,
            pending: VecDeque::new(),
        }
    }

    fn next(&mut self) -> Result<String, Error> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Ok(token);
            }
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "truncated keypoint record",
                )));
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_owned));
        }
    }
}

/// New keypoints with coordinates made relative to `(x, y)`; the input
/// list and its records are unmodified.
///
/// The returned records share descriptor storage with the originals. The
/// contents are immutable behind the shared allocation, so the aliasing is
/// observable only through pointer identity; it keeps the copy cheap for
/// large descriptor sets. Use [`Keypoint::clone`] when an independent
/// descriptor is required.
pub fn shift_keypoints(keypoints: &[Keypoint], x: f32, y: f32) -> Vec<Keypoint> {
    keypoints
        .iter()
        .map(|old| Keypoint {
            x: old.x - x,
            y: old.y - y,
            orientation: old.orientation,
            scale: old.scale,
            descriptor: Arc::clone(&old.descriptor),
        })
        .collect()
}

/// New keypoints with x, y and scale multiplied by `factor`; the input
/// list and its records are unmodified.
///
/// Descriptor storage is shared with the originals, exactly as in
/// [`shift_keypoints`].
pub fn rescale_keypoints(keypoints: &[Keypoint], factor: f32) -> Vec<Keypoint> {
    keypoints
        .iter()
        .map(|old| Keypoint {
            x: old.x * factor,
            y: old.y * factor,
            orientation: old.orientation,
            scale: old.scale * factor,
            descriptor: Arc::clone(&old.descriptor),
        })
        .collect()
}
