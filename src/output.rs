// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The on-disk side of a render: artifact paths, claims, and the
//! writer that turns a finished frame into files.
//!
//! An artifact's existence is the only record of progress.  A missing
//! file means the frame is free; an empty one means some process has
//! claimed it; a full one is a finished frame.  Claims are taken with
//! an exclusive create, so two processes sharing an output directory
//! never both win the same frame.

use crate::config::{Compression, OutputFormat, RenderConfig};
use crate::error::{RenderError, Result};
use crate::frame::FrameBuffer;
use image::codecs::png::{self, PngEncoder};
use image::error::{EncodingError, ImageError, ImageResult, ParameterError, ParameterErrorKind};
use image::ImageFormat;
use log::debug;
use num::traits::WrappingSub;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tiff::encoder::colortype::{self, ColorType};
use tiff::encoder::compression::{Deflate, DeflateLevel};
use tiff::encoder::{TiffEncoder, TiffValue};
use tiff::tags::Tag;

/// The planes a frame can be written as.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// 16-bit brightness.
    Luma,
    /// RGBA colour.
    Chroma,
}

impl OutputKind {
    /// Tag used in artifact file names.
    pub fn tag(self) -> &'static str {
        match self {
            OutputKind::Luma => "luma",
            OutputKind::Chroma => "chroma",
        }
    }
}

/// Maps frame indices to artifact paths for one output directory.
#[derive(Clone, Debug)]
pub struct OutputLayout {
    dir: PathBuf,
    extension: &'static str,
    kinds: Vec<OutputKind>,
}

impl OutputLayout {
    /// A layout for the enabled kinds of a configuration.  Chroma comes
    /// first; the first kind's artifact is the frame's lock.
    pub fn from_config(config: &RenderConfig) -> Self {
        let mut kinds = Vec::with_capacity(2);
        if config.enable_chroma {
            kinds.push(OutputKind::Chroma);
        }
        if config.enable_luma {
            kinds.push(OutputKind::Luma);
        }
        OutputLayout {
            dir: config.output_dir.clone(),
            extension: config.format.extension(),
            kinds,
        }
    }

    /// Enabled kinds, lock first.
    pub fn kinds(&self) -> &[OutputKind] {
        &self.kinds
    }

    /// `<dir>/<kind>-<frame>.<ext>`
    pub fn path(&self, kind: OutputKind, frame: u64) -> PathBuf {
        self.dir
            .join(format!("{}-{}.{}", kind.tag(), frame, self.extension))
    }

    /// The first artifact of `frame` that already exists, if any.
    pub fn existing(&self, frame: u64) -> Option<PathBuf> {
        self.kinds
            .iter()
            .map(|&kind| self.path(kind, frame))
            .find(|path| path.exists())
    }

    /// Try to claim `frame` by creating empty placeholders for every
    /// kind.  Returns `Ok(None)` if another process got there first.
    pub fn claim(&self, frame: u64) -> Result<Option<Claim>> {
        let mut artifacts = Vec::with_capacity(self.kinds.len());
        for (n, &kind) in self.kinds.iter().enumerate() {
            let path = self.path(kind, frame);
            match create_new(&path) {
                Ok(()) => {}
                // Losing the race for the lock is a skip; any other
                // placeholder is already ours by virtue of the lock.
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists && n == 0 => {
                    debug!("{} was claimed by another process", path.display());
                    return Ok(None);
                }
                Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(RenderError::artifact(&path, e)),
            }
            artifacts.push((kind, path));
        }
        Ok(Some(Claim { frame, artifacts }))
    }
}

fn create_new(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map(|_| ())
}

/// Placeholders held for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Claim {
    /// The claimed frame.
    pub frame: u64,
    /// Kind and path of every placeholder.
    pub artifacts: Vec<(OutputKind, PathBuf)>,
}

/// A frame ready for delivery.
#[derive(Debug)]
pub struct FinishedFrame {
    /// Frame index.
    pub index: u64,
    /// Magnification the frame was rendered at.
    pub magnification: f64,
    /// The filled planes.
    pub buffer: FrameBuffer,
}

/// The encoder seam: turns a finished frame into its artifacts,
/// overwriting the claim placeholders.
pub trait FrameWriter {
    /// Write every artifact named in `claim`.
    fn write(&mut self, frame: FinishedFrame, claim: &Claim) -> Result<()>;
}

/// Writes frames as Deflate TIFF or PNG.
///
/// Each artifact is encoded into a temporary file beside its
/// placeholder and renamed over it once complete, so an artifact path
/// never holds a partial frame.
#[derive(Copy, Clone, Debug)]
pub struct ImageWriter {
    format: OutputFormat,
}

impl ImageWriter {
    /// A writer producing `format`.
    pub fn new(format: OutputFormat) -> Self {
        ImageWriter { format }
    }

    fn encode<W: Write + Seek>(
        &self,
        out: &mut W,
        kind: OutputKind,
        buffer: &FrameBuffer,
    ) -> ImageResult<()> {
        match kind {
            OutputKind::Luma => {
                let plane = buffer.luma.as_ref().ok_or_else(|| missing_plane(kind))?;
                match self.format {
                    OutputFormat::Tiff(level) => write_tiff::<_, colortype::Gray16>(
                        out,
                        plane.width(),
                        plane.height(),
                        level,
                        plane.as_raw(),
                    ),
                    OutputFormat::Png(level) => plane.write_with_encoder(png_encoder(out, level)),
                }
            }
            OutputKind::Chroma => {
                let plane = buffer.chroma.as_ref().ok_or_else(|| missing_plane(kind))?;
                match self.format {
                    OutputFormat::Tiff(level) => write_tiff::<_, colortype::RGBA8>(
                        out,
                        plane.width(),
                        plane.height(),
                        level,
                        plane.as_raw(),
                    ),
                    OutputFormat::Png(level) => plane.write_with_encoder(png_encoder(out, level)),
                }
            }
        }
    }
}

fn missing_plane(kind: OutputKind) -> ImageError {
    ImageError::Parameter(ParameterError::from_kind(ParameterErrorKind::Generic(
        format!("frame has no {} plane", kind.tag()),
    )))
}

fn png_encoder<W: Write>(out: W, level: Compression) -> PngEncoder<W> {
    let compression = match level {
        Compression::Fast => png::CompressionType::Fast,
        Compression::Default => png::CompressionType::Default,
        Compression::Best => png::CompressionType::Best,
    };
    PngEncoder::new_with_quality(out, compression, png::FilterType::Adaptive)
}

/// TIFF `Predictor` value for horizontal differencing.
const PREDICTOR_HORIZONTAL: u16 = 2;

/// Write one plane as a single-image TIFF, Deflate-compressed with the
/// horizontal predictor.
fn write_tiff<W, C>(
    out: &mut W,
    width: u32,
    height: u32,
    level: Compression,
    samples: &[C::Inner],
) -> ImageResult<()>
where
    W: Write + Seek,
    C: ColorType,
    C::Inner: Copy + WrappingSub,
    [C::Inner]: TiffValue,
{
    let level = match level {
        Compression::Fast => DeflateLevel::Fast,
        Compression::Default => DeflateLevel::Balanced,
        Compression::Best => DeflateLevel::Best,
    };
    let channels = C::BITS_PER_SAMPLE.len();
    let mut samples = samples.to_vec();
    predict(&mut samples, width as usize * channels, channels);

    let mut encoder = TiffEncoder::new(out).map_err(tiff_error)?;
    let mut image = encoder
        .new_image_with_compression::<C, _>(width, height, Deflate::with_level(level))
        .map_err(tiff_error)?;
    image
        .encoder()
        .write_tag(Tag::Predictor, PREDICTOR_HORIZONTAL)
        .map_err(tiff_error)?;
    image.write_data(&samples).map_err(tiff_error)
}

/// Horizontal differencing: every sample after the first pixel of a
/// row becomes its difference from the same channel one pixel left.
fn predict<T: Copy + WrappingSub>(samples: &mut [T], row_len: usize, channels: usize) {
    if row_len == 0 {
        return;
    }
    for row in samples.chunks_mut(row_len) {
        for i in (channels..row.len()).rev() {
            row[i] = row[i].wrapping_sub(&row[i - channels]);
        }
    }
}

fn tiff_error(e: tiff::TiffError) -> ImageError {
    match e {
        tiff::TiffError::IoError(e) => ImageError::IoError(e),
        e => ImageError::Encoding(EncodingError::new(ImageFormat::Tiff.into(), e)),
    }
}

impl FrameWriter for ImageWriter {
    fn write(&mut self, frame: FinishedFrame, claim: &Claim) -> Result<()> {
        for (kind, path) in &claim.artifacts {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            let mut staged =
                NamedTempFile::new_in(dir).map_err(|e| RenderError::artifact(path, e))?;
            {
                let mut out = BufWriter::new(staged.as_file_mut());
                self.encode(&mut out, *kind, &frame.buffer)
                    .map_err(|e| RenderError::encode(path, e))?;
                out.flush().map_err(|e| RenderError::artifact(path, e))?;
            }
            staged
                .persist(path)
                .map_err(|e| RenderError::artifact(path, e.error))?;
            debug!("wrote {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};
    use std::fs;

    const TIFF: OutputFormat = OutputFormat::Tiff(Compression::Default);

    fn config(dir: &Path, format: OutputFormat) -> RenderConfig {
        RenderConfig {
            width: 8,
            height: 4,
            work_block: 4,
            super_sample: 1,
            output_dir: dir.to_path_buf(),
            format,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn paths_name_kind_and_frame() {
        let layout = OutputLayout::from_config(&config(Path::new("out"), TIFF));
        assert_eq!(layout.kinds(), &[OutputKind::Chroma, OutputKind::Luma]);
        assert_eq!(
            layout.path(OutputKind::Luma, 17),
            Path::new("out").join("luma-17.tif")
        );
        let layout = OutputLayout::from_config(&config(
            Path::new("out"),
            OutputFormat::Png(Compression::Best),
        ));
        assert_eq!(
            layout.path(OutputKind::Chroma, 0),
            Path::new("out").join("chroma-0.png")
        );
    }

    #[test]
    fn a_frame_can_only_be_claimed_once() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_config(&config(dir.path(), TIFF));

        assert_eq!(layout.existing(3), None);
        let claim = layout.claim(3).unwrap().expect("first claim wins");
        assert_eq!(claim.artifacts.len(), 2);
        for (_, path) in &claim.artifacts {
            assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
        }

        assert!(layout.existing(3).is_some());
        assert_eq!(layout.claim(3).unwrap(), None);
    }

    #[test]
    fn claiming_in_a_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let layout = OutputLayout::from_config(&config(&missing, TIFF));
        match layout.claim(0) {
            Err(RenderError::Artifact { .. }) => {}
            other => panic!("expected an artifact error, got {:?}", other),
        }
    }

    fn finished() -> FinishedFrame {
        let mut buffer = FrameBuffer::new(8, 4, true, true);
        if let Some(luma) = buffer.luma.as_mut() {
            luma.put_pixel(3, 2, Luma([40_000]));
        }
        if let Some(chroma) = buffer.chroma.as_mut() {
            chroma.put_pixel(3, 2, Rgba([10, 20, 30, 255]));
        }
        FinishedFrame {
            index: 0,
            magnification: 1.0,
            buffer,
        }
    }

    fn written_planes_decode(format: OutputFormat) {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_config(&config(dir.path(), format));
        let claim = layout.claim(0).unwrap().unwrap();
        ImageWriter::new(format).write(finished(), &claim).unwrap();

        let luma = image::open(layout.path(OutputKind::Luma, 0))
            .unwrap()
            .to_luma16();
        assert_eq!(luma.dimensions(), (8, 4));
        assert_eq!(luma.get_pixel(3, 2).0, [40_000]);
        assert_eq!(luma.get_pixel(0, 0).0, [0]);

        let chroma = image::open(layout.path(OutputKind::Chroma, 0))
            .unwrap()
            .to_rgba8();
        assert_eq!(chroma.get_pixel(3, 2).0, [10, 20, 30, 255]);
    }

    #[test]
    fn tiff_round_trips_both_planes() {
        written_planes_decode(TIFF);
    }

    #[test]
    fn png_round_trips_both_planes() {
        written_planes_decode(OutputFormat::Png(Compression::Fast));
    }

    #[test]
    fn compressed_tiff_is_smaller_than_the_raw_plane() {
        let dir = tempfile::tempdir().unwrap();
        let format = OutputFormat::Tiff(Compression::Best);
        let mut cfg = config(dir.path(), format);
        cfg.width = 256;
        cfg.height = 256;
        let layout = OutputLayout::from_config(&cfg);
        let claim = layout.claim(0).unwrap().unwrap();
        let frame = FinishedFrame {
            index: 0,
            magnification: 1.0,
            buffer: FrameBuffer::new(256, 256, true, true),
        };
        ImageWriter::new(format).write(frame, &claim).unwrap();

        let luma = layout.path(OutputKind::Luma, 0);
        assert!(fs::metadata(&luma).unwrap().len() < 256 * 256 * 2);
        let decoded = image::open(&luma).unwrap().to_luma16();
        assert_eq!(decoded.dimensions(), (256, 256));
        assert!(decoded.pixels().all(|p| p.0 == [0]));

        let chroma = layout.path(OutputKind::Chroma, 0);
        assert!(fs::metadata(&chroma).unwrap().len() < 256 * 256 * 4);
        let decoded = image::open(&chroma).unwrap().to_rgba8();
        assert!(decoded.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn predictor_differences_each_channel_along_the_row() {
        let mut samples: Vec<u8> = vec![10, 20, 15, 5, 7, 7];
        predict(&mut samples, 6, 2);
        assert_eq!(samples, vec![10, 20, 5, 241, 248, 2]);

        let mut samples: Vec<u16> = vec![1, 3, 6, 4, 4, 9];
        predict(&mut samples, 3, 1);
        assert_eq!(samples, vec![1, 2, 3, 4, 0, 5]);
    }

    #[test]
    fn a_failed_encode_leaves_the_placeholders_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_config(&config(dir.path(), TIFF));
        let claim = layout.claim(0).unwrap().unwrap();
        // Chroma is the first artifact written, and this frame lacks it.
        let frame = FinishedFrame {
            index: 0,
            magnification: 1.0,
            buffer: FrameBuffer::new(8, 4, true, false),
        };
        match ImageWriter::new(TIFF).write(frame, &claim) {
            Err(RenderError::Encode { .. }) => {}
            other => panic!("expected an encode error, got {:?}", other),
        }

        for (_, path) in &claim.artifacts {
            assert_eq!(fs::metadata(path).unwrap().len(), 0);
        }
        // The staging file is gone too.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
