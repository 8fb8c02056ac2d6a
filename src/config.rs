// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Render configuration.  A `RenderConfig` is built once, validated,
//! and then shared read-only by every stage of the renderer.

use crate::error::{RenderError, Result};
use std::path::PathBuf;

/// Which planes a frame produces, and how they are written to disk.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// Deflate-compressed TIFF with the horizontal predictor.
    Tiff(Compression),
    /// PNG at the given compression preference.
    Png(Compression),
}

/// Compression preference, honoured by both containers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Compression {
    /// Fastest encode, largest files.
    Fast,
    /// The encoder's default trade-off.
    Default,
    /// Smallest files.
    Best,
}

impl OutputFormat {
    /// File extension used for artifacts of this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Tiff(_) => "tif",
            OutputFormat::Png(_) => "png",
        }
    }
}

/// The complete, immutable description of one rendering run.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Sub-samples per axis; each pixel averages `super_sample²` samples.
    pub super_sample: u32,
    /// Edge length of a square work block, in pixels.
    pub work_block: u32,
    /// Total iteration budget, pre-iterations included.
    pub max_iterations: u32,
    /// Iterations run before anything counts towards the image.
    pub pre_iterations: u32,
    /// Squared escape radius.
    pub escape_radius_sq: f64,
    /// Real offset of the zoom target (subtracted from the mapped point).
    pub offset_x: f64,
    /// Imaginary offset of the zoom target (subtracted from the mapped point).
    pub offset_y: f64,
    /// Exponent of the zoom curve.
    pub zoom_pow: f64,
    /// Divisor applied to the zoom counter before the power curve.
    pub zoom_div: f64,
    /// Initial value of the zoom counter.
    pub zoom_start: f64,
    /// Counter increment per frame.
    pub zoom_add: f64,
    /// Gamma of the luma lookup table.
    pub gamma_luma: f64,
    /// Gamma of the chroma lookup table.
    pub gamma_chroma: f64,
    /// Hue rotation, in degrees, per escape iteration.
    pub hue_degrees_per_iteration: u32,
    /// HSV saturation of the chroma plane.
    pub color_saturation: f64,
    /// HSV value of the chroma plane.
    pub color_brightness: f64,
    /// Number of concurrent block workers.
    pub workers: usize,
    /// First frame this process considers.
    pub start_frame: u64,
    /// Last frame of the sequence, inclusive.
    pub end_frame: u64,
    /// Directory receiving the artifacts.
    pub output_dir: PathBuf,
    /// Produce the 16-bit luma plane.
    pub enable_luma: bool,
    /// Produce the RGBA chroma plane.
    pub enable_chroma: bool,
    /// Container written for each plane.
    pub format: OutputFormat,
}

/// `zoomDiv` and the starting counter are both derived from a single
/// "speed" knob in the classic presets.
const ZOOM_DIV_BASE: f64 = 10_000.0;
const ZOOM_START_BASE: f64 = 9_800.0;

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            width: 3840,
            height: 2160,
            super_sample: 16,
            work_block: 32,
            max_iterations: 2500,
            pre_iterations: 10,
            escape_radius_sq: 4.0,
            offset_x: -0.292_559_884_509_355_9,
            offset_y: -0.457_881_168_500_318_85,
            zoom_pow: 100.0,
            zoom_div: ZOOM_DIV_BASE / 1.1,
            zoom_start: ZOOM_START_BASE / 1.1,
            zoom_add: 1.0,
            gamma_luma: 1.0,
            gamma_chroma: 1.0,
            hue_degrees_per_iteration: 1,
            color_saturation: 0.8,
            color_brightness: 0.5,
            workers: num_cpus::get(),
            start_frame: 0,
            end_frame: 3600,
            output_dir: PathBuf::from("out"),
            enable_luma: true,
            enable_chroma: true,
            format: OutputFormat::Tiff(Compression::Default),
        }
    }
}

impl RenderConfig {
    /// Set `zoom_div` and `zoom_start` from a speed divisor, the way
    /// the presets do: larger divisors zoom faster.
    pub fn with_zoom_speed(mut self, speed: f64) -> Self {
        self.zoom_div = ZOOM_DIV_BASE / speed;
        self.zoom_start = ZOOM_START_BASE / speed;
        self
    }

    /// Iterations available to the main (visible) phase.
    pub fn main_iterations(&self) -> u32 {
        self.max_iterations - self.pre_iterations
    }

    /// Number of sub-samples averaged into one pixel.
    pub fn samples_per_pixel(&self) -> u32 {
        self.super_sample * self.super_sample
    }

    /// Reject any configuration that cannot produce a meaningful
    /// sequence.  Called before any rendering starts.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::config(
                "width/height",
                format!("image must not be empty ({}x{})", self.width, self.height),
            ));
        }
        if self.work_block == 0 {
            return Err(RenderError::config("work_block", "must be at least 1"));
        }
        if self.work_block > self.width || self.work_block > self.height {
            return Err(RenderError::config(
                "work_block",
                format!(
                    "block edge {} is larger than the {}x{} image",
                    self.work_block, self.width, self.height
                ),
            ));
        }
        if self.super_sample == 0 || self.super_sample > 255 {
            return Err(RenderError::config("super_sample", "must be between 1 and 255"));
        }
        if self.max_iterations <= self.pre_iterations {
            return Err(RenderError::config(
                "max_iterations",
                format!("must exceed the {} pre-iterations", self.pre_iterations),
            ));
        }
        positive("escape_radius_sq", self.escape_radius_sq)?;
        positive("gamma_luma", self.gamma_luma)?;
        positive("gamma_chroma", self.gamma_chroma)?;
        positive("zoom_pow", self.zoom_pow)?;
        positive("zoom_div", self.zoom_div)?;
        positive("zoom_add", self.zoom_add)?;
        unit("color_saturation", self.color_saturation)?;
        unit("color_brightness", self.color_brightness)?;
        if self.zoom_start < 0.0 || !self.zoom_start.is_finite() {
            return Err(RenderError::config(
                "zoom_start",
                "must be a finite, non-negative counter",
            ));
        }
        if self.workers == 0 {
            return Err(RenderError::config("workers", "at least one worker is required"));
        }
        if !self.enable_luma && !self.enable_chroma {
            return Err(RenderError::config(
                "outputs",
                "luma and chroma are both disabled; nothing to render",
            ));
        }
        if self.start_frame > self.end_frame {
            return Err(RenderError::config(
                "start_frame",
                format!("{} is past the end {}", self.start_frame, self.end_frame),
            ));
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    // NaN fails this comparison too.
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(RenderError::config(
            field,
            format!("must be greater than zero (got {})", value),
        ))
    }
}

fn unit(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RenderError::config(
            field,
            format!("must lie within 0.0..=1.0 (got {})", value),
        ))
    }
}
