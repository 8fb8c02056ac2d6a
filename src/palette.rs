// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gamma lookup tables and the hue wheel.
//!
//! Both tables are built once, before the first block of the first
//! frame is dispatched, and are only ever read afterwards, so workers
//! share a `&Palette` without any locking.

use crate::config::RenderConfig;
use crate::error::{RenderError, Result};

/// Full scale of the 16-bit luma plane.
pub const LUMA_FULL_SCALE: f64 = 65_535.0;

/// Full scale of an 8-bit chroma channel.
pub const CHROMA_FULL_SCALE: f64 = 255.0;

const CHROMA_ENTRIES: usize = 256;

/// Precomputed brightness and colour curves.
#[derive(Clone, Debug)]
pub struct Palette {
    luma: Vec<u16>,
    chroma: Vec<u8>,
    hue_step: u32,
    saturation: f64,
    brightness: f64,
}

/// `round((index / max_index)^gamma * full_scale)` for every index.
fn gamma_table(entries: usize, max_index: f64, gamma: f64, full_scale: f64) -> Vec<f64> {
    (0..entries)
        .map(|i| ((i as f64 / max_index).powf(gamma) * full_scale).round())
        .collect()
}

impl Palette {
    /// Build both tables.  `max_iterations - pre_iterations` is the
    /// largest escape count the sampler can report, and indexes the
    /// last (full scale) entry of the luma table.
    pub fn build(
        max_iterations: u32,
        pre_iterations: u32,
        gamma_luma: f64,
        gamma_chroma: f64,
    ) -> Result<Self> {
        if !(gamma_luma > 0.0) {
            return Err(RenderError::config(
                "gamma_luma",
                format!("gamma must be greater than zero (got {})", gamma_luma),
            ));
        }
        if !(gamma_chroma > 0.0) {
            return Err(RenderError::config(
                "gamma_chroma",
                format!("gamma must be greater than zero (got {})", gamma_chroma),
            ));
        }
        if max_iterations <= pre_iterations {
            return Err(RenderError::config(
                "max_iterations",
                "must exceed the pre-iteration count",
            ));
        }

        let span = max_iterations - pre_iterations;
        let luma = gamma_table(span as usize + 1, f64::from(span), gamma_luma, LUMA_FULL_SCALE)
            .into_iter()
            .map(|v| v as u16)
            .collect();
        let chroma = gamma_table(
            CHROMA_ENTRIES,
            CHROMA_FULL_SCALE,
            gamma_chroma,
            CHROMA_FULL_SCALE,
        )
        .into_iter()
        .map(|v| v as u8)
        .collect();

        Ok(Palette {
            luma,
            chroma,
            hue_step: 1,
            saturation: 1.0,
            brightness: 1.0,
        })
    }

    /// Build the palette a configuration asks for, hue controls included.
    pub fn from_config(config: &RenderConfig) -> Result<Self> {
        Ok(Palette::build(
            config.max_iterations,
            config.pre_iterations,
            config.gamma_luma,
            config.gamma_chroma,
        )?
        .with_hue(
            config.hue_degrees_per_iteration,
            config.color_saturation,
            config.color_brightness,
        ))
    }

    /// Set the hue rotation per iteration and the HSV saturation/value
    /// used for the chroma plane.
    pub fn with_hue(
        mut self,
        degrees_per_iteration: u32,
        saturation: f64,
        brightness: f64,
    ) -> Self {
        self.hue_step = degrees_per_iteration;
        self.saturation = saturation;
        self.brightness = brightness;
        self
    }

    /// Gamma-corrected luma for an escape count.  Counts beyond the
    /// table saturate at full scale.
    #[inline]
    pub fn luma(&self, iterations: u32) -> u16 {
        let last = self.luma.len() - 1;
        self.luma[(iterations as usize).min(last)]
    }

    /// Gamma-corrected value of one 8-bit channel.
    #[inline]
    pub fn chroma(&self, channel: u8) -> u8 {
        self.chroma[channel as usize]
    }

    /// Gamma-corrected colour for an escape count: the count picks a
    /// hue on the wheel, which goes through HSV→RGB and then the
    /// chroma table per channel.
    #[inline]
    pub fn color(&self, iterations: u32) -> [u8; 3] {
        let hue = (u64::from(iterations) * u64::from(self.hue_step)) % 360;
        let [r, g, b] = hsv_to_rgb(hue as f64, self.saturation, self.brightness);
        [self.chroma(r), self.chroma(g), self.chroma(b)]
    }

    /// The raw luma table.
    pub fn luma_table(&self) -> &[u16] {
        &self.luma
    }

    /// The raw chroma table.
    pub fn chroma_table(&self) -> &[u8] {
        &self.chroma
    }
}

/// Hue in degrees, saturation and value in `0.0..=1.0`.
pub fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [u8; 3] {
    let h = h % 360.0;
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    let channel = |n: f64| ((n + m) * CHROMA_FULL_SCALE).round() as u8;
    [channel(r), channel(g), channel(b)]
}
