// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The escape-time core.
//!
//! Every point runs `z ← z² + c` from `z = 0` in two phases.  The
//! first `pre_iterations` steps never reach the image: a point that
//! leaves the escape radius that early is `Escape::Early` and renders
//! as background, which removes the large featureless disc around the
//! set.  The main phase then counts up to `max_iterations -
//! pre_iterations` further steps.  Escape is the strict test
//! `|z|² > escape_radius_sq`.

use crate::config::RenderConfig;
use crate::palette::Palette;
use crate::planes::{Pixel, PlaneMapper};
use num::Complex;

/// The fate of a single sample.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Escape {
    /// Left the radius during the pre-iteration phase.
    Early,
    /// Left the radius after this many main-phase steps (0-based).
    Escaped(u32),
    /// Never left the radius within the budget: inside the set.
    Bounded,
}

impl Escape {
    /// Iteration count for this outcome, given the main-phase budget:
    /// early escapes count 0, bounded points count the whole budget.
    pub fn iterations(self, budget: u32) -> u32 {
        match self {
            Escape::Early => 0,
            Escape::Escaped(n) => n,
            Escape::Bounded => budget,
        }
    }
}

/// The averaged, palette-mapped value of one pixel.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PixelValue {
    /// 16-bit luma.
    pub luma: u16,
    /// 8-bit colour.
    pub rgb: [u8; 3],
}

/// Runs the iteration for one frame's worth of pixels.  Holds only
/// shared references and copies, so a single sampler is handed to
/// every worker.
#[derive(Clone, Copy, Debug)]
pub struct PixelSampler<'a> {
    palette: &'a Palette,
    mapper: PlaneMapper,
    pre_iterations: u32,
    main_iterations: u32,
    escape_radius_sq: f64,
    super_sample: u32,
}

/// Iterate one point.  Branch-light and allocation-free; this is where
/// the renderer spends nearly all of its time.
#[inline]
pub fn escape_time(
    c: Complex<f64>,
    pre_iterations: u32,
    main_iterations: u32,
    escape_radius_sq: f64,
) -> Escape {
    let (cre, cim) = (c.re, c.im);
    let (mut re, mut im) = (0.0_f64, 0.0_f64);

    for _ in 0..pre_iterations {
        let re2 = re * re;
        let im2 = im * im;
        im = 2.0 * re * im + cim;
        re = re2 - im2 + cre;
        if re * re + im * im > escape_radius_sq {
            return Escape::Early;
        }
    }

    for it in 0..main_iterations {
        let re2 = re * re;
        let im2 = im * im;
        im = 2.0 * re * im + cim;
        re = re2 - im2 + cre;
        if re * re + im * im > escape_radius_sq {
            return Escape::Escaped(it);
        }
    }

    Escape::Bounded
}

impl<'a> PixelSampler<'a> {
    /// Sampler for one frame at the given magnification.
    pub fn new(config: &RenderConfig, palette: &'a Palette, magnification: f64) -> Self {
        PixelSampler {
            palette,
            mapper: PlaneMapper::new(
                config.width,
                Complex::new(config.offset_x, config.offset_y),
                magnification,
            ),
            pre_iterations: config.pre_iterations,
            main_iterations: config.main_iterations(),
            escape_radius_sq: config.escape_radius_sq,
            super_sample: config.super_sample,
        }
    }

    /// The mapper this sampler places points with.
    pub fn mapper(&self) -> &PlaneMapper {
        &self.mapper
    }

    /// Main-phase iteration budget.
    pub fn budget(&self) -> u32 {
        self.main_iterations
    }

    /// Iterate a single complex point.
    #[inline]
    pub fn sample_point(&self, c: Complex<f64>) -> Escape {
        escape_time(
            c,
            self.pre_iterations,
            self.main_iterations,
            self.escape_radius_sq,
        )
    }

    /// Iterate a position inside a pixel; `ssx` and `ssy` lie in `[0, 1)`.
    #[inline]
    pub fn sample(&self, pixel: Pixel, ssx: f64, ssy: f64) -> Escape {
        self.sample_point(self.mapper.subpixel_to_point(pixel, ssx, ssy))
    }

    /// Number of samples `shade` evaluates per pixel.
    pub fn samples_per_pixel(&self) -> u64 {
        u64::from(self.super_sample) * u64::from(self.super_sample)
    }

    /// Average the palette-mapped value of an S×S grid of samples
    /// centred in their sub-pixel cells.  Escaped samples contribute
    /// their luma and colour; early and bounded samples contribute
    /// zero, which keeps both the background and the interior black.
    pub fn shade(&self, pixel: Pixel) -> PixelValue {
        let s = self.super_sample;
        let grid = f64::from(s);
        let (mut luma, mut r, mut g, mut b) = (0_u64, 0_u64, 0_u64, 0_u64);

        for sx in 0..s {
            let ssx = (f64::from(sx) + 0.5) / grid;
            for sy in 0..s {
                let ssy = (f64::from(sy) + 0.5) / grid;
                if let Escape::Escaped(it) = self.sample(pixel, ssx, ssy) {
                    luma += u64::from(self.palette.luma(it));
                    let [cr, cg, cb] = self.palette.color(it);
                    r += u64::from(cr);
                    g += u64::from(cg);
                    b += u64::from(cb);
                }
            }
        }

        let n = self.samples_per_pixel();
        PixelValue {
            luma: (luma / n) as u16,
            rgb: [(r / n) as u8, (g / n) as u8, (b / n) as u8],
        }
    }

    /// The escape-time count of the pixel centre, with the sampler's
    /// budget standing in for bounded points.
    pub fn iterations(&self, pixel: Pixel) -> u32 {
        self.sample(pixel, 0.5, 0.5).iterations(self.main_iterations)
    }
}
