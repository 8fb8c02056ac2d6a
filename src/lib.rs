#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mandelbrot zoom renderer
//!
//! Renders an animation diving into the Mandelbrot set.  Every frame
//! is magnified a little more than the last, following a power curve
//! so that the dive looks like a constant speed.  For each pixel we
//! take a grid of sub-samples, iterate `z ← z² + c` until the orbit
//! leaves the escape radius or the budget runs out, and map the escape
//! count through gamma-corrected brightness and hue tables.  Points
//! that never escape are the black heart of the set.
//!
//! A frame is cut into square work blocks which a fixed pool of
//! threads renders in parallel.  Finished frames are written to an
//! output directory as one file per plane, and the existence of those
//! files is the only progress record: restart a run, or point several
//! machines at one shared directory, and frames that are already done
//! or claimed are skipped.

extern crate crossbeam;
extern crate failure;
extern crate image;
extern crate itertools;
extern crate num;
extern crate num_cpus;
extern crate tempfile;
extern crate tiff;

pub mod config;
pub mod error;
pub mod frame;
pub mod output;
pub mod palette;
pub mod pipeline;
pub mod planes;
pub mod sampler;
pub mod tiles;
pub mod zoom;

pub use config::{Compression, OutputFormat, RenderConfig};
pub use error::{RenderError, Result};
pub use frame::{FrameAssembler, FrameBuffer, FrameStats};
pub use output::{Claim, FinishedFrame, FrameWriter, ImageWriter, OutputKind, OutputLayout};
pub use palette::Palette;
pub use pipeline::{FrameOutcome, FramePhase, FramePipeline, RunStats};
pub use planes::{Pixel, PlaneMapper};
pub use sampler::{escape_time, Escape, PixelSampler, PixelValue};
pub use tiles::{TileScheduler, Tiling, WorkBlock};
pub use zoom::{ZoomSequencer, ZoomState};
