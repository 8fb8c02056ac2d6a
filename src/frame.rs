// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Frame buffers and the assembler that fills them.

use crate::config::RenderConfig;
use crate::error::Result;
use crate::palette::Palette;
use crate::planes::Pixel;
use crate::sampler::{PixelSampler, PixelValue};
use crate::tiles::{TileScheduler, Tiling, WorkBlock};
use image::{ImageBuffer, Luma, Rgba};

/// 16-bit grayscale plane.
pub type LumaPlane = ImageBuffer<Luma<u16>, Vec<u16>>;

/// 8-bit RGBA plane.
pub type ChromaPlane = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// The planes of one frame.  Either plane may be absent when its
/// output kind is disabled.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    /// Brightness plane.
    pub luma: Option<LumaPlane>,
    /// Colour plane.
    pub chroma: Option<ChromaPlane>,
}

impl FrameBuffer {
    /// Fresh, black planes of the given size.
    pub fn new(width: u32, height: u32, luma: bool, chroma: bool) -> Self {
        FrameBuffer {
            luma: if luma {
                Some(ImageBuffer::new(width, height))
            } else {
                None
            },
            chroma: if chroma {
                Some(ImageBuffer::new(width, height))
            } else {
                None
            },
        }
    }

    /// Copy one finished block into the planes.  `values` is the
    /// block's pixels in row-major order.
    pub fn write_block(&mut self, block: WorkBlock, values: &[PixelValue]) {
        debug_assert_eq!(block.len(), values.len());
        for ((x, y), value) in block.pixels().zip(values) {
            if let Some(luma) = self.luma.as_mut() {
                luma.put_pixel(x, y, Luma([value.luma]));
            }
            if let Some(chroma) = self.chroma.as_mut() {
                let [r, g, b] = value.rgb;
                chroma.put_pixel(x, y, Rgba([r, g, b, 0xFF]));
            }
        }
    }
}

/// What one frame render cost.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Blocks computed.
    pub blocks: usize,
    /// Escape-time evaluations performed.
    pub samples: u64,
}

/// Owns the per-run render machinery: the configuration, the palette,
/// the block grid and the worker pool.  Produces one finished
/// `FrameBuffer` per call to `render`.
#[derive(Debug)]
pub struct FrameAssembler {
    config: RenderConfig,
    palette: Palette,
    tiling: Tiling,
    scheduler: TileScheduler,
}

impl FrameAssembler {
    /// Validate the configuration and build the palette.  Nothing is
    /// dispatched until the palette exists.
    pub fn new(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let palette = Palette::from_config(&config)?;
        let tiling = Tiling::new(config.width, config.height, config.work_block)?;
        let scheduler = TileScheduler::new(config.workers);
        Ok(FrameAssembler {
            config,
            palette,
            tiling,
            scheduler,
        })
    }

    /// The configuration this assembler renders with.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// The palette shared by every worker.
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The block grid.
    pub fn tiling(&self) -> &Tiling {
        &self.tiling
    }

    /// A black frame sized and shaped for this run.
    pub fn new_frame(&self) -> FrameBuffer {
        FrameBuffer::new(
            self.config.width,
            self.config.height,
            self.config.enable_luma,
            self.config.enable_chroma,
        )
    }

    /// A sampler for the given magnification.
    pub fn sampler(&self, magnification: f64) -> PixelSampler<'_> {
        PixelSampler::new(&self.config, &self.palette, magnification)
    }

    /// Fill `frame` at `magnification`.  Blocks until every block is
    /// written.
    pub fn render_into(&self, frame: &mut FrameBuffer, magnification: f64) -> Result<FrameStats> {
        let sampler = self.sampler(magnification);
        let per_pixel = sampler.samples_per_pixel();
        let mut stats = FrameStats::default();

        self.scheduler.run(
            &self.tiling,
            |block| {
                block
                    .pixels()
                    .map(|(x, y)| sampler.shade(Pixel(x, y)))
                    .collect::<Vec<_>>()
            },
            |block, values| {
                frame.write_block(block, &values);
                stats.blocks += 1;
                stats.samples += block.len() as u64 * per_pixel;
            },
        )?;

        Ok(stats)
    }

    /// Render a fresh frame at `magnification`.
    pub fn render(&self, magnification: f64) -> Result<(FrameBuffer, FrameStats)> {
        let mut frame = self.new_frame();
        let stats = self.render_into(&mut frame, magnification)?;
        Ok((frame, stats))
    }

    /// The raw escape-time count of every pixel centre, row-major.
    /// Bounded points report the main-phase budget.
    pub fn iteration_grid(&self, magnification: f64) -> Result<Vec<u32>> {
        let sampler = self.sampler(magnification);
        let width = self.config.width as usize;
        let mut grid = vec![0_u32; width * self.config.height as usize];

        self.scheduler.run(
            &self.tiling,
            |block| {
                block
                    .pixels()
                    .map(|(x, y)| sampler.iterations(Pixel(x, y)))
                    .collect::<Vec<_>>()
            },
            |block, counts| {
                for ((x, y), count) in block.pixels().zip(counts) {
                    grid[y as usize * width + x as usize] = count;
                }
            },
        )?;

        Ok(grid)
    }
}
