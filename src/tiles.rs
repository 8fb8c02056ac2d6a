// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Splits a frame into square work blocks and runs them on a bounded
//! pool of scoped worker threads.
//!
//! The dispatcher feeds blocks through a channel whose capacity equals
//! the worker count, so it blocks whenever every worker is busy and the
//! queue is full.  Finished blocks flow back to the calling thread,
//! which hands each one to a sink as it arrives.  `TileScheduler::run`
//! returns only once every block has been computed and sunk.

use crate::error::{RenderError, Result};
use crossbeam::channel;
use itertools::iproduct;
use log::debug;

/// A rectangle of pixels, `[x_start, x_end) × [y_start, y_end)`,
/// already clipped to the image.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkBlock {
    /// First column.
    pub x_start: u32,
    /// First row.
    pub y_start: u32,
    /// One past the last column.
    pub x_end: u32,
    /// One past the last row.
    pub y_end: u32,
}

impl WorkBlock {
    /// Block width in pixels.
    pub fn width(&self) -> u32 {
        self.x_end - self.x_start
    }

    /// Block height in pixels.
    pub fn height(&self) -> u32 {
        self.y_end - self.y_start
    }

    /// Number of pixels covered.
    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// True for a block with no pixels; never produced by a `Tiling`.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixel coordinates in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> {
        iproduct!(self.y_start..self.y_end, self.x_start..self.x_end).map(|(y, x)| (x, y))
    }
}

/// The block grid of one image.  Pure arithmetic; nothing is stored.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tiling {
    width: u32,
    height: u32,
    block: u32,
    columns: u32,
    rows: u32,
}

fn blocks_along(extent: u32, block: u32) -> u32 {
    (extent + block - 1) / block
}

impl Tiling {
    /// Tile a `width × height` image with blocks of edge `block`.
    pub fn new(width: u32, height: u32, block: u32) -> Result<Self> {
        if block == 0 {
            return Err(RenderError::config("work_block", "must be at least 1"));
        }
        Ok(Tiling {
            width,
            height,
            block,
            columns: blocks_along(width, block),
            rows: blocks_along(height, block),
        })
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// True when the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The block at a row-major index, clipped to the image.
    pub fn block(&self, index: usize) -> Option<WorkBlock> {
        if index >= self.len() {
            return None;
        }
        let column = (index % self.columns as usize) as u32;
        let row = (index / self.columns as usize) as u32;
        let x_start = column * self.block;
        let y_start = row * self.block;
        Some(WorkBlock {
            x_start,
            y_start,
            x_end: (x_start + self.block).min(self.width),
            y_end: (y_start + self.block).min(self.height),
        })
    }

    /// Every block, row-major.
    pub fn blocks(&self) -> impl Iterator<Item = WorkBlock> + '_ {
        (0..self.len()).filter_map(move |i| self.block(i))
    }
}

/// A fixed-size pool of scoped workers.
#[derive(Copy, Clone, Debug)]
pub struct TileScheduler {
    workers: usize,
}

impl TileScheduler {
    /// A scheduler running at most `workers` blocks at once.
    pub fn new(workers: usize) -> Self {
        TileScheduler {
            workers: workers.max(1),
        }
    }

    /// Run `work` on every block of `tiling` and pass each result to
    /// `sink` on the calling thread.  Completion order is unspecified.
    /// Returns the number of blocks processed once all have finished.
    pub fn run<W, S, T>(&self, tiling: &Tiling, work: W, mut sink: S) -> Result<usize>
    where
        W: Fn(WorkBlock) -> T + Sync,
        S: FnMut(WorkBlock, T),
        T: Send,
    {
        if tiling.is_empty() {
            return Ok(0);
        }
        let work = &work;
        let (job_tx, job_rx) = channel::bounded::<WorkBlock>(self.workers);
        let (done_tx, done_rx) = channel::unbounded::<(WorkBlock, T)>();
        let mut completed = 0;

        crossbeam::scope(|spawner| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                spawner.spawn(move |_| {
                    for block in job_rx.iter() {
                        let result = work(block);
                        if done_tx.send((block, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            spawner.spawn(move |_| {
                for block in tiling.blocks() {
                    if job_tx.send(block).is_err() {
                        break;
                    }
                }
            });

            for (block, result) in done_rx.iter() {
                sink(block, result);
                completed += 1;
            }
        })
        .map_err(|_| RenderError::WorkerPanicked)?;

        debug!("{} blocks on {} workers", completed, self.workers);
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn coverage(width: u32, height: u32, block: u32) {
        let tiling = Tiling::new(width, height, block).unwrap();
        let mut seen = vec![0_u8; (width * height) as usize];
        for b in tiling.blocks() {
            assert!(!b.is_empty());
            assert!(b.x_end <= width && b.y_end <= height);
            for (x, y) in b.pixels() {
                seen[(y * width + x) as usize] += 1;
            }
        }
        assert!(
            seen.iter().all(|&n| n == 1),
            "{}x{} / {} left a gap or overlap",
            width,
            height,
            block
        );
    }

    #[test]
    fn blocks_cover_the_image_exactly_once() {
        for &(w, h, b) in &[
            (64, 64, 32),
            (64, 64, 64),
            (65, 33, 32),
            (7, 3, 1),
            (100, 37, 9),
            (31, 97, 31),
        ] {
            coverage(w, h, b);
        }
    }

    #[test]
    fn last_row_and_column_are_clipped() {
        let tiling = Tiling::new(70, 40, 32).unwrap();
        assert_eq!(tiling.len(), 6);
        assert_eq!(
            tiling.block(5),
            Some(WorkBlock {
                x_start: 64,
                y_start: 32,
                x_end: 70,
                y_end: 40
            })
        );
        assert_eq!(tiling.block(6), None);
    }

    #[test]
    fn zero_block_size_is_rejected() {
        assert!(Tiling::new(10, 10, 0).is_err());
    }

    #[test]
    fn every_block_is_sunk_once() {
        let tiling = Tiling::new(97, 61, 8).unwrap();
        for &workers in &[1, 2, 7] {
            let calls = AtomicUsize::new(0);
            let mut sunk = HashSet::new();
            let done = TileScheduler::new(workers)
                .run(
                    &tiling,
                    |block| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        block.len()
                    },
                    |block, len| {
                        assert_eq!(block.len(), len);
                        assert!(sunk.insert(block));
                    },
                )
                .unwrap();
            assert_eq!(done, tiling.len());
            assert_eq!(calls.load(Ordering::SeqCst), tiling.len());
            assert_eq!(sunk.len(), tiling.len());
        }
    }

    #[test]
    fn an_empty_image_dispatches_nothing() {
        let tiling = Tiling::new(0, 10, 4).unwrap();
        assert!(tiling.is_empty());
        let done = TileScheduler::new(4)
            .run(&tiling, |_| panic!("no block to render"), |_, _: ()| {})
            .unwrap();
        assert_eq!(done, 0);
    }

    #[test]
    fn no_more_than_workers_blocks_run_at_once() {
        let tiling = Tiling::new(64, 64, 4).unwrap();
        for &workers in &[1, 3, 5] {
            let live = AtomicUsize::new(0);
            let peak = AtomicUsize::new(0);
            TileScheduler::new(workers)
                .run(
                    &tiling,
                    |_| {
                        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(1));
                        live.fetch_sub(1, Ordering::SeqCst);
                    },
                    |_, _| {},
                )
                .unwrap();
            let peak = peak.load(Ordering::SeqCst);
            assert!(peak >= 1);
            assert!(peak <= workers, "{} blocks ran on {} workers", peak, workers);
        }
    }

    #[test]
    fn a_panicking_worker_fails_the_frame() {
        let tiling = Tiling::new(16, 16, 4).unwrap();
        let result = TileScheduler::new(2).run(
            &tiling,
            |block| {
                if block.x_start == 8 && block.y_start == 8 {
                    panic!("boom");
                }
            },
            |_, _| {},
        );
        match result {
            Err(RenderError::WorkerPanicked) => {}
            other => panic!("expected a worker panic, got {:?}", other),
        }
    }
}
