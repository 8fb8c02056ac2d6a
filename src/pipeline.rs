// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The frame loop.
//!
//! Each frame walks `CheckSkip → Claim → Render → Deliver → Advance`.
//! A frame whose artifacts already exist is skipped without sampling a
//! single point, which is what lets an interrupted run restart, and
//! several machines share one output directory, without duplicating
//! work.  The zoom counter and the frame index change only in the
//! `Advance` step, after the previous render has fully returned.

use crate::config::RenderConfig;
use crate::error::Result;
use crate::frame::{FrameAssembler, FrameBuffer, FrameStats};
use crate::output::{Claim, FinishedFrame, FrameWriter, OutputLayout};
use crate::zoom::ZoomSequencer;
use log::{info, warn};
use std::mem;
use std::time::Instant;

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    /// Rendered and written.
    Rendered {
        /// Escape-time evaluations spent on the frame.
        samples: u64,
    },
    /// An artifact was already on disk.
    AlreadyExists,
    /// Another process claimed the frame between the check and the claim.
    ClaimedElsewhere,
}

/// Totals for a whole run.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    /// Frames this process rendered.
    pub frames_rendered: u64,
    /// Frames skipped because they were done or claimed.
    pub frames_skipped: u64,
    /// Escape-time evaluations across all rendered frames.
    pub samples: u64,
}

/// The step the pipeline will carry out next for the current frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// Look for artifacts that already exist.
    CheckSkip,
    /// Take the frame's placeholders.
    Claim,
    /// Sample every pixel.
    Render,
    /// Hand the planes to the writer.
    Deliver,
    /// Move the frame index and the zoom on.
    Advance,
    /// The end frame has been handled.
    Finished,
}

/// Per-frame state, carrying whatever the next phase consumes.
enum Stage {
    CheckSkip,
    Claim,
    Render(Claim),
    Deliver {
        claim: Claim,
        buffer: FrameBuffer,
        stats: FrameStats,
        started: Instant,
    },
    Advance(FrameOutcome),
    Finished,
}

impl Stage {
    fn phase(&self) -> FramePhase {
        match self {
            Stage::CheckSkip => FramePhase::CheckSkip,
            Stage::Claim => FramePhase::Claim,
            Stage::Render(_) => FramePhase::Render,
            Stage::Deliver { .. } => FramePhase::Deliver,
            Stage::Advance(_) => FramePhase::Advance,
            Stage::Finished => FramePhase::Finished,
        }
    }
}

/// The single-threaded driver around the parallel frame renderer.
pub struct FramePipeline<W: FrameWriter> {
    assembler: FrameAssembler,
    layout: OutputLayout,
    zoom: ZoomSequencer,
    writer: W,
    frame: u64,
    end_frame: u64,
    stage: Stage,
}

impl<W: FrameWriter> FramePipeline<W> {
    /// Validate `config`, build the palette, and position the zoom at
    /// the configured start frame.
    pub fn new(config: RenderConfig, writer: W) -> Result<Self> {
        let layout = OutputLayout::from_config(&config);
        let mut zoom = ZoomSequencer::from_config(&config);
        let frame = config.start_frame;
        let end_frame = config.end_frame;
        let assembler = FrameAssembler::new(config)?;
        zoom.seek(frame);
        Ok(FramePipeline {
            assembler,
            layout,
            zoom,
            writer,
            frame,
            end_frame,
            stage: Stage::CheckSkip,
        })
    }

    /// Index of the frame being handled.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Magnification of the frame being handled.
    pub fn magnification(&self) -> f64 {
        self.zoom.magnification()
    }

    /// The phase `advance_phase` will carry out next.
    pub fn phase(&self) -> FramePhase {
        self.stage.phase()
    }

    /// True once the end frame has been handled.
    pub fn is_finished(&self) -> bool {
        self.phase() == FramePhase::Finished
    }

    /// The writer frames are delivered to.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Carry out one phase of the current frame.  Returns the frame's
    /// outcome once its `Advance` phase has run.
    ///
    /// A failed phase stays current: a failed claim is retried from
    /// the claim, and a failed render or delivery re-renders into the
    /// placeholders already held.
    pub fn advance_phase(&mut self) -> Result<Option<(u64, FrameOutcome)>> {
        let index = self.frame;
        let (next, done) = match mem::replace(&mut self.stage, Stage::Finished) {
            Stage::CheckSkip => match self.layout.existing(index) {
                Some(path) => {
                    info!("{} exists... skipping frame {}", path.display(), index);
                    (Stage::Advance(FrameOutcome::AlreadyExists), None)
                }
                None => (Stage::Claim, None),
            },
            Stage::Claim => match self.layout.claim(index) {
                Ok(Some(claim)) => (Stage::Render(claim), None),
                Ok(None) => {
                    warn!("frame {} was claimed by another process", index);
                    (Stage::Advance(FrameOutcome::ClaimedElsewhere), None)
                }
                Err(e) => {
                    self.stage = Stage::Claim;
                    return Err(e);
                }
            },
            Stage::Render(claim) => {
                let started = Instant::now();
                match self.assembler.render(self.zoom.magnification()) {
                    Ok((buffer, stats)) => (
                        Stage::Deliver {
                            claim,
                            buffer,
                            stats,
                            started,
                        },
                        None,
                    ),
                    Err(e) => {
                        self.stage = Stage::Render(claim);
                        return Err(e);
                    }
                }
            }
            Stage::Deliver {
                claim,
                buffer,
                stats,
                started,
            } => {
                let magnification = self.zoom.magnification();
                let frame = FinishedFrame {
                    index,
                    magnification,
                    buffer,
                };
                if let Err(e) = self.writer.write(frame, &claim) {
                    self.stage = Stage::Render(claim);
                    return Err(e);
                }
                info!(
                    "Completed frame: {} (zoom {:.6e}, {:.2?})",
                    index,
                    magnification,
                    started.elapsed()
                );
                let outcome = FrameOutcome::Rendered {
                    samples: stats.samples,
                };
                (Stage::Advance(outcome), None)
            }
            Stage::Advance(outcome) => {
                let next = if self.frame >= self.end_frame {
                    Stage::Finished
                } else {
                    self.frame += 1;
                    self.zoom.advance();
                    Stage::CheckSkip
                };
                (next, Some((index, outcome)))
            }
            Stage::Finished => (Stage::Finished, None),
        };
        self.stage = next;
        Ok(done)
    }

    /// Handle the current frame and advance to the next one.  Returns
    /// `None` once the sequence is complete.
    pub fn step(&mut self) -> Result<Option<(u64, FrameOutcome)>> {
        while !self.is_finished() {
            if let Some(done) = self.advance_phase()? {
                return Ok(Some(done));
            }
        }
        Ok(None)
    }

    /// Run every remaining frame.
    pub fn run(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        while let Some((_, outcome)) = self.step()? {
            match outcome {
                FrameOutcome::Rendered { samples } => {
                    stats.frames_rendered += 1;
                    stats.samples += samples;
                }
                FrameOutcome::AlreadyExists | FrameOutcome::ClaimedElsewhere => {
                    stats.frames_skipped += 1;
                }
            }
        }
        info!(
            "Rendering complete: {} rendered, {} skipped",
            stats.frames_rendered, stats.frames_skipped
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::output::OutputKind;
    use std::fs;
    use std::path::Path;

    /// Records deliveries instead of encoding them.
    #[derive(Default)]
    struct Recorder {
        frames: Vec<(u64, f64)>,
    }

    impl FrameWriter for Recorder {
        fn write(&mut self, frame: FinishedFrame, claim: &Claim) -> Result<()> {
            assert_eq!(frame.index, claim.frame);
            self.frames.push((frame.index, frame.magnification));
            Ok(())
        }
    }

    struct Broken;

    impl FrameWriter for Broken {
        fn write(&mut self, _: FinishedFrame, claim: &Claim) -> Result<()> {
            Err(RenderError::artifact(
                &claim.artifacts[0].1,
                std::io::Error::new(std::io::ErrorKind::Other, "read-only share"),
            ))
        }
    }

    fn config(dir: &Path) -> RenderConfig {
        RenderConfig {
            width: 16,
            height: 16,
            super_sample: 1,
            work_block: 8,
            max_iterations: 64,
            pre_iterations: 2,
            workers: 2,
            start_frame: 0,
            end_frame: 3,
            output_dir: dir.to_path_buf(),
            ..RenderConfig::default()
        }
    }

    #[test]
    fn renders_every_frame_through_the_end_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = FramePipeline::new(config(dir.path()), Recorder::default()).unwrap();
        let stats = pipeline.run().unwrap();

        assert!(pipeline.is_finished());
        assert_eq!(stats.frames_rendered, 4);
        assert_eq!(stats.frames_skipped, 0);
        assert_eq!(stats.samples, 4 * 16 * 16);

        let frames = &pipeline.writer().frames;
        assert_eq!(
            frames.iter().map(|f| f.0).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(frames.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(pipeline.step().unwrap(), None);
    }

    #[test]
    fn existing_artifacts_skip_the_frame_without_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.end_frame = 0;
        let layout = OutputLayout::from_config(&cfg);
        let luma = layout.path(OutputKind::Luma, 0);
        fs::write(&luma, b"").unwrap();

        let mut pipeline = FramePipeline::new(cfg, Recorder::default()).unwrap();
        let stats = pipeline.run().unwrap();

        assert_eq!(stats.frames_rendered, 0);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.samples, 0);
        assert!(pipeline.writer().frames.is_empty());
        assert_eq!(fs::metadata(&luma).unwrap().len(), 0);
        // No chroma placeholder was taken for the skipped frame.
        assert!(!layout.path(OutputKind::Chroma, 0).exists());
    }

    #[test]
    fn skipped_frames_keep_the_zoom_in_step() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let layout = OutputLayout::from_config(&cfg);
        fs::write(layout.path(OutputKind::Chroma, 1), b"").unwrap();

        let mut resumed = FramePipeline::new(cfg.clone(), Recorder::default()).unwrap();
        resumed.run().unwrap();

        let fresh_dir = tempfile::tempdir().unwrap();
        let mut fresh =
            FramePipeline::new(config(fresh_dir.path()), Recorder::default()).unwrap();
        fresh.run().unwrap();

        let expected: Vec<_> = fresh
            .writer()
            .frames
            .iter()
            .filter(|f| f.0 != 1)
            .cloned()
            .collect();
        assert_eq!(resumed.writer().frames, expected);
    }

    #[test]
    fn starting_mid_sequence_matches_the_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut full = FramePipeline::new(config(dir.path()), Recorder::default()).unwrap();
        full.run().unwrap();

        let other = tempfile::tempdir().unwrap();
        let mut cfg = config(other.path());
        cfg.start_frame = 2;
        let mut partial = FramePipeline::new(cfg, Recorder::default()).unwrap();
        assert_eq!(partial.frame(), 2);
        partial.run().unwrap();

        assert_eq!(partial.writer().frames[..], full.writer().frames[2..]);
    }

    #[test]
    fn write_failures_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = FramePipeline::new(config(dir.path()), Broken).unwrap();
        assert!(pipeline.run().is_err());
        assert_eq!(pipeline.frame(), 0);
        assert_eq!(pipeline.phase(), FramePhase::Render);
        assert!(!pipeline.is_finished());
    }

    #[test]
    fn a_rendered_frame_walks_every_phase() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = FramePipeline::new(config(dir.path()), Recorder::default()).unwrap();

        let mut phases = vec![pipeline.phase()];
        while pipeline.advance_phase().unwrap().is_none() {
            phases.push(pipeline.phase());
        }
        assert_eq!(
            phases,
            vec![
                FramePhase::CheckSkip,
                FramePhase::Claim,
                FramePhase::Render,
                FramePhase::Deliver,
                FramePhase::Advance,
            ]
        );
        assert_eq!(pipeline.phase(), FramePhase::CheckSkip);
        assert_eq!(pipeline.frame(), 1);
    }

    #[test]
    fn losing_the_claim_race_skips_the_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.end_frame = 0;
        let layout = OutputLayout::from_config(&cfg);
        let mut pipeline = FramePipeline::new(cfg, Recorder::default()).unwrap();

        assert_eq!(pipeline.advance_phase().unwrap(), None);
        assert_eq!(pipeline.phase(), FramePhase::Claim);

        // Another process takes the lock after the existence check.
        let lock = layout.path(OutputKind::Chroma, 0);
        fs::write(&lock, b"").unwrap();

        assert_eq!(
            pipeline.step().unwrap(),
            Some((0, FrameOutcome::ClaimedElsewhere))
        );
        assert!(pipeline.is_finished());
        assert!(pipeline.writer().frames.is_empty());
        assert_eq!(fs::metadata(&lock).unwrap().len(), 0);
        assert!(!layout.path(OutputKind::Luma, 0).exists());
    }

    #[test]
    fn invalid_configuration_never_starts() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.gamma_chroma = 0.0;
        assert!(FramePipeline::new(cfg, Recorder::default()).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
