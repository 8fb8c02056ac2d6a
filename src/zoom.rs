// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The zoom progression.  An integer-stepped counter drives a power
//! curve, `magnification = (counter / zoom_div) ^ zoom_pow`, so equal
//! counter steps read as a constant zoom speed on screen.

use crate::config::RenderConfig;

/// Where the sequencer is in its life.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ZoomState {
    /// No frame has been issued yet.
    Idle,
    /// Steady state: the counter has been advanced at least once.
    Advancing {
        /// Current counter value.
        counter: f64,
        /// Magnification derived from `counter`.
        magnification: f64,
    },
}

/// Owns the zoom counter.  Only the single-threaded frame loop holds a
/// `&mut ZoomSequencer`; workers never see it.
#[derive(Clone, Debug)]
pub struct ZoomSequencer {
    start: f64,
    add: f64,
    div: f64,
    pow: f64,
    state: ZoomState,
}

impl ZoomSequencer {
    /// A sequencer in the `Idle` state, positioned before frame 0.
    pub fn new(start: f64, add: f64, div: f64, pow: f64) -> Self {
        ZoomSequencer {
            start,
            add,
            div,
            pow,
            state: ZoomState::Idle,
        }
    }

    /// A sequencer built from the zoom settings of a configuration.
    pub fn from_config(config: &RenderConfig) -> Self {
        ZoomSequencer::new(
            config.zoom_start,
            config.zoom_add,
            config.zoom_div,
            config.zoom_pow,
        )
    }

    /// The curve itself, for any counter value.
    pub fn magnification_at(&self, counter: f64) -> f64 {
        (counter / self.div).powf(self.pow)
    }

    /// Counter value used for a given frame.  The counter is stepped
    /// once before frame 0, so frame `n` sits at `start + (n + 1) * add`.
    pub fn counter_for_frame(&self, frame: u64) -> f64 {
        self.start + (frame as f64 + 1.0) * self.add
    }

    /// Step the counter once and return the new magnification.
    pub fn advance(&mut self) -> f64 {
        let counter = match self.state {
            ZoomState::Idle => self.start + self.add,
            ZoomState::Advancing { counter, .. } => counter + self.add,
        };
        let magnification = self.magnification_at(counter);
        self.state = ZoomState::Advancing {
            counter,
            magnification,
        };
        magnification
    }

    /// Jump straight to the state `advance` would reach for `frame`,
    /// so a process starting mid-sequence matches one that started at
    /// frame 0.
    pub fn seek(&mut self, frame: u64) -> f64 {
        let counter = self.counter_for_frame(frame);
        let magnification = self.magnification_at(counter);
        self.state = ZoomState::Advancing {
            counter,
            magnification,
        };
        magnification
    }

    /// Current state.
    pub fn state(&self) -> ZoomState {
        self.state
    }

    /// Current magnification; 1.0 until the first advance.
    pub fn magnification(&self) -> f64 {
        match self.state {
            ZoomState::Idle => 1.0,
            ZoomState::Advancing { magnification, .. } => magnification,
        }
    }
}
