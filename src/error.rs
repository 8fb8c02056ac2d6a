// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The error type shared by every stage of the renderer.
//!
//! Configuration problems are caught before a single pixel is
//! sampled.  Anything that goes wrong while claiming or writing an
//! artifact ends the run; it is never retried.

use failure::Fail;
use std::io;
use std::path::Path;

/// Everything that can stop a render.
#[derive(Debug, Fail)]
pub enum RenderError {
    /// A configuration value is out of range.
    #[fail(display = "invalid configuration for {}: {}", field, reason)]
    InvalidConfig {
        /// The offending option.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An output artifact could not be created, opened or written.
    #[fail(display = "cannot write artifact {}: {}", path, cause)]
    Artifact {
        /// Path of the artifact.
        path: String,
        /// The underlying I/O failure.
        #[cause]
        cause: io::Error,
    },

    /// The image encoder refused the frame.
    #[fail(display = "cannot encode frame into {}: {}", path, cause)]
    Encode {
        /// Path of the artifact.
        path: String,
        /// The underlying encoder failure.
        #[cause]
        cause: image::ImageError,
    },

    /// A worker thread panicked in the middle of a frame.
    #[fail(display = "a render worker panicked")]
    WorkerPanicked,
}

impl RenderError {
    pub(crate) fn config<S: Into<String>>(field: &'static str, reason: S) -> Self {
        RenderError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn artifact(path: &Path, cause: io::Error) -> Self {
        RenderError::Artifact {
            path: path.display().to_string(),
            cause,
        }
    }

    pub(crate) fn encode(path: &Path, cause: image::ImageError) -> Self {
        RenderError::Encode {
            path: path.display().to_string(),
            cause,
        }
    }
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, RenderError>;
