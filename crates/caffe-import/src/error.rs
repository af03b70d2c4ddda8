use std::path::PathBuf;

use crate::cxxnet::Role;

/// Errors raised while converting a cxxnet model into a Caffe model.
///
/// Every variant is fatal for a conversion run: the converter stops at the first one and never
/// writes an output file.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The fixed-size header of the source model could not be read.
    #[error("corrupt model {path:?}: {reason}")]
    CorruptModel {
        /// Path of the source model file.
        path: PathBuf,
        /// What was wrong with the header.
        reason: String,
    },

    /// The source model body does not fit the declared network type.
    #[error("failed to load model: {0}")]
    LoadError(String),

    /// A destination layer has no matching tensor in the source model.
    #[error("layer `{layer}` has no {role} tensor in the source model")]
    UnknownLayer {
        /// Name of the destination layer.
        layer: String,
        /// Tensor that could not be resolved.
        role: Role,
    },

    /// Source tensor and destination buffer disagree on their size.
    #[error("shape mismatch in layer `{layer}` ({role}): {detail}")]
    ShapeMismatch {
        /// Name of the destination layer.
        layer: String,
        /// Tensor being transferred.
        role: Role,
        /// Which sizes disagreed.
        detail: String,
    },

    /// The output-count row stride of a fully-connected layer would write past its buffer.
    #[error(
        "layer `{layer}`: row stride {stride} overflows a {output_count}x{input_count} weight buffer"
    )]
    StrideOverflow {
        /// Name of the destination layer.
        layer: String,
        /// Row stride in use.
        stride: usize,
        /// Number of output units.
        output_count: usize,
        /// Number of inputs per output unit.
        input_count: usize,
    },

    /// A file could not be opened, read or written.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// Path of the file involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The source config contains a malformed line.
    #[error("invalid config at line {line}: {message}")]
    Config {
        /// One-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// The destination topology could not be parsed or its shapes inferred.
    #[error("invalid topology: {0}")]
    Topology(String),

    /// A converter was run without one of its paths.
    #[error("no {0} path was given")]
    MissingPath(&'static str),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type used across the crate.
pub type Result<T> = core::result::Result<T, Error>;
