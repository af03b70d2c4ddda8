#![warn(missing_docs)]

//! `caffe-import` converts models trained with cxxnet into Caffe models.
//!
//! The source parameters are read from a cxxnet parameter dump together with the config the
//! network was trained with, the destination network is built from a Caffe `.prototxt`, and the
//! weights of every `InnerProduct` and `Convolution` layer are copied over in the layout Caffe
//! expects. The result is written as a binary `.caffemodel`.
//!
//! [ModelConverter] runs the whole pipeline; the `cxx2caffe` binary exposes it on the command
//! line.

#[macro_use]
extern crate derive_new;

/// Caffe networks and model files.
pub mod caffe;
/// Command line front end.
pub mod cli;
/// cxxnet configs and parameter dumps.
pub mod cxxnet;
/// Copying parameters between the two frameworks.
pub mod transfer;

mod convert;
mod error;
mod logger;

pub use convert::ModelConverter;
pub use error::{Error, Result};
pub use logger::{init_log, LogError};
