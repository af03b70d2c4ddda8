//! Copying cxxnet parameters into Caffe blobs.
//!
//! cxxnet stores every weight as a sequence of per-output slabs. Caffe expects row-major
//! `(output, input)` weights for `InnerProduct` layers and `(output, channel, row, col)` weights
//! for `Convolution` layers. [TransferEngine] walks the destination layers in order and lays
//! each supported one out through the functions of [layout].

mod engine;
pub mod layout;

pub use engine::{LayerOutcome, TransferConfig, TransferEngine, TransferReport};
pub use layout::RowStride;
