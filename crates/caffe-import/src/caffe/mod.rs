//! Building Caffe networks from `.prototxt` files and writing `.caffemodel` files.
//!
//! A topology is parsed with protobuf's text format, upgraded and filtered by phase the way
//! Caffe does it, then walked layer by layer to infer blob shapes and allocate zero-filled
//! parameter blobs.

mod layer;
mod shape_inference;
mod state;
mod topology;
mod writer;

/// Protobuf types generated from Caffe's `caffe.proto`.
#[allow(missing_docs, clippy::all)]
pub mod protos;

pub use layer::{Blob, LayerDescriptor, LayerKind, LayerType};
pub use state::{Device, Phase, TopologyConfig};
pub use topology::DestinationTopology;
pub use writer::ModelWriter;
