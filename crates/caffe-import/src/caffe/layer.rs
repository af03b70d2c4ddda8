use core::fmt;

use strum_macros::{Display, EnumString};

/// Caffe layer types the topology loader knows a shape rule for.
///
/// Any other type string is still accepted: it is treated as shape preserving and carries no
/// parameters.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
pub enum LayerType {
    Input,
    MemoryData,
    DummyData,
    Convolution,
    Pooling,
    InnerProduct,
    Flatten,
    Reshape,
    Concat,
    Eltwise,
    BatchNorm,
    Scale,
    Bias,
    PReLU,
    Accuracy,
}

impl LayerType {
    /// Parse a `LayerParameter::type` string.
    pub fn parse(value: &str) -> Option<Self> {
        value.parse().ok()
    }
}

/// How the transfer engine treats a destination layer, decided once when the topology loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// `InnerProduct`: weight `(output_count, input_count)`.
    FullyConnected {
        /// Number of output units.
        output_count: usize,
        /// Flattened size of the input to one output unit.
        input_count: usize,
    },
    /// `Convolution`: weight `(output_count, input_channels, kernel_height, kernel_width)`.
    Convolution {
        /// Number of output channels.
        output_count: usize,
        /// Input channels seen by one filter (already divided by the group count).
        input_channels: usize,
        /// Kernel rows.
        kernel_height: usize,
        /// Kernel columns.
        kernel_width: usize,
    },
    /// Every other layer: skipped by the transfer.
    Unsupported,
}

impl LayerKind {
    /// Number of elements of the weight buffer, `None` for unsupported layers.
    pub fn weight_count(&self) -> Option<usize> {
        match self {
            LayerKind::FullyConnected {
                output_count,
                input_count,
            } => Some(output_count * input_count),
            LayerKind::Convolution {
                output_count,
                input_channels,
                kernel_height,
                kernel_width,
            } => Some(output_count * input_channels * kernel_height * kernel_width),
            LayerKind::Unsupported => None,
        }
    }

    /// Number of elements feeding one output unit or filter, `None` for unsupported layers.
    pub fn slab_len(&self) -> Option<usize> {
        match self {
            LayerKind::FullyConnected { input_count, .. } => Some(*input_count),
            LayerKind::Convolution {
                input_channels,
                kernel_height,
                kernel_width,
                ..
            } => Some(input_channels * kernel_height * kernel_width),
            LayerKind::Unsupported => None,
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::FullyConnected {
                output_count,
                input_count,
            } => write!(f, "FullyConnected({output_count}x{input_count})"),
            LayerKind::Convolution {
                output_count,
                input_channels,
                kernel_height,
                kernel_width,
            } => write!(
                f,
                "Convolution({output_count}x{input_channels}x{kernel_height}x{kernel_width})"
            ),
            LayerKind::Unsupported => f.write_str("Unsupported"),
        }
    }
}

/// A destination layer as seen by the transfer engine.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Unique layer name.
    pub name: String,
    /// The Caffe type string, e.g. `InnerProduct`.
    pub type_name: String,
    /// Transfer dispatch tag with its shape.
    pub kind: LayerKind,
}

/// A zero-initialized parameter buffer of a destination layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Blob {
    /// Allocate a zero-filled blob of the given shape.
    ///
    /// The element count of `shape` must fit in `usize`; shape inference checks it first.
    pub(crate) fn zeros(shape: Vec<usize>) -> Self {
        let count = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; count],
        }
    }

    /// The declared shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// The elements in row-major order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}
