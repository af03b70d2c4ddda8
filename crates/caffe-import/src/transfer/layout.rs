use clap::ValueEnum;

use crate::{
    cxxnet::{ParameterTensor, Role},
    error::{Error, Result},
};

/// Destination row stride used when laying out fully-connected weights.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowStride {
    /// Rows start every `output_count` elements.
    ///
    /// This reproduces models produced by earlier converters bit for bit, and is only a proper
    /// row-major layout for square layers.
    #[default]
    OutputCount,
    /// Rows start every `input_count` elements: plain row-major `(output_count, input_count)`.
    InputCount,
}

impl RowStride {
    /// The stride in elements for a layer with the given dimensions.
    pub fn resolve(self, output_count: usize, input_count: usize) -> usize {
        match self {
            RowStride::OutputCount => output_count,
            RowStride::InputCount => input_count,
        }
    }
}

/// Write the rows of `source` into `scratch`, row `r` starting at `r * stride`.
///
/// `source` must hold `output_count` rows of `input_count` elements. Fails with
/// [Error::StrideOverflow] when the last row would end past `scratch`.
pub fn fully_connected_weight(
    layer: &str,
    source: &ParameterTensor,
    output_count: usize,
    input_count: usize,
    stride: RowStride,
    scratch: &mut [f32],
) -> Result<()> {
    let stride = stride.resolve(output_count, input_count);

    if output_count > 0 && (output_count - 1) * stride + input_count > scratch.len() {
        return Err(Error::StrideOverflow {
            layer: layer.to_string(),
            stride,
            output_count,
            input_count,
        });
    }

    for row in 0..output_count {
        let source_row = source.row(row);
        for col in 0..input_count {
            scratch[row * stride + col] = source_row[col];
        }
    }

    Ok(())
}

/// Write a convolution weight into `scratch` in `(output, channel, row, col)` order.
///
/// Each row of `source` is the slab of one output channel, `channels * kernel_height *
/// kernel_width` elements indexed channel first.
pub fn convolution_weight(
    source: &ParameterTensor,
    output_count: usize,
    channels: usize,
    kernel_height: usize,
    kernel_width: usize,
    scratch: &mut [f32],
) {
    let mut next = 0;

    for output in 0..output_count {
        let slab = source.row(output);
        for channel in 0..channels {
            for row in 0..kernel_height {
                for col in 0..kernel_width {
                    scratch[next] = slab[(channel * kernel_height + row) * kernel_width + col];
                    next += 1;
                }
            }
        }
    }
}

/// Copy a bias vector element for element.
pub fn bias(layer: &str, source: &ParameterTensor, scratch: &mut [f32]) -> Result<()> {
    if source.count() != scratch.len() {
        return Err(Error::ShapeMismatch {
            layer: layer.to_string(),
            role: Role::Bias,
            detail: format!(
                "source has {} elements, destination expects {}",
                source.count(),
                scratch.len()
            ),
        });
    }

    scratch.copy_from_slice(source.data());
    Ok(())
}
