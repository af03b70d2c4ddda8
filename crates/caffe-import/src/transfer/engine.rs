use core::fmt;

use super::layout::{self, RowStride};
use crate::{
    caffe::{DestinationTopology, LayerDescriptor, LayerKind},
    cxxnet::{ParameterTensor, Role, SourceModelReader},
    error::{Error, Result},
};

/// Options of a [TransferEngine].
#[derive(new, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferConfig {
    /// Row stride used for fully-connected weights.
    pub row_stride: RowStride,
}

/// What happened to one destination layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerOutcome {
    /// The layer's weight and bias were copied from the source.
    Transferred {
        /// Layer name.
        layer: String,
        /// How the weight was laid out.
        kind: LayerKind,
    },
    /// The layer has no transfer rule and kept its zero-filled blobs.
    Skipped {
        /// Layer name.
        layer: String,
        /// The Caffe type string.
        type_name: String,
    },
}

impl fmt::Display for LayerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerOutcome::Transferred { layer, kind } => write!(f, "{layer}: {kind}"),
            LayerOutcome::Skipped { layer, type_name } => {
                write!(f, "{layer}: skipped ({type_name})")
            }
        }
    }
}

/// Per-layer outcomes of a transfer, in topology order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    outcomes: Vec<LayerOutcome>,
}

impl TransferReport {
    /// Every outcome in topology order.
    pub fn outcomes(&self) -> &[LayerOutcome] {
        &self.outcomes
    }

    /// Names of the transferred layers.
    pub fn transferred(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            LayerOutcome::Transferred { layer, .. } => Some(layer.as_str()),
            LayerOutcome::Skipped { .. } => None,
        })
    }

    /// Names of the skipped layers.
    pub fn skipped(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            LayerOutcome::Skipped { layer, .. } => Some(layer.as_str()),
            LayerOutcome::Transferred { .. } => None,
        })
    }
}

/// Copies source tensors into destination blobs, re-ordering them to Caffe's layouts.
#[derive(new, Debug, Clone, Copy, Default)]
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    /// Transfer every supported layer of `topology` from `source`.
    ///
    /// Stops at the first failing layer. A layer's blobs are only written once both its weight
    /// and bias are fully laid out.
    pub fn run(
        &self,
        source: &SourceModelReader,
        topology: &mut DestinationTopology,
    ) -> Result<TransferReport> {
        let mut report = TransferReport::default();
        let descriptors = topology.layers().to_vec();

        for descriptor in descriptors {
            if descriptor.kind == LayerKind::Unsupported {
                log::info!(
                    "Skipping layer `{}` of type {}",
                    descriptor.name,
                    descriptor.type_name
                );
                report.outcomes.push(LayerOutcome::Skipped {
                    layer: descriptor.name,
                    type_name: descriptor.type_name,
                });
                continue;
            }

            self.transfer_layer(source, topology, &descriptor)?;
            log::info!("Transferred layer `{}` as {}", descriptor.name, descriptor.kind);

            report.outcomes.push(LayerOutcome::Transferred {
                layer: descriptor.name,
                kind: descriptor.kind,
            });
        }

        Ok(report)
    }

    fn transfer_layer(
        &self,
        source: &SourceModelReader,
        topology: &mut DestinationTopology,
        descriptor: &LayerDescriptor,
    ) -> Result<()> {
        let name = descriptor.name.as_str();
        let (weight_scratch, bias_scratch) = {
            let blobs = topology.buffers(name).ok_or_else(|| missing_blobs(name))?;
            let weight = blobs.first().ok_or_else(|| missing_blobs(name))?;
            let dest_bias = blobs.get(1);

            let source_weight = source.tensor(name, Role::Weight)?;
            // A layer declared without a bias term has nothing to receive the source bias.
            let source_bias = match dest_bias {
                Some(_) => Some(source.tensor(name, Role::Bias)?),
                None => None,
            };

            check_weight(descriptor, source_weight, weight.count())?;

            let mut weight_scratch = weight.data().to_vec();
            self.layout_weight(descriptor, source_weight, &mut weight_scratch)?;

            let bias_scratch = match (source_bias, dest_bias) {
                (Some(source_bias), Some(dest_bias)) => {
                    let mut scratch = vec![0.0; dest_bias.count()];
                    layout::bias(name, source_bias, &mut scratch)?;
                    Some(scratch)
                }
                _ => None,
            };

            (weight_scratch, bias_scratch)
        };

        let blobs = topology
            .buffers_mut(name)
            .ok_or_else(|| missing_blobs(name))?;
        blobs[0].data_mut().copy_from_slice(&weight_scratch);
        if let Some(bias) = bias_scratch {
            blobs[1].data_mut().copy_from_slice(&bias);
        }

        Ok(())
    }

    fn layout_weight(
        &self,
        descriptor: &LayerDescriptor,
        source: &ParameterTensor,
        scratch: &mut [f32],
    ) -> Result<()> {
        match descriptor.kind {
            LayerKind::FullyConnected {
                output_count,
                input_count,
            } => {
                let stride = self.config.row_stride;
                if stride == RowStride::OutputCount && output_count != input_count {
                    log::warn!(
                        "Layer `{}` is {output_count}x{input_count}: rows are laid out with stride \
                         {output_count}, pass the input-count row stride for a row-major layout",
                        descriptor.name
                    );
                }
                layout::fully_connected_weight(
                    &descriptor.name,
                    source,
                    output_count,
                    input_count,
                    stride,
                    scratch,
                )
            }
            LayerKind::Convolution {
                output_count,
                input_channels,
                kernel_height,
                kernel_width,
            } => {
                layout::convolution_weight(
                    source,
                    output_count,
                    input_channels,
                    kernel_height,
                    kernel_width,
                    scratch,
                );
                Ok(())
            }
            LayerKind::Unsupported => Ok(()),
        }
    }
}

fn missing_blobs(layer: &str) -> Error {
    Error::Topology(format!("layer `{layer}` has no parameter blobs"))
}

/// Element counts and slab widths of the source weight must match the destination.
fn check_weight(
    descriptor: &LayerDescriptor,
    source: &ParameterTensor,
    dest_count: usize,
) -> Result<()> {
    let mismatch = |detail: String| Error::ShapeMismatch {
        layer: descriptor.name.clone(),
        role: Role::Weight,
        detail,
    };

    let (Some(expected), Some(slab)) =
        (descriptor.kind.weight_count(), descriptor.kind.slab_len())
    else {
        return Ok(());
    };

    if source.count() != expected || dest_count != expected {
        return Err(mismatch(format!(
            "source has {} elements, destination expects {expected}",
            source.count()
        )));
    }

    if source.row_len() != slab {
        return Err(mismatch(format!(
            "source has {} rows of {} elements, destination slabs hold {slab}",
            source.row_count(),
            source.row_len()
        )));
    }

    Ok(())
}
