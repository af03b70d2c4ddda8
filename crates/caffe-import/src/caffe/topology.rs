use std::{collections::HashMap, fs, path::Path};

use protobuf::{text_format, MessageField};

use super::{
    layer::{Blob, LayerDescriptor},
    protos::{BlobProto, BlobShape, NetParameter},
    shape_inference::{infer_layer, Shape},
    state::{filter_net, upgrade_net_input, TopologyConfig},
};
use crate::{
    cxxnet::Role,
    error::{Error, Result},
};

/// A Caffe network built from a `.prototxt`, with zero-filled parameter blobs.
///
/// Layers are kept in declaration order after phase filtering. Each layer owns the blobs
/// Caffe would allocate for it, the weight first and the bias second for parameterized
/// layers.
#[derive(Debug, Clone)]
pub struct DestinationTopology {
    net: NetParameter,
    config: TopologyConfig,
    layers: Vec<LayerDescriptor>,
    blobs: Vec<Vec<Blob>>,
    index: HashMap<String, usize>,
}

impl DestinationTopology {
    /// Read and build the network described by the prototxt at `path`.
    pub fn load(path: &Path, config: TopologyConfig) -> Result<Self> {
        log::info!("Reading Caffe topology {path:?}");

        let text = fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Self::parse(&text, config)
    }

    /// Build the network described by prototxt `text`.
    pub fn parse(text: &str, config: TopologyConfig) -> Result<Self> {
        let net = text_format::parse_from_str::<NetParameter>(text)
            .map_err(|err| Error::Topology(format!("cannot parse prototxt: {err}")))?;

        Self::from_net(net, config)
    }

    /// Build the network described by an already parsed `NetParameter`.
    pub fn from_net(mut net: NetParameter, config: TopologyConfig) -> Result<Self> {
        log::debug!(
            "Building {} net `{}` on {}",
            config.phase,
            net.name(),
            config.device
        );

        upgrade_net_input(&mut net)?;
        filter_net(&mut net, config.phase)?;

        let mut shapes: HashMap<String, Option<Shape>> = HashMap::new();
        let mut layers = Vec::with_capacity(net.layer.len());
        let mut blobs = Vec::with_capacity(net.layer.len());
        let mut index = HashMap::new();

        for (position, layer) in net.layer.iter().enumerate() {
            if index.insert(layer.name().to_string(), position).is_some() {
                return Err(Error::Topology(format!(
                    "duplicate layer name `{}`",
                    layer.name()
                )));
            }

            let bottoms = layer
                .bottom
                .iter()
                .map(|bottom| {
                    shapes.get(bottom).cloned().ok_or_else(|| {
                        Error::Topology(format!(
                            "layer `{}` reads unknown blob `{bottom}`",
                            layer.name()
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let inferred = infer_layer(layer, &bottoms)?;
            log::debug!(
                "Layer `{}` ({}): tops {:?}, params {:?}",
                layer.name(),
                layer.type_(),
                inferred.tops,
                inferred.blobs
            );

            for (top, shape) in layer.top.iter().zip(inferred.tops) {
                shapes.insert(top.clone(), shape);
            }

            layers.push(LayerDescriptor::new(
                layer.name().to_string(),
                layer.type_().to_string(),
                inferred.kind,
            ));
            blobs.push(inferred.blobs.into_iter().map(Blob::zeros).collect());
        }

        log::info!(
            "Loaded {} net `{}` with {} layers",
            config.phase,
            net.name(),
            layers.len()
        );

        Ok(Self {
            net,
            config,
            layers,
            blobs,
            index,
        })
    }

    /// The net name.
    pub fn name(&self) -> &str {
        self.net.name()
    }

    /// The options the net was built with.
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// The layers in declaration order.
    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    /// The `role` blob of the layer named `layer`, if the layer has one.
    pub fn buffer(&self, layer: &str, role: Role) -> Option<&Blob> {
        let position = self.index.get(layer)?;
        self.blobs[*position].get(role_index(role))
    }

    /// Every parameter blob of the layer named `layer`.
    pub fn buffers(&self, layer: &str) -> Option<&[Blob]> {
        let position = self.index.get(layer)?;
        Some(&self.blobs[*position])
    }

    /// Every parameter blob of the layer named `layer`, mutably.
    pub fn buffers_mut(&mut self, layer: &str) -> Option<&mut [Blob]> {
        let position = self.index.get(layer)?;
        Some(&mut self.blobs[*position])
    }

    /// The net with its current blobs, as Caffe's `Net::ToProto` would produce it.
    ///
    /// Layers without an explicit phase get the phase the net was built for.
    pub fn to_proto(&self) -> NetParameter {
        let mut net = self.net.clone();
        let phase = self.config.phase.to_proto();

        for (layer, blobs) in net.layer.iter_mut().zip(self.blobs.iter()) {
            if !layer.has_phase() {
                layer.set_phase(phase);
            }
            layer.blobs = blobs.iter().map(blob_proto).collect();
        }

        net
    }
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Weight => 0,
        Role::Bias => 1,
    }
}

fn blob_proto(blob: &Blob) -> BlobProto {
    let mut shape = BlobShape::new();
    shape.dim = blob.shape().iter().map(|dim| *dim as i64).collect();

    let mut proto = BlobProto::new();
    proto.shape = MessageField::some(shape);
    proto.data = blob.data().to_vec();
    proto
}
