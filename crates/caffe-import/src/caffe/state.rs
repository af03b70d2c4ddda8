use clap::ValueEnum;
use protobuf::MessageField;
use strum_macros::Display;

use super::protos::{self, BlobShape, InputParameter, LayerParameter, NetParameter, NetStateRule};
use crate::error::{Error, Result};

/// Network phase used to select layers through `include`/`exclude` rules.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum Phase {
    /// Training phase.
    #[strum(serialize = "TRAIN")]
    Train,
    /// Inference phase.
    #[default]
    #[strum(serialize = "TEST")]
    Test,
}

impl Phase {
    pub(crate) fn to_proto(self) -> protos::Phase {
        match self {
            Phase::Train => protos::Phase::TRAIN,
            Phase::Test => protos::Phase::TEST,
        }
    }
}

/// Where destination parameters live while the net is built.
///
/// The converter only ever fills host buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[non_exhaustive]
pub enum Device {
    /// Host memory.
    #[default]
    #[strum(serialize = "cpu")]
    Cpu,
}

/// Options used to build a destination topology.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyConfig {
    /// Phase used to filter layers.
    pub phase: Phase,
    /// Device the parameters are materialized on.
    pub device: Device,
}

impl TopologyConfig {
    /// Set the phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }
}

/// The part of Caffe's `NetState` used for layer filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NetState {
    phase: protos::Phase,
    level: i32,
    stages: Vec<String>,
}

impl NetState {
    fn meets_rule(&self, rule: &NetStateRule) -> bool {
        if rule.has_phase() && rule.phase() != self.phase {
            return false;
        }
        if rule.has_min_level() && self.level < rule.min_level() {
            return false;
        }
        if rule.has_max_level() && self.level > rule.max_level() {
            return false;
        }
        if rule.stage.iter().any(|stage| !self.stages.contains(stage)) {
            return false;
        }
        if rule.not_stage.iter().any(|stage| self.stages.contains(stage)) {
            return false;
        }
        true
    }
}

/// Drop the layers whose `include`/`exclude` rules reject `phase`.
///
/// The level is fixed at 0 and the stages come from the net's own `state`, the way Caffe builds
/// a net from a file for a given phase.
pub(crate) fn filter_net(net: &mut NetParameter, phase: Phase) -> Result<()> {
    let state = NetState {
        phase: phase.to_proto(),
        level: 0,
        stages: net
            .state
            .as_ref()
            .map(|state| state.stage.clone())
            .unwrap_or_default(),
    };

    let mut kept = Vec::with_capacity(net.layer.len());
    for layer in net.layer.drain(..) {
        if !layer.include.is_empty() && !layer.exclude.is_empty() {
            return Err(Error::Topology(format!(
                "layer `{}` specifies both include and exclude rules",
                layer.name()
            )));
        }

        let mut included = layer.include.is_empty();
        if layer.exclude.iter().any(|rule| state.meets_rule(rule)) {
            included = false;
        }
        if layer.include.iter().any(|rule| state.meets_rule(rule)) {
            included = true;
        }

        if included {
            kept.push(layer);
        } else {
            log::debug!("Layer `{}` is not part of the {phase} net", layer.name());
        }
    }
    net.layer = kept;

    Ok(())
}

/// Replace deprecated net-level `input` declarations by a leading `Input` layer.
pub(crate) fn upgrade_net_input(net: &mut NetParameter) -> Result<()> {
    if net.input.is_empty() {
        return Ok(());
    }

    let has_dims = !net.input_dim.is_empty();
    let has_shapes = !net.input_shape.is_empty();

    if has_dims && has_shapes {
        return Err(Error::Topology(
            "both input_dim and input_shape are given for the net inputs".to_string(),
        ));
    }
    if has_dims && net.input_dim.len() != 4 * net.input.len() {
        return Err(Error::Topology(format!(
            "{} input_dim values for {} inputs, expected 4 per input",
            net.input_dim.len(),
            net.input.len()
        )));
    }
    if !has_dims && net.input_shape.len() != net.input.len() {
        return Err(Error::Topology(format!(
            "{} input_shape entries for {} inputs",
            net.input_shape.len(),
            net.input.len()
        )));
    }

    let shapes = if has_dims {
        net.input_dim
            .chunks(4)
            .map(|dims| {
                let mut shape = BlobShape::new();
                shape.dim = dims.iter().map(|dim| *dim as i64).collect();
                shape
            })
            .collect()
    } else {
        std::mem::take(&mut net.input_shape)
    };

    let mut input_param = InputParameter::new();
    input_param.shape = shapes;

    let mut layer = LayerParameter::new();
    layer.name = Some("input".to_string());
    layer.type_ = Some("Input".to_string());
    layer.top = std::mem::take(&mut net.input);
    layer.input_param = MessageField::some(input_param);

    net.input_dim.clear();
    net.input_shape.clear();
    net.layer.insert(0, layer);

    log::debug!("Upgraded net inputs into an `Input` layer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobuf::text_format;

    fn parse(text: &str) -> NetParameter {
        text_format::parse_from_str(text).unwrap()
    }

    fn names(net: &NetParameter) -> Vec<&str> {
        net.layer.iter().map(|layer| layer.name()).collect()
    }

    const PHASED: &str = r#"
        name: "phased"
        layer { name: "train_data" type: "Data" top: "data" include { phase: TRAIN } }
        layer { name: "test_data" type: "Data" top: "data" include { phase: TEST } }
        layer { name: "ip" type: "InnerProduct" bottom: "data" top: "ip" }
        layer { name: "loss" type: "SoftmaxWithLoss" bottom: "ip" top: "loss" exclude { phase: TEST } }
        layer { name: "deploy_only" type: "Softmax" bottom: "ip" top: "prob" include { stage: "deploy" } }
    "#;

    #[test]
    fn keeps_test_phase_layers() {
        let mut net = parse(PHASED);
        filter_net(&mut net, Phase::Test).unwrap();

        assert_eq!(names(&net), vec!["test_data", "ip"]);
    }

    #[test]
    fn keeps_train_phase_layers() {
        let mut net = parse(PHASED);
        filter_net(&mut net, Phase::Train).unwrap();

        assert_eq!(names(&net), vec!["train_data", "ip", "loss"]);
    }

    #[test]
    fn stages_come_from_the_net_state() {
        let mut net = parse(&format!("state {{ stage: \"deploy\" }}\n{PHASED}"));
        filter_net(&mut net, Phase::Test).unwrap();

        assert_eq!(names(&net), vec!["test_data", "ip", "deploy_only"]);
    }

    #[test]
    fn include_and_exclude_together_is_an_error() {
        let mut net = parse(
            r#"layer { name: "x" type: "ReLU" include { phase: TEST } exclude { phase: TRAIN } }"#,
        );

        assert!(matches!(
            filter_net(&mut net, Phase::Test),
            Err(Error::Topology(_))
        ));
    }

    #[test]
    fn upgrades_input_dim() {
        let mut net = parse(
            r#"
            input: "data"
            input_dim: 1 input_dim: 3 input_dim: 32 input_dim: 32
            layer { name: "conv" type: "Convolution" bottom: "data" top: "conv" }
            "#,
        );
        upgrade_net_input(&mut net).unwrap();

        assert_eq!(names(&net), vec!["input", "conv"]);
        let input = &net.layer[0];
        assert_eq!(input.type_(), "Input");
        assert_eq!(input.top, vec!["data".to_string()]);
        assert_eq!(input.input_param.get_or_default().shape[0].dim, vec![1, 3, 32, 32]);
        assert!(net.input.is_empty() && net.input_dim.is_empty());
    }

    #[test]
    fn upgrades_input_shape() {
        let mut net = parse(
            r#"
            input: "a" input_shape { dim: 2 dim: 4 }
            input: "b" input_shape { dim: 2 }
            "#,
        );
        upgrade_net_input(&mut net).unwrap();

        let shapes = &net.layer[0].input_param.get_or_default().shape;
        assert_eq!(shapes.len(), 2);
        assert_eq!(shapes[1].dim, vec![2]);
    }

    #[test]
    fn rejects_incomplete_input_dims() {
        let mut net = parse(r#"input: "data" input_dim: 1 input_dim: 3"#);

        assert!(matches!(
            upgrade_net_input(&mut net),
            Err(Error::Topology(_))
        ));
    }
}
