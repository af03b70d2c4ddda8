use std::{collections::HashMap, io::Read};

use regex::Regex;
use strum_macros::Display;

use super::{
    model::{ModelStream, NetModel},
    ParameterTensor, Role,
};
use crate::error::{Error, Result};

/// Network implementation variant, selected by the leading integer of a parameter dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(i32)]
pub enum NetType {
    /// The multi-threaded trainer, the only implementation cxxnet writes models for.
    #[strum(serialize = "threaded trainer")]
    ThreadedTrainer = 0,
}

impl TryFrom<i32> for NetType {
    type Error = i32;

    fn try_from(value: i32) -> core::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ThreadedTrainer),
            other => Err(other),
        }
    }
}

/// A layer declared in the `netconfig` section of a config.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct LayerDecl {
    /// The connection inside the brackets, e.g. `0->1` or `+1`.
    pub connection: String,
    /// cxxnet layer type tag.
    pub type_tag: String,
    /// Optional layer name given after `:`.
    pub name: Option<String>,
}

/// A cxxnet network: its configuration and, once loaded, its parameters.
#[derive(Debug)]
pub struct Network {
    net_type: NetType,
    params: Vec<(String, String)>,
    declared: Vec<LayerDecl>,
    device: Option<String>,
    in_netconfig: bool,
    layer_key: Regex,
    layer_value: Regex,
    model: NetModel,
    index: HashMap<String, usize>,
}

impl Network {
    /// Create an empty network of the given type.
    pub fn new(net_type: NetType) -> Result<Self> {
        let regex = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| Error::LoadError(format!("invalid pattern {pattern}: {err}")))
        };

        Ok(Self {
            net_type,
            params: Vec::new(),
            declared: Vec::new(),
            device: None,
            in_netconfig: false,
            layer_key: regex(r"^layer\[([^\]]+)\]$")?,
            layer_value: regex(r"^([A-Za-z_][A-Za-z0-9_]*)(?::(\S+))?$")?,
            model: NetModel::default(),
            index: HashMap::new(),
        })
    }

    /// The network implementation variant.
    pub fn net_type(&self) -> NetType {
        self.net_type
    }

    /// Apply one config entry.
    ///
    /// Every entry is kept in order. Inside `netconfig = start` / `netconfig = end`, entries
    /// named `layer[..]` declare the layer structure the loaded model must have.
    pub fn set_param(&mut self, name: &str, value: &str) -> Result<()> {
        self.params.push((name.to_string(), value.to_string()));

        if name == "netconfig" {
            match value {
                "start" => self.in_netconfig = true,
                "end" => self.in_netconfig = false,
                _ => log::warn!("Ignoring unknown netconfig value `{value}`"),
            }
            return Ok(());
        }

        if self.in_netconfig {
            if let Some(captures) = self.layer_key.captures(name) {
                let decl = self.parse_layer_decl(&captures[1], name, value)?;
                self.declared.push(decl);
            }
        } else if name == "dev" {
            if !value.starts_with("cpu") {
                log::warn!("Config requests device `{value}`, parameters are read on the cpu");
            }
            self.device = Some(value.to_string());
        }

        Ok(())
    }

    fn parse_layer_decl(&self, connection: &str, name: &str, value: &str) -> Result<LayerDecl> {
        let captures = self.layer_value.captures(value).ok_or_else(|| {
            Error::LoadError(format!("invalid layer declaration `{name} = {value}`"))
        })?;

        Ok(LayerDecl::new(
            connection.to_string(),
            captures[1].to_string(),
            captures.get(2).map(|m| m.as_str().to_string()),
        ))
    }

    /// Every applied config entry, in order.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Layers declared by the config.
    pub fn declared_layers(&self) -> &[LayerDecl] {
        &self.declared
    }

    /// The device requested by the config, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Decode the model body into this network.
    pub(crate) fn load_model<R: Read>(&mut self, stream: &mut ModelStream<R>) -> Result<()> {
        let model = NetModel::read(stream)?;
        self.set_model(model)
    }

    /// Install already decoded parameters.
    pub fn set_model(&mut self, model: NetModel) -> Result<()> {
        self.check_declared_layers(&model)?;

        let mut index = HashMap::new();
        for (position, layer) in model.layers.iter().enumerate() {
            if layer.name.is_empty() {
                continue;
            }
            if index.insert(layer.name.clone(), position).is_some() {
                return Err(Error::LoadError(format!(
                    "duplicate layer name `{}`",
                    layer.name
                )));
            }
        }

        log::info!(
            "Loaded {} network: {} layers, {} epochs",
            self.net_type,
            model.layers.len(),
            model.epoch_counter
        );

        self.model = model;
        self.index = index;
        Ok(())
    }

    fn check_declared_layers(&self, model: &NetModel) -> Result<()> {
        if self.declared.is_empty() {
            return Ok(());
        }

        if self.declared.len() != model.layers.len() {
            return Err(Error::LoadError(format!(
                "config declares {} layers but the model has {}",
                self.declared.len(),
                model.layers.len()
            )));
        }

        for (position, (decl, layer)) in self.declared.iter().zip(model.layers.iter()).enumerate()
        {
            if decl.type_tag != layer.type_tag {
                return Err(Error::LoadError(format!(
                    "layer {position}: config declares `{}` but the model stores `{}`",
                    decl.type_tag, layer.type_tag
                )));
            }
            if let Some(name) = &decl.name {
                if *name != layer.name {
                    return Err(Error::LoadError(format!(
                        "layer {position}: config names it `{name}` but the model names it `{}`",
                        layer.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// The loaded parameters.
    pub fn model(&self) -> &NetModel {
        &self.model
    }

    /// The `role` tensor of the layer named `layer`.
    pub fn tensor(&self, layer: &str, role: Role) -> Result<&ParameterTensor> {
        self.index
            .get(layer)
            .and_then(|position| self.model.layers[*position].tensor(role))
            .ok_or_else(|| Error::UnknownLayer {
                layer: layer.to_string(),
                role,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cxxnet::LayerRecord;

    fn fullc(name: &str) -> LayerRecord {
        LayerRecord::new(
            "fullc".into(),
            name.into(),
            vec![
                (Role::Weight, ParameterTensor::new(vec![1, 2], vec![1.0, 2.0])),
                (Role::Bias, ParameterTensor::new(vec![1], vec![3.0])),
            ],
        )
    }

    fn network(params: &[(&str, &str)]) -> Network {
        let mut net = Network::new(NetType::ThreadedTrainer).unwrap();
        for (name, value) in params {
            net.set_param(name, value).unwrap();
        }
        net
    }

    #[test]
    fn unknown_net_type_is_reported() {
        assert_eq!(NetType::try_from(0), Ok(NetType::ThreadedTrainer));
        assert_eq!(NetType::try_from(3), Err(3));
    }

    #[test]
    fn collects_layer_declarations_inside_netconfig() {
        let net = network(&[
            ("dev", "cpu"),
            ("layer[0->1]", "fullc:outside"),
            ("netconfig", "start"),
            ("layer[0->1]", "fullc:fc1"),
            ("nhidden", "10"),
            ("layer[+1]", "relu"),
            ("netconfig", "end"),
        ]);

        assert_eq!(
            net.declared_layers(),
            &[
                LayerDecl::new("0->1".into(), "fullc".into(), Some("fc1".into())),
                LayerDecl::new("+1".into(), "relu".into(), None),
            ]
        );
        assert_eq!(net.params().len(), 7);
        assert_eq!(net.device(), Some("cpu"));
    }

    #[test]
    fn malformed_layer_declaration_is_a_load_error() {
        let mut net = network(&[("netconfig", "start")]);

        let result = net.set_param("layer[0->1]", "full c");
        assert!(matches!(result, Err(Error::LoadError(_))));
    }

    #[test]
    fn looks_up_tensors_by_layer_and_role() {
        let mut net = network(&[]);
        net.set_model(NetModel::new(1, vec![fullc("fc1")])).unwrap();

        assert_eq!(net.tensor("fc1", Role::Bias).unwrap().data(), &[3.0]);
        assert!(matches!(
            net.tensor("fc2", Role::Weight),
            Err(Error::UnknownLayer { role: Role::Weight, .. })
        ));
    }

    #[test]
    fn missing_role_is_an_unknown_layer() {
        let mut net = network(&[]);
        let mut layer = fullc("fc1");
        layer.tensors.truncate(1);
        net.set_model(NetModel::new(1, vec![layer])).unwrap();

        assert!(matches!(
            net.tensor("fc1", Role::Bias),
            Err(Error::UnknownLayer { role: Role::Bias, .. })
        ));
    }

    #[test]
    fn model_must_match_declared_structure() {
        let mut net = network(&[
            ("netconfig", "start"),
            ("layer[0->1]", "conv:fc1"),
            ("netconfig", "end"),
        ]);

        let err = net
            .set_model(NetModel::new(1, vec![fullc("fc1")]))
            .unwrap_err();
        assert!(err.to_string().contains("declares `conv`"), "{err}");
    }

    #[test]
    fn duplicate_layer_names_are_rejected() {
        let mut net = network(&[]);

        let result = net.set_model(NetModel::new(1, vec![fullc("fc"), fullc("fc")]));
        assert!(matches!(result, Err(Error::LoadError(_))));
    }
}
