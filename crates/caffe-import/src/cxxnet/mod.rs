//! Reading cxxnet parameter dumps.
//!
//! The converter does not read cxxnet's native `.model` layout (the `NetConfig` binary
//! followed by each layer's untagged mshadow tensors). It reads a parameter dump instead: a
//! flat, self-describing file that carries the same network-type header and epoch counter,
//! then every layer's type tag, name and `wmat`/`bias` tensors with their shapes (see
//! [NetModel] for the byte layout). A dump is produced on the cxxnet side from a loaded
//! trainer, or with [NetModel::save].
//!
//! The network's structure comes from the config the model was trained with, see
//! [ConfigIterator]. The dump must agree with the layers that config declares.

mod config;
mod model;
mod net;
mod tensor;

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt};

pub use config::{read_config, ConfigEntry, ConfigIterator};
pub use model::{LayerRecord, NetModel};
pub use net::{LayerDecl, NetType, Network};
pub use tensor::{ParameterTensor, Role};

use model::ModelStream;

use crate::error::{Error, Result};

/// Size of the network-type header.
const NET_TYPE_SIZE: u64 = 4;

/// Loads a cxxnet network from its config and a parameter dump, and serves its named tensors.
#[derive(Debug)]
pub struct SourceModelReader {
    network: Network,
}

impl SourceModelReader {
    /// Read the config at `config_path`, then build the network described by the parameter dump
    /// at `model_path`.
    pub fn open(config_path: &Path, model_path: &Path) -> Result<Self> {
        log::info!("Reading cxxnet parameter dump {model_path:?} with config {config_path:?}");

        let entries = read_config(config_path)?;
        Self::from_entries(&entries, model_path)
    }

    /// Build the network described by the parameter dump at `model_path`, applying `entries`
    /// first.
    pub fn from_entries(entries: &[ConfigEntry], model_path: &Path) -> Result<Self> {
        let file = File::open(model_path).map_err(|err| Error::io(model_path, err))?;
        let len = file
            .metadata()
            .map_err(|err| Error::io(model_path, err))?
            .len();
        let mut reader = BufReader::new(file);

        let raw_type = reader
            .read_i32::<LittleEndian>()
            .map_err(|err| Error::CorruptModel {
                path: model_path.to_path_buf(),
                reason: format!("cannot read the network type: {err}"),
            })?;
        let net_type = NetType::try_from(raw_type)
            .map_err(|raw| Error::LoadError(format!("unknown network type {raw}")))?;

        let mut network = Network::new(net_type)?;
        for entry in entries {
            network.set_param(&entry.name, &entry.value)?;
        }

        let body = len.saturating_sub(NET_TYPE_SIZE);
        let mut stream = ModelStream::new(reader, body, PathBuf::from(model_path));
        network.load_model(&mut stream)?;

        log::debug!(
            "Loaded {} network with {} config entries, {} layers, device {}",
            network.net_type(),
            network.params().len(),
            network.model().layers.len(),
            network.device().unwrap_or("cpu")
        );
        Ok(Self { network })
    }

    /// Wrap an already loaded network.
    pub fn from_network(network: Network) -> Self {
        Self { network }
    }

    /// The `role` tensor of the layer named `layer`.
    pub fn tensor(&self, layer: &str, role: Role) -> Result<&ParameterTensor> {
        self.network.tensor(layer, role)
    }

    /// The underlying network.
    pub fn network(&self) -> &Network {
        &self.network
    }
}
