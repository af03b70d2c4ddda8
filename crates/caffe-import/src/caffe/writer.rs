use std::{
    io::{self, Write},
    path::Path,
};

use protobuf::Message;
use tempfile::NamedTempFile;

use super::DestinationTopology;
use crate::error::{Error, Result};

/// Serializes a populated [DestinationTopology] to Caffe's binary `.caffemodel` format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelWriter;

impl ModelWriter {
    /// Write the net to `path`.
    ///
    /// The bytes go to a temporary file next to `path` that is renamed over it once complete,
    /// so `path` either keeps its previous content or holds the whole new model.
    pub fn write(&self, topology: &DestinationTopology, path: &Path) -> Result<()> {
        let bytes = topology
            .to_proto()
            .write_to_bytes()
            .map_err(|err| Error::io(path, io::Error::other(err)))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(|err| Error::io(dir, err))?;
        file.write_all(&bytes)
            .and_then(|_| file.as_file().sync_all())
            .map_err(|err| Error::io(file.path(), err))?;
        file.persist(path)
            .map_err(|err| Error::io(path, err.error))?;

        log::info!(
            "Wrote {} bytes for {} net `{}` to {path:?}",
            bytes.len(),
            topology.config().phase,
            topology.name()
        );
        Ok(())
    }
}
