use std::{
    collections::HashSet,
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{NetType, ParameterTensor, Role};
use crate::error::{Error, Result};

/// One layer record of a cxxnet parameter dump.
#[derive(new, Debug, Clone, PartialEq)]
pub struct LayerRecord {
    /// cxxnet layer type tag, e.g. `fullc` or `conv`.
    pub type_tag: String,
    /// Layer name, empty for anonymous layers.
    pub name: String,
    /// Parameter tensors in file order.
    pub tensors: Vec<(Role, ParameterTensor)>,
}

impl LayerRecord {
    /// The tensor stored for `role`, if any.
    pub fn tensor(&self, role: Role) -> Option<&ParameterTensor> {
        self.tensors
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, tensor)| tensor)
    }
}

/// The parameters of a trained cxxnet network, as stored in a parameter dump.
///
/// Everything is little-endian and strings are a `u64` byte length followed by UTF-8:
///
/// ```text
/// i32 net_type
/// u64 epoch_counter
/// u32 layer_count
/// per layer:  str type_tag, str name, u32 tensor_count
/// per tensor: str role ("wmat" | "bias"), u32 ndim, u32 dims[ndim], f32 data[product(dims)]
/// ```
#[derive(new, Debug, Clone, Default, PartialEq)]
pub struct NetModel {
    /// Number of epochs the network was trained for.
    pub epoch_counter: u64,
    /// Layers in network order.
    pub layers: Vec<LayerRecord>,
}

impl NetModel {
    /// Decode the model body, everything after the network-type header.
    pub(crate) fn read<R: Read>(stream: &mut ModelStream<R>) -> Result<Self> {
        let epoch_counter = stream.read_u64("epoch counter")?;
        let layer_count = stream.read_u32("layer count")?;

        let mut layers = Vec::new();
        for index in 0..layer_count {
            layers.push(read_layer(stream, index)?);
        }

        if stream.remaining > 0 {
            return Err(Error::LoadError(format!(
                "{} trailing bytes after the last layer",
                stream.remaining
            )));
        }

        Ok(Self::new(epoch_counter, layers))
    }

    /// Encode the model, header included, as a parameter dump.
    pub fn write_to<W: Write>(&self, net_type: NetType, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(net_type as i32)?;
        writer.write_u64::<LittleEndian>(self.epoch_counter)?;
        writer.write_u32::<LittleEndian>(self.layers.len() as u32)?;

        for layer in self.layers.iter() {
            write_string(writer, &layer.type_tag)?;
            write_string(writer, &layer.name)?;
            writer.write_u32::<LittleEndian>(layer.tensors.len() as u32)?;

            for (role, tensor) in layer.tensors.iter() {
                write_string(writer, role.tag())?;
                writer.write_u32::<LittleEndian>(tensor.shape().len() as u32)?;
                for dim in tensor.shape() {
                    writer.write_u32::<LittleEndian>(*dim as u32)?;
                }
                for value in tensor.data() {
                    writer.write_f32::<LittleEndian>(*value)?;
                }
            }
        }

        Ok(())
    }

    /// Save the model to `path`.
    pub fn save(&self, net_type: NetType, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|err| Error::io(path, err))?;
        let mut writer = BufWriter::new(file);

        self.write_to(net_type, &mut writer)
            .and_then(|_| writer.flush())
            .map_err(|err| Error::io(path, err))
    }
}

fn read_layer<R: Read>(stream: &mut ModelStream<R>, index: u32) -> Result<LayerRecord> {
    let type_tag = stream.read_string("layer type")?;
    let name = stream.read_string("layer name")?;
    let tensor_count = stream.read_u32("tensor count")?;

    let mut roles = HashSet::new();
    let mut tensors = Vec::new();

    for _ in 0..tensor_count {
        let tag = stream.read_string("tensor role")?;
        let role = Role::from_tag(&tag).ok_or_else(|| {
            Error::LoadError(format!("layer {index} (`{name}`): unknown tensor role `{tag}`"))
        })?;

        if !roles.insert(role) {
            return Err(Error::LoadError(format!(
                "layer {index} (`{name}`): duplicate {role} tensor"
            )));
        }

        let ndim = stream.read_u32("tensor rank")? as usize;
        if ndim == 0 {
            return Err(Error::LoadError(format!(
                "layer {index} (`{name}`): {role} tensor has no dimensions"
            )));
        }

        let mut shape = Vec::with_capacity(ndim);
        for _ in 0..ndim {
            shape.push(stream.read_u32("tensor dimension")? as usize);
        }
        if shape.contains(&0) {
            return Err(Error::LoadError(format!(
                "layer {index} (`{name}`): {role} tensor has an empty dimension {shape:?}"
            )));
        }

        let count = shape
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
            .ok_or_else(|| {
                Error::LoadError(format!(
                    "layer {index} (`{name}`): {role} tensor shape {shape:?} is too large"
                ))
            })?;
        let data = stream.read_f32s(count, "tensor data")?;

        tensors.push((role, ParameterTensor::new(shape, data)));
    }

    log::debug!(
        "Read layer {index} `{name}` ({type_tag}) with {} tensors",
        tensors.len()
    );

    Ok(LayerRecord::new(type_tag, name, tensors))
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> io::Result<()> {
    writer.write_u64::<LittleEndian>(value.len() as u64)?;
    writer.write_all(value.as_bytes())
}

/// Bounded reader over the body of a parameter dump.
///
/// Tracks how many bytes are left so that size fields are checked before anything is
/// allocated for them.
pub(crate) struct ModelStream<R> {
    inner: R,
    remaining: u64,
    path: PathBuf,
}

impl<R: Read> ModelStream<R> {
    pub(crate) fn new(inner: R, remaining: u64, path: PathBuf) -> Self {
        Self {
            inner,
            remaining,
            path,
        }
    }

    fn reserve(&mut self, bytes: u64, what: &str) -> Result<()> {
        if bytes > self.remaining {
            return Err(Error::LoadError(format!(
                "unexpected end of file while reading {what}: {bytes} bytes needed, {} left",
                self.remaining
            )));
        }
        self.remaining -= bytes;
        Ok(())
    }

    fn map_io(&self, err: io::Error, what: &str) -> Error {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => {
                Error::LoadError(format!("unexpected end of file while reading {what}"))
            }
            _ => Error::io(&self.path, err),
        }
    }

    fn read_u32(&mut self, what: &str) -> Result<u32> {
        self.reserve(4, what)?;
        self.inner
            .read_u32::<LittleEndian>()
            .map_err(|err| self.map_io(err, what))
    }

    fn read_u64(&mut self, what: &str) -> Result<u64> {
        self.reserve(8, what)?;
        self.inner
            .read_u64::<LittleEndian>()
            .map_err(|err| self.map_io(err, what))
    }

    fn read_string(&mut self, what: &str) -> Result<String> {
        let len = self.read_u64(what)?;
        self.reserve(len, what)?;

        let mut bytes = vec![0; len as usize];
        self.inner
            .read_exact(&mut bytes)
            .map_err(|err| self.map_io(err, what))?;

        String::from_utf8(bytes)
            .map_err(|_| Error::LoadError(format!("{what} is not valid UTF-8")))
    }

    fn read_f32s(&mut self, count: usize, what: &str) -> Result<Vec<f32>> {
        let bytes = (count as u64).checked_mul(4).ok_or_else(|| {
            Error::LoadError(format!("{what}: {count} elements do not fit in a file"))
        })?;
        self.reserve(bytes, what)?;

        let mut data = vec![0.0; count];
        self.inner
            .read_f32_into::<LittleEndian>(&mut data)
            .map_err(|err| self.map_io(err, what))?;
        Ok(data)
    }
}
