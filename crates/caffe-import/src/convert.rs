use std::path::{Path, PathBuf};

use crate::{
    caffe::{DestinationTopology, ModelWriter, Phase, TopologyConfig},
    cxxnet::SourceModelReader,
    error::{Error, Result},
    transfer::{RowStride, TransferConfig, TransferEngine, TransferReport},
};

/// Converts the parameters of a trained cxxnet network into a Caffe model.
///
/// # Example
///
/// ```no_run
/// use caffe_import::ModelConverter;
///
/// let report = ModelConverter::new()
///     .source_config("mnist.conf")
///     .source_model("0010.cxxdump")
///     .topology("lenet.prototxt")
///     .output("lenet.caffemodel")
///     .run()?;
///
/// for outcome in report.outcomes() {
///     println!("{outcome}");
/// }
/// # Ok::<(), caffe_import::Error>(())
/// ```
#[derive(Debug, Default, Clone)]
pub struct ModelConverter {
    source_config: Option<PathBuf>,
    source_model: Option<PathBuf>,
    topology: Option<PathBuf>,
    output: Option<PathBuf>,
    transfer: TransferConfig,
    topology_config: TopologyConfig,
}

impl ModelConverter {
    /// Create a new `ModelConverter`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cxxnet config the model was trained with.
    pub fn source_config(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.source_config = Some(path.as_ref().into());
        self
    }

    /// Set the parameter dump of the trained cxxnet network.
    pub fn source_model(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.source_model = Some(path.as_ref().into());
        self
    }

    /// Set the Caffe `.prototxt` describing the destination network.
    pub fn topology(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.topology = Some(path.as_ref().into());
        self
    }

    /// Set the `.caffemodel` file to write.
    pub fn output(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.output = Some(path.as_ref().into());
        self
    }

    /// Set the row stride used for fully-connected weights.
    pub fn row_stride(&mut self, row_stride: RowStride) -> &mut Self {
        self.transfer.row_stride = row_stride;
        self
    }

    /// Set the phase used to select the destination layers.
    pub fn phase(&mut self, phase: Phase) -> &mut Self {
        self.topology_config.phase = phase;
        self
    }

    /// Run the conversion.
    ///
    /// The output file is only written once every layer has been transferred.
    pub fn run(&self) -> Result<TransferReport> {
        let source_config = required(&self.source_config, "source config")?;
        let source_model = required(&self.source_model, "source model")?;
        let topology_path = required(&self.topology, "topology")?;
        let output = required(&self.output, "output")?;

        log::info!("Starting to convert cxxnet to Caffe");
        log::debug!("Options: {:?} {:?}", self.transfer, self.topology_config);

        let source = SourceModelReader::open(source_config, source_model)?;
        let mut topology = DestinationTopology::load(topology_path, self.topology_config)?;

        let report = TransferEngine::new(self.transfer).run(&source, &mut topology)?;
        ModelWriter.write(&topology, output)?;

        log::info!(
            "Finished converting: {} layers transferred, {} skipped",
            report.transferred().count(),
            report.skipped().count()
        );
        Ok(report)
    }
}

fn required<'a>(path: &'a Option<PathBuf>, what: &'static str) -> Result<&'a Path> {
    path.as_deref().ok_or(Error::MissingPath(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_path_is_required() {
        let err = ModelConverter::new()
            .source_config("a.conf")
            .source_model("a.cxxdump")
            .output("a.caffemodel")
            .run()
            .unwrap_err();

        assert!(matches!(err, Error::MissingPath("topology")));
    }

    #[test]
    fn options_reach_the_configs() {
        let mut converter = ModelConverter::new();
        converter
            .row_stride(RowStride::InputCount)
            .phase(Phase::Train);

        assert_eq!(converter.transfer.row_stride, RowStride::InputCount);
        assert_eq!(converter.topology_config.phase, Phase::Train);
    }
}
