//! Command line front end of the `cxx2caffe` binary.

use std::{ffi::OsString, path::PathBuf};

use clap::{error::ErrorKind, CommandFactory, Parser};
use log::LevelFilter;

use crate::{
    caffe::Phase,
    convert::ModelConverter,
    error::Result,
    logger::init_log,
    transfer::{RowStride, TransferReport},
};

/// Convert the parameters of a trained cxxnet network into a Caffe model.
#[derive(Parser, Debug)]
#[command(name = "cxx2caffe", version, about, long_about = None)]
struct Args {
    /// cxxnet config the model was trained with
    source_config: PathBuf,

    /// Parameter dump of the trained cxxnet network
    source_model: PathBuf,

    /// Caffe prototxt describing the destination network
    topology: PathBuf,

    /// Caffe model to write
    output: PathBuf,

    /// Row stride of fully-connected weights
    #[arg(long, value_enum, default_value_t = RowStride::OutputCount)]
    fc_row_stride: RowStride,

    /// Phase used to select the destination layers
    #[arg(long, value_enum, default_value_t = Phase::Test)]
    phase: Phase,

    /// Log debug details
    #[arg(short, long)]
    verbose: bool,
}

/// Parse `args` (program name first) and run the conversion.
///
/// Arguments that do not parse, including a wrong number of paths, print the usage to stdout
/// and return `Ok(None)` without touching any file. `--help` and `--version` do the same with
/// their own text.
pub fn run<I, T>(args: I) -> Result<Option<TransferReport>>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(err) => {
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    err.print().ok();
                }
                _ => println!("{}", Args::command().render_usage()),
            }
            return Ok(None);
        }
    };

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    init_log(level).ok(); // Error when init multiple times are ignored.

    ModelConverter::new()
        .source_config(&args.source_config)
        .source_model(&args.source_model)
        .topology(&args.topology)
        .output(&args.output)
        .row_stride(args.fc_row_stride)
        .phase(args.phase)
        .run()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positionals_and_flags() {
        let args = Args::try_parse_from([
            "cxx2caffe",
            "net.conf",
            "net.cxxdump",
            "net.prototxt",
            "net.caffemodel",
            "--fc-row-stride",
            "input-count",
            "--phase",
            "train",
            "-v",
        ])
        .unwrap();

        assert_eq!(args.topology, PathBuf::from("net.prototxt"));
        assert_eq!(args.fc_row_stride, RowStride::InputCount);
        assert_eq!(args.phase, Phase::Train);
        assert!(args.verbose);
    }

    #[test]
    fn defaults_to_output_count_stride_and_test_phase() {
        let args = Args::try_parse_from(["cxx2caffe", "a", "b", "c", "d"]).unwrap();

        assert_eq!(args.fc_row_stride, RowStride::OutputCount);
        assert_eq!(args.phase, Phase::Test);
    }

    #[test]
    fn row_stride_values_come_from_the_library_enum() {
        let help = Args::command().render_long_help().to_string();

        assert!(help.contains("output-count"), "{help}");
        assert!(help.contains("input-count"), "{help}");
        assert!(Args::try_parse_from([
            "cxx2caffe",
            "a",
            "b",
            "c",
            "d",
            "--fc-row-stride",
            "rows"
        ])
        .is_err());
    }

    #[test]
    fn wrong_argument_counts_are_a_no_op() {
        assert!(run(["cxx2caffe", "a", "b", "c"]).unwrap().is_none());
        assert!(run(["cxx2caffe", "a", "b", "c", "d", "e"]).unwrap().is_none());
        assert!(run(["cxx2caffe"]).unwrap().is_none());
    }

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }
}
