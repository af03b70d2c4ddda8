use std::process::ExitCode;

use caffe_import::cli;

/// Takes a cxxnet config, a cxxnet parameter dump and a Caffe prototxt, and writes a Caffe model.
fn main() -> ExitCode {
    match cli::run(std::env::args_os()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Conversion failed: {err}");
            eprintln!("cxx2caffe: {err}");
            ExitCode::FAILURE
        }
    }
}
