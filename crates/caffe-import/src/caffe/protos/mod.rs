include!(concat!(env!("OUT_DIR"), "/caffe-protos/mod.rs"));

pub use caffe::*;
