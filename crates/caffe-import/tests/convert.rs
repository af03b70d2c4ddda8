use std::{
    fs,
    path::{Path, PathBuf},
};

use caffe_import::{
    caffe::{protos::NetParameter, LayerKind},
    cli,
    cxxnet::{LayerRecord, NetModel, NetType, ParameterTensor, Role},
    transfer::{LayerOutcome, RowStride},
    Error, ModelConverter,
};
use pretty_assertions::assert_eq;
use protobuf::Message;
use tempfile::TempDir;

const CONFIG: &str = r#"
# small net used by the end-to-end tests
dev = cpu
netconfig = start
layer[0->1] = conv:conv1
  kernel_size = 2
  nchannel = 2
layer[1->1] = relu:relu1
layer[1->2] = fullc:fc1
  nhidden = 8
netconfig = end
input_shape = 2,3,3
"#;

const TOPOLOGY: &str = r#"
name: "small"
input: "data"
input_shape { dim: 1 dim: 2 dim: 3 dim: 3 }
layer {
  name: "conv1" type: "Convolution" bottom: "data" top: "conv1"
  convolution_param { num_output: 2 kernel_size: 2 }
}
layer { name: "relu1" type: "ReLU" bottom: "conv1" top: "conv1" }
layer {
  name: "fc1" type: "InnerProduct" bottom: "conv1" top: "fc1"
  inner_product_param { num_output: 8 }
}
layer {
  name: "loss" type: "SoftmaxWithLoss" bottom: "fc1" bottom: "label" top: "loss"
  include { phase: TRAIN }
}
"#;

fn range(from: usize, count: usize) -> Vec<f32> {
    (from..from + count).map(|v| v as f32).collect()
}

fn layer(type_tag: &str, name: &str, tensors: Vec<(Role, ParameterTensor)>) -> LayerRecord {
    LayerRecord::new(type_tag.into(), name.into(), tensors)
}

fn model(fc_weight: ParameterTensor) -> NetModel {
    NetModel::new(
        12,
        vec![
            layer(
                "conv",
                "conv1",
                vec![
                    (Role::Weight, ParameterTensor::new(vec![1, 2, 8], range(1, 16))),
                    (Role::Bias, ParameterTensor::new(vec![2], vec![0.25, -0.25])),
                ],
            ),
            layer("relu", "relu1", Vec::new()),
            layer(
                "fullc",
                "fc1",
                vec![
                    (Role::Weight, fc_weight),
                    (Role::Bias, ParameterTensor::new(vec![8], range(100, 8))),
                ],
            ),
        ],
    )
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(model: &NetModel) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("net.conf"), CONFIG).unwrap();
        fs::write(dir.path().join("net.prototxt"), TOPOLOGY).unwrap();
        model
            .save(NetType::ThreadedTrainer, &dir.path().join("net.model"))
            .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn converter(&self, output: &str) -> ModelConverter {
        let mut converter = ModelConverter::new();
        converter
            .source_config(self.path("net.conf"))
            .source_model(self.path("net.model"))
            .topology(self.path("net.prototxt"))
            .output(self.path(output));
        converter
    }
}

fn read_net(path: &Path) -> NetParameter {
    NetParameter::parse_from_bytes(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn converts_supported_layers() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 8], range(1, 64))));

    let report = fixture.converter("out.caffemodel").run().unwrap();

    assert_eq!(
        report.outcomes(),
        &[
            LayerOutcome::Skipped {
                layer: "input".into(),
                type_name: "Input".into()
            },
            LayerOutcome::Transferred {
                layer: "conv1".into(),
                kind: LayerKind::Convolution {
                    output_count: 2,
                    input_channels: 2,
                    kernel_height: 2,
                    kernel_width: 2
                }
            },
            LayerOutcome::Skipped {
                layer: "relu1".into(),
                type_name: "ReLU".into()
            },
            LayerOutcome::Transferred {
                layer: "fc1".into(),
                kind: LayerKind::FullyConnected {
                    output_count: 8,
                    input_count: 8
                }
            },
        ]
    );

    let net = read_net(&fixture.path("out.caffemodel"));
    let names: Vec<_> = net.layer.iter().map(|layer| layer.name()).collect();
    assert_eq!(names, vec!["input", "conv1", "relu1", "fc1"]);

    let conv = &net.layer[1];
    assert_eq!(conv.blobs[0].shape.get_or_default().dim, vec![2, 2, 2, 2]);
    assert_eq!(conv.blobs[0].data, range(1, 16));
    assert_eq!(conv.blobs[1].data, vec![0.25, -0.25]);

    let fc = &net.layer[3];
    assert_eq!(fc.blobs[0].shape.get_or_default().dim, vec![8, 8]);
    assert_eq!(fc.blobs[0].data, range(1, 64));
    assert_eq!(fc.blobs[1].data, range(100, 8));
    assert!(net.layer[2].blobs.is_empty());
}

#[test]
fn shape_mismatch_writes_nothing() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 7], range(1, 56))));

    let err = fixture.converter("out.caffemodel").run().unwrap_err();

    assert!(matches!(
        err,
        Error::ShapeMismatch { ref layer, role: Role::Weight, .. } if layer == "fc1"
    ));
    assert!(!fixture.path("out.caffemodel").exists());
}

#[test]
fn failed_run_keeps_the_previous_output() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 7], range(1, 56))));
    fs::write(fixture.path("out.caffemodel"), b"previous").unwrap();

    assert!(fixture.converter("out.caffemodel").run().is_err());

    assert_eq!(fs::read(fixture.path("out.caffemodel")).unwrap(), b"previous");
}

#[test]
fn runs_are_byte_identical() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 8], range(1, 64))));

    fixture.converter("first.caffemodel").run().unwrap();
    fixture.converter("second.caffemodel").run().unwrap();

    assert_eq!(
        fs::read(fixture.path("first.caffemodel")).unwrap(),
        fs::read(fixture.path("second.caffemodel")).unwrap()
    );
}

#[test]
fn input_count_stride_changes_nothing_for_square_layers() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 8], range(1, 64))));

    fixture.converter("default.caffemodel").run().unwrap();
    fixture
        .converter("row-major.caffemodel")
        .row_stride(RowStride::InputCount)
        .run()
        .unwrap();

    assert_eq!(
        fs::read(fixture.path("default.caffemodel")).unwrap(),
        fs::read(fixture.path("row-major.caffemodel")).unwrap()
    );
}

#[test]
fn model_must_match_the_config_structure() {
    let mut model = model(ParameterTensor::new(vec![8, 8], range(1, 64)));
    model.layers.remove(1);
    let fixture = Fixture::new(&model);

    let err = fixture.converter("out.caffemodel").run().unwrap_err();

    assert!(matches!(err, Error::LoadError(_)), "{err}");
    assert!(!fixture.path("out.caffemodel").exists());
}

#[test]
fn cli_converts_with_four_paths() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 8], range(1, 64))));
    let args = [
        PathBuf::from("cxx2caffe"),
        fixture.path("net.conf"),
        fixture.path("net.model"),
        fixture.path("net.prototxt"),
        fixture.path("cli.caffemodel"),
    ];

    let report = cli::run(args).unwrap().unwrap();

    assert_eq!(report.transferred().collect::<Vec<_>>(), vec!["conv1", "fc1"]);
    assert_eq!(read_net(&fixture.path("cli.caffemodel")).layer.len(), 4);
}

#[test]
fn cli_with_three_paths_leaves_the_output_untouched() {
    let fixture = Fixture::new(&model(ParameterTensor::new(vec![8, 8], range(1, 64))));
    fs::write(fixture.path("out.caffemodel"), b"untouched").unwrap();
    let args = [
        PathBuf::from("cxx2caffe"),
        fixture.path("net.conf"),
        fixture.path("net.model"),
        fixture.path("out.caffemodel"),
    ];

    assert!(cli::run(args).unwrap().is_none());

    assert_eq!(fs::read(fixture.path("out.caffemodel")).unwrap(), b"untouched");
}
