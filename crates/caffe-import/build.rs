fn main() {
    // Generate the caffe protobuf files
    protobuf_codegen::Codegen::new()
        .pure()
        .includes(["src"])
        .input("src/caffe/protos/caffe.proto")
        .cargo_out_dir("caffe-protos")
        .run_from_script();
}
