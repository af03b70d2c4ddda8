use super::{
    layer::{LayerKind, LayerType},
    protos::{BlobShape, ConvolutionParameter, LayerParameter},
};
use crate::error::{Error, Result};

pub(crate) type Shape = Vec<usize>;

/// Output shapes, parameter blob shapes and transfer kind of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InferredLayer {
    /// One entry per top, `None` when the shape depends on data the net does not describe.
    pub tops: Vec<Option<Shape>>,
    /// Shapes of the layer's parameter blobs, in Caffe's blob order.
    pub blobs: Vec<Shape>,
    pub kind: LayerKind,
}

impl InferredLayer {
    fn passthrough(layer: &LayerParameter, shape: Option<Shape>) -> Self {
        Self {
            tops: vec![shape; layer.top.len()],
            blobs: Vec::new(),
            kind: LayerKind::Unsupported,
        }
    }

    fn with_blobs(mut self, blobs: Vec<Shape>) -> Self {
        self.blobs = blobs;
        self
    }
}

/// Infer the top shapes and parameter shapes of `layer` from its bottom shapes.
///
/// Every inferred shape holds a number of elements that fits in `usize`, so blobs can be
/// allocated from them directly.
pub(crate) fn infer_layer(layer: &LayerParameter, bottoms: &[Option<Shape>]) -> Result<InferredLayer> {
    let inferred = infer_shapes(layer, bottoms)?;

    for shape in inferred.tops.iter().flatten().chain(inferred.blobs.iter()) {
        element_count(layer, shape)?;
    }
    Ok(inferred)
}

fn infer_shapes(layer: &LayerParameter, bottoms: &[Option<Shape>]) -> Result<InferredLayer> {
    let first = bottoms.first().cloned().flatten();

    let Some(layer_type) = LayerType::parse(layer.type_()) else {
        if layer.type_().ends_with("Loss") {
            return Ok(scalar_tops(layer));
        }
        return Ok(InferredLayer::passthrough(layer, first));
    };

    match layer_type {
        LayerType::Input => input_shapes(layer),
        LayerType::MemoryData => Ok(memory_data_shapes(layer)),
        LayerType::DummyData => dummy_data_shapes(layer),
        LayerType::Convolution => convolution_shapes(layer, bottoms),
        LayerType::Pooling => pooling_shapes(layer, &require_bottom(layer, bottoms, 0)?),
        LayerType::InnerProduct => inner_product_shapes(layer, &require_bottom(layer, bottoms, 0)?),
        LayerType::Flatten => flatten_shapes(layer, &require_bottom(layer, bottoms, 0)?),
        LayerType::Reshape => reshape_shapes(layer, &require_bottom(layer, bottoms, 0)?),
        LayerType::Concat => concat_shapes(layer, bottoms),
        LayerType::Eltwise => eltwise_shapes(layer, bottoms),
        LayerType::BatchNorm => {
            let bottom = require_bottom(layer, bottoms, 0)?;
            let channels = bottom.get(1).copied().unwrap_or(1);
            Ok(InferredLayer::passthrough(layer, Some(bottom))
                .with_blobs(vec![vec![channels], vec![channels], vec![1]]))
        }
        LayerType::Scale => {
            let bottom = require_bottom(layer, bottoms, 0)?;
            let param = layer.scale_param.get_or_default();
            let slice = axis_slice(layer, &bottom, param.axis(), param.num_axes())?;

            let mut blobs = Vec::new();
            if bottoms.len() == 1 {
                blobs.push(slice.clone());
            }
            if param.bias_term() {
                blobs.push(slice);
            }
            Ok(InferredLayer::passthrough(layer, Some(bottom)).with_blobs(blobs))
        }
        LayerType::Bias => {
            let bottom = require_bottom(layer, bottoms, 0)?;
            let param = layer.bias_param.get_or_default();

            let mut blobs = Vec::new();
            if bottoms.len() == 1 {
                blobs.push(axis_slice(layer, &bottom, param.axis(), param.num_axes())?);
            }
            Ok(InferredLayer::passthrough(layer, Some(bottom)).with_blobs(blobs))
        }
        LayerType::PReLU => {
            let bottom = require_bottom(layer, bottoms, 0)?;
            let channels = if layer.prelu_param.get_or_default().channel_shared() {
                1
            } else {
                bottom.get(1).copied().unwrap_or(1)
            };
            Ok(InferredLayer::passthrough(layer, Some(bottom)).with_blobs(vec![vec![channels]]))
        }
        LayerType::Accuracy => Ok(scalar_tops(layer)),
    }
}

fn scalar_tops(layer: &LayerParameter) -> InferredLayer {
    InferredLayer::passthrough(layer, Some(Vec::new()))
}

fn require_bottom(layer: &LayerParameter, bottoms: &[Option<Shape>], index: usize) -> Result<Shape> {
    match bottoms.get(index) {
        Some(Some(shape)) => Ok(shape.clone()),
        Some(None) => Err(Error::Topology(format!(
            "cannot infer the shape of bottom `{}` of layer `{}`",
            layer.bottom[index],
            layer.name()
        ))),
        None => Err(Error::Topology(format!(
            "layer `{}` ({}) needs at least {} bottom(s)",
            layer.name(),
            layer.type_(),
            index + 1
        ))),
    }
}

fn blob_shape(layer: &LayerParameter, shape: &BlobShape) -> Result<Shape> {
    shape
        .dim
        .iter()
        .map(|dim| {
            usize::try_from(*dim).map_err(|_| {
                Error::Topology(format!(
                    "layer `{}` declares a negative dimension {dim}",
                    layer.name()
                ))
            })
        })
        .collect()
}

/// Number of elements of `shape`, or a `Topology` error when it overflows `usize`.
fn element_count(layer: &LayerParameter, shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .ok_or_else(|| {
            Error::Topology(format!(
                "layer `{}`: shape {shape:?} has too many elements",
                layer.name()
            ))
        })
}

/// Resolve a possibly negative axis against a blob of `rank` dimensions.
fn canonical_axis(layer: &LayerParameter, axis: i32, rank: usize) -> Result<usize> {
    let resolved = if axis < 0 {
        rank as i64 + axis as i64
    } else {
        axis as i64
    };

    if resolved < 0 || resolved >= rank as i64 {
        return Err(Error::Topology(format!(
            "axis {axis} is out of range for the rank {rank} input of layer `{}`",
            layer.name()
        )));
    }
    Ok(resolved as usize)
}

/// The dims `shape[axis..axis + num_axes]`, `num_axes == -1` meaning up to the last dim.
fn axis_slice(layer: &LayerParameter, shape: &[usize], axis: i32, num_axes: i32) -> Result<Shape> {
    let start = if shape.is_empty() && axis == 0 {
        0
    } else {
        canonical_axis(layer, axis, shape.len())?
    };
    let end = match num_axes {
        -1 => shape.len(),
        n if n >= 0 && start + n as usize <= shape.len() => start + n as usize,
        n => {
            return Err(Error::Topology(format!(
                "num_axes {n} is out of range for layer `{}`",
                layer.name()
            )))
        }
    };
    Ok(shape[start..end].to_vec())
}

fn input_shapes(layer: &LayerParameter) -> Result<InferredLayer> {
    let shapes = &layer.input_param.get_or_default().shape;
    let tops = layer.top.len();

    let shapes = match shapes.len() {
        0 => vec![None; tops],
        1 => vec![Some(blob_shape(layer, &shapes[0])?); tops],
        n if n == tops => shapes
            .iter()
            .map(|shape| blob_shape(layer, shape).map(Some))
            .collect::<Result<Vec<_>>>()?,
        n => {
            return Err(Error::Topology(format!(
                "input layer `{}` has {tops} tops but {n} shapes",
                layer.name()
            )))
        }
    };

    Ok(InferredLayer {
        tops: shapes,
        blobs: Vec::new(),
        kind: LayerKind::Unsupported,
    })
}

fn memory_data_shapes(layer: &LayerParameter) -> InferredLayer {
    let param = layer.memory_data_param.get_or_default();
    let batch = param.batch_size() as usize;
    let data = vec![
        batch,
        param.channels() as usize,
        param.height() as usize,
        param.width() as usize,
    ];

    let mut tops = vec![Some(data), Some(vec![batch])];
    tops.truncate(layer.top.len());

    InferredLayer {
        tops,
        blobs: Vec::new(),
        kind: LayerKind::Unsupported,
    }
}

fn dummy_data_shapes(layer: &LayerParameter) -> Result<InferredLayer> {
    let shapes = &layer.dummy_data_param.get_or_default().shape;
    let tops = layer.top.len();

    let tops = match shapes.len() {
        0 => vec![None; tops],
        1 => vec![Some(blob_shape(layer, &shapes[0])?); tops],
        _ => (0..tops)
            .map(|index| match shapes.get(index) {
                Some(shape) => blob_shape(layer, shape).map(Some),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(InferredLayer {
        tops,
        blobs: Vec::new(),
        kind: LayerKind::Unsupported,
    })
}

/// Spatial hyper-parameters of a 2-D convolution or pooling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    kernel: [usize; 2],
    pad: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
}

/// Pick `[h, w]` from an explicit `_h`/`_w` pair or from a repeated field holding 1 or 2 values.
fn pair(
    layer: &LayerParameter,
    what: &str,
    explicit: Option<(u32, u32)>,
    repeated: &[u32],
    default: usize,
) -> Result<[usize; 2]> {
    if let Some((h, w)) = explicit {
        return Ok([h as usize, w as usize]);
    }
    match repeated {
        [] => Ok([default, default]),
        [v] => Ok([*v as usize, *v as usize]),
        [h, w] => Ok([*h as usize, *w as usize]),
        values => Err(Error::Topology(format!(
            "layer `{}`: {} {what} values given, only 2-D windows are supported",
            layer.name(),
            values.len()
        ))),
    }
}

fn convolution_window(layer: &LayerParameter, param: &ConvolutionParameter) -> Result<Window> {
    let kernel_hw = (param.has_kernel_h() || param.has_kernel_w())
        .then(|| (param.kernel_h(), param.kernel_w()));
    let pad_hw = (param.has_pad_h() || param.has_pad_w()).then(|| (param.pad_h(), param.pad_w()));
    let stride_hw = (param.has_stride_h() || param.has_stride_w())
        .then(|| (param.stride_h(), param.stride_w()));

    if kernel_hw.is_none() && param.kernel_size.is_empty() {
        return Err(Error::Topology(format!(
            "convolution layer `{}` has no kernel size",
            layer.name()
        )));
    }

    Ok(Window {
        kernel: pair(layer, "kernel_size", kernel_hw, &param.kernel_size, 0)?,
        pad: pair(layer, "pad", pad_hw, &param.pad, 0)?,
        stride: pair(layer, "stride", stride_hw, &param.stride, 1)?,
        dilation: pair(layer, "dilation", None, &param.dilation, 1)?,
    })
}

fn convolution_shapes(layer: &LayerParameter, bottoms: &[Option<Shape>]) -> Result<InferredLayer> {
    let param = layer.convolution_param.get_or_default();
    let bottom = require_bottom(layer, bottoms, 0)?;

    if bottom.len() != 4 || param.axis() != 1 {
        return Err(Error::Topology(format!(
            "convolution layer `{}` expects a 4-D (N, C, H, W) input, found {bottom:?}",
            layer.name()
        )));
    }

    let window = convolution_window(layer, param)?;
    let output_count = param.num_output() as usize;
    let group = param.group() as usize;
    let channels = bottom[1];

    if output_count == 0 {
        return Err(Error::Topology(format!(
            "convolution layer `{}` has no num_output",
            layer.name()
        )));
    }
    if group == 0 || channels % group != 0 || output_count % group != 0 {
        return Err(Error::Topology(format!(
            "convolution layer `{}`: group {group} must divide {channels} input and {output_count} output channels",
            layer.name()
        )));
    }

    let mut top = vec![bottom[0], output_count, 0, 0];
    for axis in 0..2 {
        let extent = window.dilation[axis] * (window.kernel[axis].max(1) - 1) + 1;
        let padded = padded_extent(layer, bottom[2 + axis], window.pad[axis])?;
        if window.kernel[axis] == 0 || window.stride[axis] == 0 || padded < extent {
            return Err(Error::Topology(format!(
                "convolution layer `{}`: window {window:?} does not fit input {bottom:?}",
                layer.name()
            )));
        }
        top[2 + axis] = (padded - extent) / window.stride[axis] + 1;
    }

    let kind = LayerKind::Convolution {
        output_count,
        input_channels: channels / group,
        kernel_height: window.kernel[0],
        kernel_width: window.kernel[1],
    };

    let mut blobs = vec![vec![
        output_count,
        channels / group,
        window.kernel[0],
        window.kernel[1],
    ]];
    if param.bias_term() {
        blobs.push(vec![output_count]);
    }

    // Every bottom is convolved with the same filters and must share the first one's shape.
    let mut tops = Vec::with_capacity(layer.top.len());
    for index in 0..layer.top.len() {
        let other = require_bottom(layer, bottoms, index)?;
        if other != bottom {
            return Err(Error::Topology(format!(
                "convolution layer `{}`: bottom {index} has shape {other:?}, expected {bottom:?}",
                layer.name()
            )));
        }
        tops.push(Some(top.clone()));
    }

    Ok(InferredLayer { tops, blobs, kind })
}

fn padded_extent(layer: &LayerParameter, size: usize, pad: usize) -> Result<usize> {
    pad.checked_mul(2)
        .and_then(|both| size.checked_add(both))
        .ok_or_else(|| {
            Error::Topology(format!(
                "layer `{}`: padding {pad} overflows input size {size}",
                layer.name()
            ))
        })
}

fn pooling_shapes(layer: &LayerParameter, bottom: &[usize]) -> Result<InferredLayer> {
    let param = layer.pooling_param.get_or_default();

    if bottom.len() != 4 {
        return Err(Error::Topology(format!(
            "pooling layer `{}` expects a 4-D (N, C, H, W) input, found {bottom:?}",
            layer.name()
        )));
    }

    let spatial = [bottom[2], bottom[3]];
    let (kernel, pad, stride) = if param.global_pooling() {
        (spatial, [0, 0], [1, 1])
    } else {
        let kernel_hw = (param.has_kernel_h() || param.has_kernel_w())
            .then(|| (param.kernel_h(), param.kernel_w()));
        let kernel_size = param
            .has_kernel_size()
            .then(|| vec![param.kernel_size()])
            .unwrap_or_default();
        if kernel_hw.is_none() && kernel_size.is_empty() {
            return Err(Error::Topology(format!(
                "pooling layer `{}` has no kernel size",
                layer.name()
            )));
        }
        let pad_hw =
            (param.has_pad_h() || param.has_pad_w()).then(|| (param.pad_h(), param.pad_w()));
        let stride_hw = (param.has_stride_h() || param.has_stride_w())
            .then(|| (param.stride_h(), param.stride_w()));

        (
            pair(layer, "kernel_size", kernel_hw, &kernel_size, 0)?,
            pair(layer, "pad", pad_hw, &[param.pad()], 0)?,
            pair(layer, "stride", stride_hw, &[param.stride()], 1)?,
        )
    };

    let mut top = vec![bottom[0], bottom[1], 0, 0];
    for axis in 0..2 {
        let padded = padded_extent(layer, spatial[axis], pad[axis])?;
        if kernel[axis] == 0 || stride[axis] == 0 || padded < kernel[axis] {
            return Err(Error::Topology(format!(
                "pooling layer `{}`: kernel {kernel:?} does not fit input {bottom:?}",
                layer.name()
            )));
        }
        // Caffe rounds pooled sizes up, then drops a last window that starts inside the padding.
        let mut pooled = (padded - kernel[axis]).div_ceil(stride[axis]) + 1;
        if pad[axis] > 0 && (pooled - 1) * stride[axis] >= spatial[axis] + pad[axis] {
            pooled -= 1;
        }
        top[2 + axis] = pooled;
    }

    Ok(InferredLayer::passthrough(layer, Some(top)))
}

fn inner_product_shapes(layer: &LayerParameter, bottom: &[usize]) -> Result<InferredLayer> {
    let param = layer.inner_product_param.get_or_default();
    let output_count = param.num_output() as usize;

    if output_count == 0 {
        return Err(Error::Topology(format!(
            "inner product layer `{}` has no num_output",
            layer.name()
        )));
    }

    let axis = canonical_axis(layer, param.axis(), bottom.len())?;
    let input_count = element_count(layer, &bottom[axis..])?;

    let mut top = bottom[..axis].to_vec();
    top.push(output_count);

    let (weight, kind) = if param.transpose() {
        (vec![input_count, output_count], LayerKind::Unsupported)
    } else {
        (
            vec![output_count, input_count],
            LayerKind::FullyConnected {
                output_count,
                input_count,
            },
        )
    };

    let mut blobs = vec![weight];
    if param.bias_term() {
        blobs.push(vec![output_count]);
    }

    Ok(InferredLayer {
        tops: vec![Some(top); layer.top.len()],
        blobs,
        kind,
    })
}

fn flatten_shapes(layer: &LayerParameter, bottom: &[usize]) -> Result<InferredLayer> {
    let param = layer.flatten_param.get_or_default();
    let start = canonical_axis(layer, param.axis(), bottom.len())?;
    let end = canonical_axis(layer, param.end_axis(), bottom.len())?;

    if end < start {
        return Err(Error::Topology(format!(
            "flatten layer `{}`: end_axis comes before axis",
            layer.name()
        )));
    }

    let mut top = bottom[..start].to_vec();
    top.push(element_count(layer, &bottom[start..=end])?);
    top.extend_from_slice(&bottom[end + 1..]);

    Ok(InferredLayer::passthrough(layer, Some(top)))
}

fn reshape_shapes(layer: &LayerParameter, bottom: &[usize]) -> Result<InferredLayer> {
    let param = layer.reshape_param.get_or_default();
    let rank = bottom.len();

    // Reshape axes may address the position after the last dim.
    let start = if param.axis() < 0 {
        rank as i64 + param.axis() as i64 + 1
    } else {
        param.axis() as i64
    };
    if start < 0 || start > rank as i64 {
        return Err(Error::Topology(format!(
            "reshape layer `{}`: axis {} is out of range",
            layer.name(),
            param.axis()
        )));
    }
    let start = start as usize;
    let end = match param.num_axes() {
        -1 => rank,
        n if n >= 0 && start + n as usize <= rank => start + n as usize,
        n => {
            return Err(Error::Topology(format!(
                "reshape layer `{}`: num_axes {n} is out of range",
                layer.name()
            )))
        }
    };

    let mut middle = Vec::new();
    let mut inferred = None;
    for (index, dim) in param.shape.get_or_default().dim.iter().enumerate() {
        match *dim {
            0 => middle.push(*bottom.get(start + index).ok_or_else(|| {
                Error::Topology(format!(
                    "reshape layer `{}`: cannot copy missing dim {}",
                    layer.name(),
                    start + index
                ))
            })?),
            -1 if inferred.is_none() => {
                inferred = Some(middle.len());
                middle.push(1);
            }
            d if d > 0 => middle.push(d as usize),
            d => {
                return Err(Error::Topology(format!(
                    "reshape layer `{}`: invalid dim {d}",
                    layer.name()
                )))
            }
        }
    }

    let mut top = bottom[..start].to_vec();
    top.extend_from_slice(&middle);
    top.extend_from_slice(&bottom[end..]);

    let total = element_count(layer, bottom)?;
    if let Some(position) = inferred {
        let known = element_count(layer, &top)?;
        if known == 0 || total % known != 0 {
            return Err(Error::Topology(format!(
                "reshape layer `{}`: cannot infer a dim to reshape {bottom:?}",
                layer.name()
            )));
        }
        top[start + position] = total / known;
    }

    if element_count(layer, &top)? != total {
        return Err(Error::Topology(format!(
            "reshape layer `{}`: {top:?} does not hold the {total} elements of {bottom:?}",
            layer.name()
        )));
    }

    Ok(InferredLayer::passthrough(layer, Some(top)))
}

fn concat_shapes(layer: &LayerParameter, bottoms: &[Option<Shape>]) -> Result<InferredLayer> {
    let first = require_bottom(layer, bottoms, 0)?;
    let param = layer.concat_param.get_or_default();
    let axis = if param.has_concat_dim() {
        let axis = param.concat_dim() as usize;
        if axis >= first.len() {
            return Err(Error::Topology(format!(
                "concat_dim {axis} is out of range for the rank {} input of layer `{}`",
                first.len(),
                layer.name()
            )));
        }
        axis
    } else {
        canonical_axis(layer, param.axis(), first.len())?
    };

    let mut top = first.clone();
    for index in 1..bottoms.len() {
        let other = require_bottom(layer, bottoms, index)?;
        let compatible = other.len() == first.len()
            && other
                .iter()
                .zip(first.iter())
                .enumerate()
                .all(|(dim, (a, b))| dim == axis || a == b);
        if !compatible {
            return Err(Error::Topology(format!(
                "concat layer `{}`: bottom {index} {other:?} does not match {first:?}",
                layer.name()
            )));
        }
        top[axis] = top[axis].checked_add(other[axis]).ok_or_else(|| {
            Error::Topology(format!(
                "concat layer `{}`: concatenated dim {axis} overflows",
                layer.name()
            ))
        })?;
    }

    Ok(InferredLayer::passthrough(layer, Some(top)))
}

fn eltwise_shapes(layer: &LayerParameter, bottoms: &[Option<Shape>]) -> Result<InferredLayer> {
    let first = require_bottom(layer, bottoms, 0)?;

    for index in 1..bottoms.len() {
        let other = require_bottom(layer, bottoms, index)?;
        if other != first {
            return Err(Error::Topology(format!(
                "eltwise layer `{}`: bottom {index} {other:?} does not match {first:?}",
                layer.name()
            )));
        }
    }

    Ok(InferredLayer::passthrough(layer, Some(first)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobuf::text_format;
    use rstest::rstest;

    fn layer(text: &str) -> LayerParameter {
        text_format::parse_from_str(text).unwrap()
    }

    fn infer(text: &str, bottoms: &[&[usize]]) -> InferredLayer {
        let bottoms: Vec<_> = bottoms.iter().map(|b| Some(b.to_vec())).collect();
        infer_layer(&layer(text), &bottoms).unwrap()
    }

    #[test]
    fn convolution_lenet() {
        let inferred = infer(
            r#"name: "conv1" type: "Convolution" bottom: "data" top: "conv1"
               convolution_param { num_output: 20 kernel_size: 5 stride: 1 }"#,
            &[&[64, 1, 28, 28]],
        );

        assert_eq!(inferred.tops, vec![Some(vec![64, 20, 24, 24])]);
        assert_eq!(inferred.blobs, vec![vec![20, 1, 5, 5], vec![20]]);
        assert_eq!(
            inferred.kind,
            LayerKind::Convolution {
                output_count: 20,
                input_channels: 1,
                kernel_height: 5,
                kernel_width: 5
            }
        );
    }

    #[test]
    fn grouped_convolution_without_bias() {
        let inferred = infer(
            r#"name: "conv2" type: "Convolution" bottom: "a" top: "b"
               convolution_param { num_output: 256 group: 2 pad: 2 kernel_h: 5 kernel_w: 3 bias_term: false }"#,
            &[&[1, 96, 27, 27]],
        );

        assert_eq!(inferred.tops, vec![Some(vec![1, 256, 27, 29])]);
        assert_eq!(inferred.blobs, vec![vec![256, 48, 5, 3]]);
    }

    #[rstest]
    #[case::lenet(r#"pooling_param { pool: MAX kernel_size: 2 stride: 2 }"#, &[64, 20, 24, 24], &[64, 20, 12, 12])]
    #[case::rounds_up(r#"pooling_param { pool: MAX kernel_size: 3 stride: 2 }"#, &[1, 96, 55, 55], &[1, 96, 27, 27])]
    #[case::ceil(r#"pooling_param { pool: AVE kernel_size: 3 stride: 2 }"#, &[1, 8, 6, 6], &[1, 8, 3, 3])]
    #[case::global(r#"pooling_param { pool: AVE global_pooling: true }"#, &[2, 1024, 7, 7], &[2, 1024, 1, 1])]
    fn pooling_output(#[case] param: &str, #[case] bottom: &[usize], #[case] expected: &[usize]) {
        let text = format!(r#"name: "pool" type: "Pooling" bottom: "x" top: "y" {param}"#);

        assert_eq!(infer(&text, &[bottom]).tops, vec![Some(expected.to_vec())]);
    }

    #[test]
    fn inner_product_flattens_trailing_axes() {
        let inferred = infer(
            r#"name: "ip1" type: "InnerProduct" bottom: "pool2" top: "ip1"
               inner_product_param { num_output: 500 }"#,
            &[&[64, 50, 4, 4]],
        );

        assert_eq!(inferred.tops, vec![Some(vec![64, 500])]);
        assert_eq!(inferred.blobs, vec![vec![500, 800], vec![500]]);
        assert_eq!(
            inferred.kind,
            LayerKind::FullyConnected {
                output_count: 500,
                input_count: 800
            }
        );
    }

    #[test]
    fn transposed_inner_product_is_unsupported() {
        let inferred = infer(
            r#"name: "ip" type: "InnerProduct" bottom: "x" top: "y"
               inner_product_param { num_output: 10 transpose: true }"#,
            &[&[1, 20]],
        );

        assert_eq!(inferred.blobs[0], vec![20, 10]);
        assert_eq!(inferred.kind, LayerKind::Unsupported);
    }

    #[test]
    fn flatten_reshape_and_concat() {
        let flatten = infer(
            r#"name: "f" type: "Flatten" bottom: "x" top: "y""#,
            &[&[2, 3, 4, 5]],
        );
        assert_eq!(flatten.tops, vec![Some(vec![2, 60])]);

        let reshape = infer(
            r#"name: "r" type: "Reshape" bottom: "x" top: "y"
               reshape_param { shape { dim: 0 dim: -1 dim: 4 } }"#,
            &[&[2, 3, 4, 5]],
        );
        assert_eq!(reshape.tops, vec![Some(vec![2, 15, 4])]);

        let concat = infer(
            r#"name: "c" type: "Concat" bottom: "a" bottom: "b" top: "y""#,
            &[&[1, 64, 8, 8], &[1, 32, 8, 8]],
        );
        assert_eq!(concat.tops, vec![Some(vec![1, 96, 8, 8])]);
    }

    #[test]
    fn concat_dim_out_of_range_is_a_topology_error() {
        let concat = layer(
            r#"name: "c" type: "Concat" bottom: "a" bottom: "b" top: "y"
               concat_param { concat_dim: 7 }"#,
        );

        let err = infer_layer(&concat, &[Some(vec![1, 4]), Some(vec![1, 4])]).unwrap_err();
        assert!(matches!(err, Error::Topology(_)), "{err}");
        assert!(err.to_string().contains("concat_dim 7"), "{err}");
    }

    #[test]
    fn overflowing_element_counts_are_topology_errors() {
        let input = layer(
            r#"name: "data" type: "Input" top: "data"
               input_param { shape { dim: 1 dim: 4294967296 dim: 4294967296 } }"#,
        );
        let err = infer_layer(&input, &[]).unwrap_err();
        assert!(err.to_string().contains("too many elements"), "{err}");

        let ip = layer(
            r#"name: "ip" type: "InnerProduct" bottom: "data" top: "ip"
               inner_product_param { num_output: 10 }"#,
        );
        let err = infer_layer(&ip, &[Some(vec![1, 1 << 32, 1 << 32])]).unwrap_err();
        assert!(matches!(err, Error::Topology(_)), "{err}");

        let wide = layer(
            r#"name: "ip" type: "InnerProduct" bottom: "data" top: "ip"
               inner_product_param { num_output: 4294967295 }"#,
        );
        let err = infer_layer(&wide, &[Some(vec![1, 1 << 40])]).unwrap_err();
        assert!(matches!(err, Error::Topology(_)), "{err}");
    }

    #[test]
    fn eltwise_needs_matching_bottoms() {
        let sum = layer(r#"name: "sum" type: "Eltwise" bottom: "a" bottom: "b" top: "c""#);

        let ok = infer_layer(&sum, &[Some(vec![1, 8, 4, 4]), Some(vec![1, 8, 4, 4])]).unwrap();
        assert_eq!(ok.tops, vec![Some(vec![1, 8, 4, 4])]);

        let err = infer_layer(&sum, &[Some(vec![1, 8, 4, 4]), Some(vec![1, 4, 4, 4])]);
        assert!(matches!(err, Err(Error::Topology(_))));
    }

    #[test]
    fn batch_norm_and_scale_blobs() {
        let bn = infer(
            r#"name: "bn" type: "BatchNorm" bottom: "x" top: "x""#,
            &[&[1, 16, 8, 8]],
        );
        assert_eq!(bn.blobs, vec![vec![16], vec![16], vec![1]]);

        let scale = infer(
            r#"name: "s" type: "Scale" bottom: "x" top: "x" scale_param { bias_term: true }"#,
            &[&[1, 16, 8, 8]],
        );
        assert_eq!(scale.blobs, vec![vec![16], vec![16]]);
        assert_eq!(scale.kind, LayerKind::Unsupported);
    }

    #[test]
    fn unknown_types_pass_shapes_through() {
        let relu = infer(
            r#"name: "relu" type: "ReLU" bottom: "x" top: "x""#,
            &[&[1, 16, 8, 8]],
        );

        assert_eq!(relu.tops, vec![Some(vec![1, 16, 8, 8])]);
        assert!(relu.blobs.is_empty());
    }

    #[test]
    fn losses_produce_scalars() {
        let loss = infer(
            r#"name: "loss" type: "SoftmaxWithLoss" bottom: "ip" bottom: "label" top: "loss""#,
            &[&[64, 10], &[64]],
        );

        assert_eq!(loss.tops, vec![Some(vec![])]);
    }

    #[test]
    fn convolution_needs_a_known_bottom() {
        let conv = layer(
            r#"name: "conv" type: "Convolution" bottom: "data" top: "conv"
               convolution_param { num_output: 4 kernel_size: 3 }"#,
        );

        let err = infer_layer(&conv, &[None]).unwrap_err();
        assert!(err.to_string().contains("bottom `data`"), "{err}");
    }
}
