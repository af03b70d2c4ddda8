use strum_macros::Display;

/// Which trainable parameter of a layer a tensor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Role {
    /// The weight matrix, stored under the `wmat` tag.
    #[strum(serialize = "weight")]
    Weight,
    /// The bias vector, stored under the `bias` tag.
    #[strum(serialize = "bias")]
    Bias,
}

impl Role {
    /// Tag used for this role inside parameter dumps.
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Weight => "wmat",
            Role::Bias => "bias",
        }
    }

    /// Parse a cxxnet tensor tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "wmat" => Some(Role::Weight),
            "bias" => Some(Role::Bias),
            _ => None,
        }
    }
}

/// A dense `f32` tensor loaded from a cxxnet parameter dump.
#[derive(new, Debug, Clone, PartialEq)]
pub struct ParameterTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl ParameterTensor {
    /// The dimensions of the tensor, outermost first.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The elements in storage order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Width of one row of the flat-to-2D view: the last dimension.
    pub fn row_len(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Number of rows of the flat-to-2D view: every dimension but the last collapsed together.
    pub fn row_count(&self) -> usize {
        match self.shape.split_last() {
            Some((_, outer)) => outer.iter().product(),
            None => 0,
        }
    }

    /// One row (slab) of the flat-to-2D view.
    ///
    /// Panics if `index` is not below [row_count](Self::row_count).
    pub fn row(&self, index: usize) -> &[f32] {
        let len = self.row_len();
        &self.data[index * len..(index + 1) * len]
    }
}
