use thiserror::Error;

// ---------------------------------------------------------------------------
// SelectionError – everything that can go wrong while evaluating a selection
// ---------------------------------------------------------------------------

/// Errors raised by attribute resolution, mask evaluation, and subset-state
/// assignment. Mask-file I/O uses `anyhow` instead (see [`crate::fits`]).
#[derive(Debug, Error)]
pub enum SelectionError {
    /// An attribute label was looked up on a dataset that doesn't define it.
    #[error("dataset '{dataset}' has no attribute '{label}'")]
    UnknownAttribute { dataset: String, label: String },

    /// An attribute belongs to another dataset and no link resolves it here.
    #[error("attribute '{label}' is not native to dataset '{dataset}' and no link resolves it")]
    UnresolvedAttribute { dataset: String, label: String },

    /// A raw mask was assigned whose shape doesn't match the dataset.
    #[error("mask shape {mask_shape:?} does not match data shape {data_shape:?}")]
    ShapeMismatch {
        mask_shape: Vec<usize>,
        data_shape: Vec<usize>,
    },

    /// An element index set refers to a flat position past the end of the data.
    #[error("element index {index} out of bounds for {len} elements")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A view indexed outside the array it was applied to.
    #[error("view index {index} out of bounds for axis of length {len}")]
    ViewOutOfBounds { index: isize, len: usize },

    /// A view doesn't fit the array (too many axes, wrong mask shape, ...).
    #[error("invalid view: {0}")]
    InvalidView(String),

    /// A predicate needed numeric values but the attribute is categorical,
    /// or the other way around.
    #[error("attribute '{label}' is {actual}, but the predicate needs {expected} values")]
    TypeMismatch {
        label: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// `write_mask` was asked for a format it doesn't know.
    #[error("format not supported: {0}")]
    UnsupportedFormat(String),

    /// A subset operation needed a dataset but the subset has none.
    #[error("subset '{0}' is not attached to a dataset")]
    NoData(String),
}

pub type Result<T> = std::result::Result<T, SelectionError>;
