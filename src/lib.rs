//! Composable boolean-selection algebra over tabular/array datasets, as
//! used by interactive data-exploration tools.
//!
//! A [`data::Dataset`] exposes named attributes (columns) of numeric or
//! categorical values. A [`subset::SubsetState`] is a predicate over one or
//! more attributes; evaluated against a dataset it yields a [`array::Mask`]
//! (one boolean per record) or a flat index list. States compose with
//! `&`/`|`/`^`/`!` into trees, evaluate lazily under [`array::View`]s,
//! resolve foreign attributes through registered [`data::Link`]s, and
//! round-trip through serialization. A [`subset::Subset`] binds a state
//! tree to one dataset and manages labels, styles, registration, and
//! change broadcasts.
//!
//! ```
//! use rowmask::data::Dataset;
//!
//! let d = Dataset::from_columns("run 42", [("x", vec![1.0, 2.0, 3.0])]).unwrap();
//! let x = d.attribute("x").unwrap();
//! let subset = d.new_subset();
//! subset.set_state(x.gt(1.0));
//! assert_eq!(subset.to_index_list().unwrap(), vec![1, 2]);
//! ```

pub mod array;
pub mod data;
pub mod error;
pub mod fits;
pub mod message;
pub mod registry;
pub mod roi;
pub mod subset;

pub use array::{DimSlice, Mask, NdArray, View};
pub use data::{AttributeId, Dataset, Link, Values};
pub use error::SelectionError;
pub use subset::{Subset, SubsetState};
