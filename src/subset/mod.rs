//! Selection layer: predicate trees and the subsets that own them.
//!
//! Architecture:
//! ```text
//!   ┌─────────────┐
//!   │ SubsetState  │  predicate tree (leaves + AND/OR/XOR/NOT)
//!   └─────────────┘
//!          │ to_mask(dataset, view)
//!          ▼
//!   ┌─────────────┐
//!   │    Mask      │  one boolean per record
//!   └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │   Subset     │  label + style + lifecycle + masked data access
//!   └─────────────┘
//! ```

mod state;
#[allow(clippy::module_inception)]
mod subset;

pub use state::{
    compare, AndState, CategoricalMultiRangeSubsetState, CategoricalRoi2DSubsetState,
    CategoricalRoiSubsetState, CategorySubsetState, Comparison, ElementSubsetState,
    InequalitySubsetState, InvertState, MaskSubsetState, Operand, OrState, RangeSubsetState,
    RoiSubsetState, SavedOperand, SavedState, ScaledAttribute, SubsetState, XorState,
};
pub use subset::{SavedSubset, Subset, VisualStyle};
pub(crate) use subset::WeakSubset;
