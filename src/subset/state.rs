use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Mul, Not};

use serde::{Deserialize, Serialize};

use crate::array::{Mask, NdArray, View};
use crate::data::{AttributeId, Dataset, Values};
use crate::error::{Result, SelectionError};
use crate::roi::{CategoricalRoi, Roi};

// ---------------------------------------------------------------------------
// SubsetState – one predicate node; leaves and composites in a single enum
// ---------------------------------------------------------------------------

/// A predicate over one or more attributes of a dataset. Evaluating a state
/// against a dataset yields a boolean [`Mask`] shaped like the dataset (or
/// like the applied [`View`]).
///
/// States are plain values: [`SubsetState::clone`] produces a fully
/// independent tree (attribute identity is shared, parametric fields are
/// deep-copied), and `&`/`|`/`^`/`!` build composite nodes.
#[derive(Debug, Clone, Default)]
pub enum SubsetState {
    /// The empty selection: no attributes, all-False mask.
    #[default]
    Base,
    Element(ElementSubsetState),
    Range(RangeSubsetState),
    Inequality(InequalitySubsetState),
    CategoricalRoi(CategoricalRoiSubsetState),
    CategoricalRoi2D(CategoricalRoi2DSubsetState),
    Category(CategorySubsetState),
    CategoricalMultiRange(CategoricalMultiRangeSubsetState),
    MaskState(MaskSubsetState),
    Roi(RoiSubsetState),
    And(AndState),
    Or(OrState),
    Xor(XorState),
    Invert(InvertState),
}

/// Fixed set of flat record positions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSubsetState {
    pub indices: Vec<usize>,
}

/// `lo <= value(att) <= hi`, bounds inclusive.
#[derive(Debug, Clone)]
pub struct RangeSubsetState {
    pub att: AttributeId,
    pub lo: f64,
    pub hi: f64,
}

/// `left <op> right` where either side is a scalar, a category label, an
/// attribute, or a scalar-multiplied attribute.
#[derive(Debug, Clone)]
pub struct InequalitySubsetState {
    pub left: Operand,
    pub op: Comparison,
    pub right: Operand,
}

/// Category value of `att` is in the ROI's label set.
#[derive(Debug, Clone)]
pub struct CategoricalRoiSubsetState {
    pub att: AttributeId,
    pub roi: CategoricalRoi,
}

/// Cross-selection over two categorical attributes:
/// `category(att2) ∈ selection[category(att1)]`.
#[derive(Debug, Clone)]
pub struct CategoricalRoi2DSubsetState {
    pub selection: BTreeMap<String, BTreeSet<String>>,
    pub att1: AttributeId,
    pub att2: AttributeId,
}

/// Integer category code of `att` is in the code set.
#[derive(Debug, Clone)]
pub struct CategorySubsetState {
    pub att: AttributeId,
    pub categories: BTreeSet<usize>,
}

/// `value(range_att)` falls in any interval assigned to
/// `category(cat_att)`.
#[derive(Debug, Clone)]
pub struct CategoricalMultiRangeSubsetState {
    pub ranges: BTreeMap<String, Vec<(f64, f64)>>,
    pub cat_att: AttributeId,
    pub range_att: AttributeId,
}

/// Raw boolean mask, aligned to a target dataset through the authoring
/// dataset's pixel attributes. On a foreign dataset each pixel attribute is
/// resolved through a link; records whose resolved coordinates fall outside
/// the stored mask are False.
#[derive(Debug, Clone)]
pub struct MaskSubsetState {
    pub mask: Mask,
    pub pixel_atts: Vec<AttributeId>,
}

/// `(value(xatt), value(yatt))` inside a 2-D geometric region.
#[derive(Debug, Clone)]
pub struct RoiSubsetState {
    pub xatt: AttributeId,
    pub yatt: AttributeId,
    pub roi: Roi,
}

#[derive(Debug, Clone)]
pub struct AndState {
    pub state1: Box<SubsetState>,
    pub state2: Box<SubsetState>,
}

#[derive(Debug, Clone)]
pub struct OrState {
    pub state1: Box<SubsetState>,
    pub state2: Box<SubsetState>,
}

#[derive(Debug, Clone)]
pub struct XorState {
    pub state1: Box<SubsetState>,
    pub state2: Box<SubsetState>,
}

#[derive(Debug, Clone)]
pub struct InvertState {
    pub state1: Box<SubsetState>,
}

// ---------------------------------------------------------------------------
// Operands and comparisons
// ---------------------------------------------------------------------------

/// One side of an [`InequalitySubsetState`].
#[derive(Debug, Clone)]
pub enum Operand {
    Scalar(f64),
    /// A category label, compared by exact string equality.
    Label(String),
    Attribute(AttributeId),
    /// `factor * value(att)`; renders as `(3 * x)`.
    Scaled { factor: f64, att: AttributeId },
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Scalar(v as f64)
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Label(v.to_string())
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Label(v)
    }
}

impl From<AttributeId> for Operand {
    fn from(att: AttributeId) -> Self {
        Operand::Attribute(att)
    }
}

impl From<&AttributeId> for Operand {
    fn from(att: &AttributeId) -> Self {
        Operand::Attribute(att.clone())
    }
}

impl From<ScaledAttribute> for Operand {
    fn from(s: ScaledAttribute) -> Self {
        Operand::Scaled {
            factor: s.factor,
            att: s.att,
        }
    }
}

/// A scalar-multiplied attribute, produced by `3.0 * &att`. Only useful as
/// an inequality operand.
#[derive(Debug, Clone)]
pub struct ScaledAttribute {
    pub factor: f64,
    pub att: AttributeId,
}

impl Mul<&AttributeId> for f64 {
    type Output = ScaledAttribute;
    fn mul(self, att: &AttributeId) -> ScaledAttribute {
        ScaledAttribute {
            factor: self,
            att: att.clone(),
        }
    }
}

impl ScaledAttribute {
    pub fn lt(self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Ge, rhs)
    }
}

/// The six comparison operators of an inequality leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }

    /// IEEE comparison; any comparison against NaN is false except `!=`.
    fn holds_f64(self, a: f64, b: f64) -> bool {
        match self {
            Comparison::Lt => a < b,
            Comparison::Le => a <= b,
            Comparison::Gt => a > b,
            Comparison::Ge => a >= b,
            Comparison::Eq => a == b,
            Comparison::Ne => a != b,
        }
    }

    fn holds_str(self, a: &str, b: &str) -> Option<bool> {
        match self {
            Comparison::Eq => Some(a == b),
            Comparison::Ne => Some(a != b),
            _ => None,
        }
    }
}

/// Build an inequality leaf from two operands. The terse call-sites live on
/// [`AttributeId`] (`att.gt(3.0)`) and [`ScaledAttribute`].
pub fn compare(left: impl Into<Operand>, op: Comparison, right: impl Into<Operand>) -> SubsetState {
    SubsetState::Inequality(InequalitySubsetState {
        left: left.into(),
        op,
        right: right.into(),
    })
}

impl AttributeId {
    pub fn lt(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Lt, rhs)
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Le, rhs)
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Gt, rhs)
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Ge, rhs)
    }

    pub fn eq_value(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Eq, rhs)
    }

    pub fn ne_value(&self, rhs: impl Into<Operand>) -> SubsetState {
        compare(self, Comparison::Ne, rhs)
    }
}

// ---------------------------------------------------------------------------
// Composition operators
// ---------------------------------------------------------------------------

impl BitAnd for SubsetState {
    type Output = SubsetState;
    fn bitand(self, rhs: SubsetState) -> SubsetState {
        SubsetState::And(AndState {
            state1: Box::new(self),
            state2: Box::new(rhs),
        })
    }
}

impl BitOr for SubsetState {
    type Output = SubsetState;
    fn bitor(self, rhs: SubsetState) -> SubsetState {
        SubsetState::Or(OrState {
            state1: Box::new(self),
            state2: Box::new(rhs),
        })
    }
}

impl BitXor for SubsetState {
    type Output = SubsetState;
    fn bitxor(self, rhs: SubsetState) -> SubsetState {
        SubsetState::Xor(XorState {
            state1: Box::new(self),
            state2: Box::new(rhs),
        })
    }
}

impl Not for SubsetState {
    type Output = SubsetState;
    fn not(self) -> SubsetState {
        SubsetState::Invert(InvertState {
            state1: Box::new(self),
        })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl SubsetState {
    /// Evaluate the predicate against `data`, producing a boolean mask
    /// shaped like the dataset. With a view, the full mask is computed
    /// first and then sliced, so `to_mask(d, Some(v))` always equals
    /// `to_mask(d, None).view(v)`.
    pub fn to_mask(&self, data: &Dataset, view: Option<&View>) -> Result<Mask> {
        let full = self.full_mask(data)?;
        match view {
            None => Ok(full),
            Some(v) => full.view(v),
        }
    }

    /// Row-major flat indices of the selected records. `Element` states
    /// return their index set directly without materializing a mask.
    pub fn to_index_list(&self, data: &Dataset) -> Result<Vec<usize>> {
        if let SubsetState::Element(e) = self {
            return Ok(e.indices.clone());
        }
        Ok(self.to_mask(data, None)?.flatnonzero())
    }

    /// A deep, independent clone. Alias for [`Clone::clone`]; parametric
    /// fields never stay shared between original and copy.
    pub fn copy(&self) -> SubsetState {
        self.clone()
    }

    /// Attributes referenced by this tree, deduplicated, in encounter
    /// order: union for binary composites, pass-through for `Invert`.
    pub fn attributes(&self) -> Vec<AttributeId> {
        let mut atts = Vec::new();
        self.collect_attributes(&mut atts);
        atts
    }

    fn collect_attributes(&self, out: &mut Vec<AttributeId>) {
        let mut push = |att: &AttributeId, out: &mut Vec<AttributeId>| {
            if !out.contains(att) {
                out.push(att.clone());
            }
        };
        match self {
            SubsetState::Base | SubsetState::Element(_) => {}
            SubsetState::Range(s) => push(&s.att, out),
            SubsetState::Inequality(s) => {
                for side in [&s.left, &s.right] {
                    match side {
                        Operand::Attribute(att) | Operand::Scaled { att, .. } => push(att, out),
                        Operand::Scalar(_) | Operand::Label(_) => {}
                    }
                }
            }
            SubsetState::CategoricalRoi(s) => push(&s.att, out),
            SubsetState::CategoricalRoi2D(s) => {
                push(&s.att1, out);
                push(&s.att2, out);
            }
            SubsetState::Category(s) => push(&s.att, out),
            SubsetState::CategoricalMultiRange(s) => {
                push(&s.cat_att, out);
                push(&s.range_att, out);
            }
            SubsetState::MaskState(s) => {
                for att in &s.pixel_atts {
                    push(att, out);
                }
            }
            SubsetState::Roi(s) => {
                push(&s.xatt, out);
                push(&s.yatt, out);
            }
            SubsetState::And(s) => {
                s.state1.collect_attributes(out);
                s.state2.collect_attributes(out);
            }
            SubsetState::Or(s) => {
                s.state1.collect_attributes(out);
                s.state2.collect_attributes(out);
            }
            SubsetState::Xor(s) => {
                s.state1.collect_attributes(out);
                s.state2.collect_attributes(out);
            }
            SubsetState::Invert(s) => s.state1.collect_attributes(out),
        }
    }

    fn full_mask(&self, data: &Dataset) -> Result<Mask> {
        match self {
            SubsetState::Base => Ok(Mask::full(data.shape(), false)),
            SubsetState::Element(s) => element_mask(s, data),
            SubsetState::Range(s) => {
                let values = data.values(&s.att, None)?;
                let numeric = values.as_numeric(s.att.label())?;
                Ok(numeric.map(|&v| v >= s.lo && v <= s.hi))
            }
            SubsetState::Inequality(s) => inequality_mask(s, data),
            SubsetState::CategoricalRoi(s) => {
                let values = data.values(&s.att, None)?;
                categorical_mask(&values, &s.att, |label| s.roi.contains(label))
            }
            SubsetState::CategoricalRoi2D(s) => {
                let v1 = data.values(&s.att1, None)?;
                let v2 = data.values(&s.att2, None)?;
                let shape = data.shape();
                let n = v1.len();
                let mut mask = Mask::full(shape, false);
                for flat in 0..n {
                    let l1 = require_label(&v1, &s.att1, flat)?;
                    let l2 = require_label(&v2, &s.att2, flat)?;
                    let keep = s
                        .selection
                        .get(l1)
                        .map_or(false, |allowed| allowed.contains(l2));
                    mask.set(flat, keep);
                }
                Ok(mask)
            }
            SubsetState::Category(s) => {
                let values = data.values(&s.att, None)?;
                match &values {
                    Values::Categorical { codes, .. } => {
                        Ok(codes.map(|code| s.categories.contains(code)))
                    }
                    Values::Numeric(_) => Err(SelectionError::TypeMismatch {
                        label: s.att.label().to_string(),
                        expected: "categorical",
                        actual: "numeric",
                    }),
                }
            }
            SubsetState::CategoricalMultiRange(s) => {
                let cats = data.values(&s.cat_att, None)?;
                let vals = data.values(&s.range_att, None)?;
                let numeric = vals.as_numeric(s.range_att.label())?;
                let mut mask = Mask::full(data.shape(), false);
                for flat in 0..numeric.len() {
                    let label = require_label(&cats, &s.cat_att, flat)?;
                    let v = *numeric.get(flat);
                    let keep = s.ranges.get(label).map_or(false, |intervals| {
                        intervals.iter().any(|&(lo, hi)| v >= lo && v <= hi)
                    });
                    mask.set(flat, keep);
                }
                Ok(mask)
            }
            SubsetState::MaskState(s) => raw_mask(s, data),
            SubsetState::Roi(s) => {
                let x = data.values(&s.xatt, None)?;
                let y = data.values(&s.yatt, None)?;
                let xv = x.as_numeric(s.xatt.label())?;
                let yv = y.as_numeric(s.yatt.label())?;
                let inside = s.roi.contains(xv.as_slice(), yv.as_slice());
                Ok(Mask::from_shape_vec(data.shape(), inside))
            }
            SubsetState::And(s) => {
                Ok(&s.state1.full_mask(data)? & &s.state2.full_mask(data)?)
            }
            SubsetState::Or(s) => Ok(&s.state1.full_mask(data)? | &s.state2.full_mask(data)?),
            SubsetState::Xor(s) => {
                Ok(&s.state1.full_mask(data)? ^ &s.state2.full_mask(data)?)
            }
            SubsetState::Invert(s) => Ok(!&s.state1.full_mask(data)?),
        }
    }
}

fn element_mask(state: &ElementSubsetState, data: &Dataset) -> Result<Mask> {
    let mut mask = Mask::full(data.shape(), false);
    let len = mask.len();
    for &idx in &state.indices {
        if idx >= len {
            return Err(SelectionError::IndexOutOfBounds { index: idx, len });
        }
        mask.set(idx, true);
    }
    Ok(mask)
}

fn categorical_mask(
    values: &Values,
    att: &AttributeId,
    pred: impl Fn(&str) -> bool,
) -> Result<Mask> {
    match values {
        Values::Categorical { codes, labels } => {
            Ok(codes.map(|&code| labels.get(code).map_or(false, |l| pred(l))))
        }
        Values::Numeric(_) => Err(SelectionError::TypeMismatch {
            label: att.label().to_string(),
            expected: "categorical",
            actual: "numeric",
        }),
    }
}

fn require_label<'a>(values: &'a Values, att: &AttributeId, flat: usize) -> Result<&'a str> {
    values
        .label_at(flat)
        .ok_or_else(|| SelectionError::TypeMismatch {
            label: att.label().to_string(),
            expected: "categorical",
            actual: values.kind(),
        })
}

// -- inequality evaluation ---------------------------------------------------

enum Side {
    NumScalar(f64),
    NumArray(NdArray<f64>),
    LabelScalar(String),
    LabelArray(NdArray<usize>, std::sync::Arc<Vec<String>>),
}

impl Side {
    fn resolve(operand: &Operand, data: &Dataset) -> Result<Side> {
        match operand {
            Operand::Scalar(v) => Ok(Side::NumScalar(*v)),
            Operand::Label(l) => Ok(Side::LabelScalar(l.clone())),
            Operand::Attribute(att) => match data.values(att, None)? {
                Values::Numeric(a) => Ok(Side::NumArray(a)),
                Values::Categorical { codes, labels } => Ok(Side::LabelArray(codes, labels)),
            },
            Operand::Scaled { factor, att } => {
                let values = data.values(att, None)?;
                let numeric = values.as_numeric(att.label())?;
                Ok(Side::NumArray(numeric.map(|&v| factor * v)))
            }
        }
    }

    fn num_at(&self, flat: usize) -> Option<f64> {
        match self {
            Side::NumScalar(v) => Some(*v),
            Side::NumArray(a) => Some(*a.get(flat)),
            _ => None,
        }
    }

    fn label_at(&self, flat: usize) -> Option<&str> {
        match self {
            Side::LabelScalar(l) => Some(l),
            Side::LabelArray(codes, labels) => labels.get(*codes.get(flat)).map(String::as_str),
            _ => None,
        }
    }

    fn is_label(&self) -> bool {
        matches!(self, Side::LabelScalar(_) | Side::LabelArray(..))
    }
}

fn mixed_operands(state: &InequalitySubsetState) -> SelectionError {
    SelectionError::TypeMismatch {
        label: state.to_string(),
        expected: "comparable operands",
        actual: "mixed numeric/categorical",
    }
}

fn inequality_mask(state: &InequalitySubsetState, data: &Dataset) -> Result<Mask> {
    let left = Side::resolve(&state.left, data)?;
    let right = Side::resolve(&state.right, data)?;
    let mut mask = Mask::full(data.shape(), false);
    for flat in 0..mask.len() {
        let keep = if left.is_label() || right.is_label() {
            let a = left.label_at(flat).ok_or_else(|| mixed_operands(state))?;
            let b = right.label_at(flat).ok_or_else(|| mixed_operands(state))?;
            state.op.holds_str(a, b).ok_or_else(|| mixed_operands(state))?
        } else {
            let a = left.num_at(flat).ok_or_else(|| mixed_operands(state))?;
            let b = right.num_at(flat).ok_or_else(|| mixed_operands(state))?;
            state.op.holds_f64(a, b)
        };
        mask.set(flat, keep);
    }
    Ok(mask)
}

impl fmt::Display for InequalitySubsetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op.symbol(), self.right)
    }
}

// -- raw-mask evaluation -----------------------------------------------------

fn raw_mask(state: &MaskSubsetState, data: &Dataset) -> Result<Mask> {
    let native = state
        .pixel_atts
        .iter()
        .all(|att| att.dataset_id() == data.id());
    if native {
        if state.mask.shape() != data.shape().as_slice() {
            return Err(SelectionError::ShapeMismatch {
                mask_shape: state.mask.shape().to_vec(),
                data_shape: data.shape(),
            });
        }
        return Ok(state.mask.clone());
    }
    // Foreign dataset: resolve each authoring-axis coordinate through the
    // target's links, then look the stored mask up at the rounded
    // coordinates. Out-of-bounds records are unselected.
    let coords: Vec<Values> = state
        .pixel_atts
        .iter()
        .map(|att| data.values(att, None))
        .collect::<Result<_>>()?;
    let mut mask = Mask::full(data.shape(), false);
    for flat in 0..mask.len() {
        let mut stored = Some(0usize);
        for (axis, axis_coords) in coords.iter().enumerate() {
            let numeric = axis_coords.as_numeric(state.pixel_atts[axis].label())?;
            let c = numeric.get(flat).round();
            let dim = state.mask.shape()[axis];
            if c < 0.0 || c as usize >= dim {
                stored = None;
                break;
            }
            stored = stored.map(|acc| acc * dim + c as usize);
        }
        if let Some(pos) = stored {
            mask.set(flat, *state.mask.get(pos));
        }
    }
    Ok(mask)
}

// ---------------------------------------------------------------------------
// Canonical string form
// ---------------------------------------------------------------------------

/// Print a float the way the expression strings expect: integral values
/// without a decimal point.
fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.is_finite() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Scalar(v) => write!(f, "{}", fmt_num(*v)),
            Operand::Label(l) => write!(f, "{l}"),
            Operand::Attribute(att) => write!(f, "{att}"),
            Operand::Scaled { factor, att } => write!(f, "({} * {att})", fmt_num(*factor)),
        }
    }
}

impl fmt::Display for SubsetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsetState::Base => write!(f, "(empty selection)"),
            SubsetState::Element(s) => write!(f, "(elements: {})", s.indices.len()),
            SubsetState::Range(s) => {
                write!(f, "({} <= {} <= {})", fmt_num(s.lo), s.att, fmt_num(s.hi))
            }
            SubsetState::Inequality(s) => fmt::Display::fmt(s, f),
            SubsetState::CategoricalRoi(s) => {
                let cats: Vec<&str> = s.roi.categories.iter().map(String::as_str).collect();
                write!(f, "({} in {{{}}})", s.att, cats.join(", "))
            }
            SubsetState::CategoricalRoi2D(s) => {
                write!(f, "({} x {} cross-selection)", s.att1, s.att2)
            }
            SubsetState::Category(s) => {
                let codes: Vec<String> = s.categories.iter().map(usize::to_string).collect();
                write!(f, "(code({}) in {{{}}})", s.att, codes.join(", "))
            }
            SubsetState::CategoricalMultiRange(s) => {
                write!(f, "({} ranges by {})", s.range_att, s.cat_att)
            }
            SubsetState::MaskState(s) => write!(f, "(mask: {} selected)", s.mask.count_true()),
            SubsetState::Roi(s) => write!(f, "(({}, {}) in {})", s.xatt, s.yatt, s.roi),
            SubsetState::And(s) => write!(f, "({} & {})", s.state1, s.state2),
            SubsetState::Or(s) => write!(f, "({} | {})", s.state1, s.state2),
            SubsetState::Xor(s) => write!(f, "({} ^ {})", s.state1, s.state2),
            SubsetState::Invert(s) => write!(f, "(~{})", s.state1),
        }
    }
}

// ---------------------------------------------------------------------------
// Save / restore – portable representation with attributes stored by label
// ---------------------------------------------------------------------------

/// Serialized form of an [`Operand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedOperand {
    Scalar(f64),
    Label(String),
    Attribute(String),
    Scaled { factor: f64, att: String },
}

/// Portable representation of a [`SubsetState`] tree. Attribute references
/// are stored as labels and re-resolved against the target dataset's
/// attribute table on restore; every parametric field round-trips exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SavedState {
    Base,
    Element {
        indices: Vec<usize>,
    },
    Range {
        att: String,
        lo: f64,
        hi: f64,
    },
    Inequality {
        left: SavedOperand,
        op: Comparison,
        right: SavedOperand,
    },
    CategoricalRoi {
        att: String,
        categories: BTreeSet<String>,
    },
    CategoricalRoi2D {
        selection: BTreeMap<String, BTreeSet<String>>,
        att1: String,
        att2: String,
    },
    Category {
        att: String,
        categories: BTreeSet<usize>,
    },
    CategoricalMultiRange {
        ranges: BTreeMap<String, Vec<(f64, f64)>>,
        cat_att: String,
        range_att: String,
    },
    MaskState {
        mask: Mask,
        pixel_atts: Vec<String>,
    },
    Roi {
        xatt: String,
        yatt: String,
        roi: Roi,
    },
    And {
        state1: Box<SavedState>,
        state2: Box<SavedState>,
    },
    Or {
        state1: Box<SavedState>,
        state2: Box<SavedState>,
    },
    Xor {
        state1: Box<SavedState>,
        state2: Box<SavedState>,
    },
    Invert {
        state1: Box<SavedState>,
    },
}

fn save_operand(operand: &Operand) -> SavedOperand {
    match operand {
        Operand::Scalar(v) => SavedOperand::Scalar(*v),
        Operand::Label(l) => SavedOperand::Label(l.clone()),
        Operand::Attribute(att) => SavedOperand::Attribute(att.label().to_string()),
        Operand::Scaled { factor, att } => SavedOperand::Scaled {
            factor: *factor,
            att: att.label().to_string(),
        },
    }
}

fn restore_operand(saved: &SavedOperand, data: &Dataset) -> Result<Operand> {
    Ok(match saved {
        SavedOperand::Scalar(v) => Operand::Scalar(*v),
        SavedOperand::Label(l) => Operand::Label(l.clone()),
        SavedOperand::Attribute(label) => Operand::Attribute(data.attribute(label)?),
        SavedOperand::Scaled { factor, att } => Operand::Scaled {
            factor: *factor,
            att: data.attribute(att)?,
        },
    })
}

impl SubsetState {
    /// Portable snapshot of the tree; see [`SavedState`].
    pub fn save(&self) -> SavedState {
        match self {
            SubsetState::Base => SavedState::Base,
            SubsetState::Element(s) => SavedState::Element {
                indices: s.indices.clone(),
            },
            SubsetState::Range(s) => SavedState::Range {
                att: s.att.label().to_string(),
                lo: s.lo,
                hi: s.hi,
            },
            SubsetState::Inequality(s) => SavedState::Inequality {
                left: save_operand(&s.left),
                op: s.op,
                right: save_operand(&s.right),
            },
            SubsetState::CategoricalRoi(s) => SavedState::CategoricalRoi {
                att: s.att.label().to_string(),
                categories: s.roi.categories.clone(),
            },
            SubsetState::CategoricalRoi2D(s) => SavedState::CategoricalRoi2D {
                selection: s.selection.clone(),
                att1: s.att1.label().to_string(),
                att2: s.att2.label().to_string(),
            },
            SubsetState::Category(s) => SavedState::Category {
                att: s.att.label().to_string(),
                categories: s.categories.clone(),
            },
            SubsetState::CategoricalMultiRange(s) => SavedState::CategoricalMultiRange {
                ranges: s.ranges.clone(),
                cat_att: s.cat_att.label().to_string(),
                range_att: s.range_att.label().to_string(),
            },
            SubsetState::MaskState(s) => SavedState::MaskState {
                mask: s.mask.clone(),
                pixel_atts: s.pixel_atts.iter().map(|a| a.label().to_string()).collect(),
            },
            SubsetState::Roi(s) => SavedState::Roi {
                xatt: s.xatt.label().to_string(),
                yatt: s.yatt.label().to_string(),
                roi: s.roi.clone(),
            },
            SubsetState::And(s) => SavedState::And {
                state1: Box::new(s.state1.save()),
                state2: Box::new(s.state2.save()),
            },
            SubsetState::Or(s) => SavedState::Or {
                state1: Box::new(s.state1.save()),
                state2: Box::new(s.state2.save()),
            },
            SubsetState::Xor(s) => SavedState::Xor {
                state1: Box::new(s.state1.save()),
                state2: Box::new(s.state2.save()),
            },
            SubsetState::Invert(s) => SavedState::Invert {
                state1: Box::new(s.state1.save()),
            },
        }
    }

    /// Rebuild a tree from its portable snapshot, resolving attribute
    /// labels against `data`'s attribute table.
    pub fn restore(saved: &SavedState, data: &Dataset) -> Result<SubsetState> {
        Ok(match saved {
            SavedState::Base => SubsetState::Base,
            SavedState::Element { indices } => SubsetState::Element(ElementSubsetState {
                indices: indices.clone(),
            }),
            SavedState::Range { att, lo, hi } => SubsetState::Range(RangeSubsetState {
                att: data.attribute(att)?,
                lo: *lo,
                hi: *hi,
            }),
            SavedState::Inequality { left, op, right } => {
                SubsetState::Inequality(InequalitySubsetState {
                    left: restore_operand(left, data)?,
                    op: *op,
                    right: restore_operand(right, data)?,
                })
            }
            SavedState::CategoricalRoi { att, categories } => {
                SubsetState::CategoricalRoi(CategoricalRoiSubsetState {
                    att: data.attribute(att)?,
                    roi: CategoricalRoi {
                        categories: categories.clone(),
                    },
                })
            }
            SavedState::CategoricalRoi2D {
                selection,
                att1,
                att2,
            } => SubsetState::CategoricalRoi2D(CategoricalRoi2DSubsetState {
                selection: selection.clone(),
                att1: data.attribute(att1)?,
                att2: data.attribute(att2)?,
            }),
            SavedState::Category { att, categories } => {
                SubsetState::Category(CategorySubsetState {
                    att: data.attribute(att)?,
                    categories: categories.clone(),
                })
            }
            SavedState::CategoricalMultiRange {
                ranges,
                cat_att,
                range_att,
            } => SubsetState::CategoricalMultiRange(CategoricalMultiRangeSubsetState {
                ranges: ranges.clone(),
                cat_att: data.attribute(cat_att)?,
                range_att: data.attribute(range_att)?,
            }),
            SavedState::MaskState { mask, pixel_atts } => {
                SubsetState::MaskState(MaskSubsetState {
                    mask: mask.clone(),
                    pixel_atts: pixel_atts
                        .iter()
                        .map(|label| data.attribute(label))
                        .collect::<Result<_>>()?,
                })
            }
            SavedState::Roi { xatt, yatt, roi } => SubsetState::Roi(RoiSubsetState {
                xatt: data.attribute(xatt)?,
                yatt: data.attribute(yatt)?,
                roi: roi.clone(),
            }),
            SavedState::And { state1, state2 } => SubsetState::And(AndState {
                state1: Box::new(SubsetState::restore(state1, data)?),
                state2: Box::new(SubsetState::restore(state2, data)?),
            }),
            SavedState::Or { state1, state2 } => SubsetState::Or(OrState {
                state1: Box::new(SubsetState::restore(state1, data)?),
                state2: Box::new(SubsetState::restore(state2, data)?),
            }),
            SavedState::Xor { state1, state2 } => SubsetState::Xor(XorState {
                state1: Box::new(SubsetState::restore(state1, data)?),
                state2: Box::new(SubsetState::restore(state2, data)?),
            }),
            SavedState::Invert { state1 } => SubsetState::Invert(InvertState {
                state1: Box::new(SubsetState::restore(state1, data)?),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_data() -> (Dataset, AttributeId, AttributeId) {
        let d = Dataset::from_columns(
            "data",
            [("x", vec![1.0, 2.0, 3.0, 4.0]), ("y", vec![2.0, 3.0, 4.0, 5.0])],
        )
        .unwrap();
        let x = d.attribute("x").unwrap();
        let y = d.attribute("y").unwrap();
        (d, x, y)
    }

    fn mask_of(state: &SubsetState, d: &Dataset) -> Vec<bool> {
        state.to_mask(d, None).unwrap().into_vec()
    }

    #[test]
    fn base_state_is_all_false() {
        let (d, _, _) = simple_data();
        let state = SubsetState::default();
        assert_eq!(mask_of(&state, &d), vec![false; 4]);
        assert!(state.attributes().is_empty());
        assert!(state.to_index_list(&d).unwrap().is_empty());
    }

    #[test]
    fn range_bounds_inclusive() {
        let (d, x, _) = simple_data();
        let state = SubsetState::Range(RangeSubsetState {
            att: x,
            lo: 2.0,
            hi: 3.0,
        });
        assert_eq!(mask_of(&state, &d), vec![false, true, true, false]);
    }

    #[test]
    fn inequality_attribute_vs_scalar() {
        let (d, x, _) = simple_data();
        assert_eq!(mask_of(&x.gt(1.0), &d), vec![false, true, true, true]);
        assert_eq!(mask_of(&x.le(2.0), &d), vec![true, true, false, false]);
        assert_eq!(mask_of(&x.ne_value(3.0), &d), vec![true, true, false, true]);
    }

    #[test]
    fn inequality_attribute_vs_attribute() {
        let (d, x, y) = simple_data();
        // y = x + 1 everywhere
        assert_eq!(mask_of(&x.lt(&y), &d), vec![true; 4]);
        assert_eq!(mask_of(&y.le(&x), &d), vec![false; 4]);
    }

    #[test]
    fn inequality_nan_compares_false() {
        let d = Dataset::from_columns("d", [("x", vec![1.0, f64::NAN])]).unwrap();
        let x = d.attribute("x").unwrap();
        assert_eq!(mask_of(&x.gt(0.0), &d), vec![true, false]);
        assert_eq!(mask_of(&x.le(f64::INFINITY), &d), vec![true, false]);
        // != against NaN holds
        assert_eq!(mask_of(&x.ne_value(1.0), &d), vec![false, true]);
    }

    #[test]
    fn scaled_attribute_operand() {
        let (d, x, _) = simple_data();
        let state = (3.0 * &x).lt(5.0);
        assert_eq!(mask_of(&state, &d), vec![true, false, false, false]);
        assert_eq!(state.to_string(), "((3 * x) < 5)");
    }

    #[test]
    fn composites_follow_boolean_algebra() {
        let (d, x, _) = simple_data();
        let m1 = x.gt(1.0); // F T T T
        let m2 = x.lt(4.0); // T T T F
        assert_eq!(
            mask_of(&(m1.copy() & m2.copy()), &d),
            vec![false, true, true, false]
        );
        assert_eq!(mask_of(&(m1.copy() | m2.copy()), &d), vec![true; 4]);
        assert_eq!(
            mask_of(&(m1.copy() ^ m2.copy()), &d),
            vec![true, false, false, true]
        );
        assert_eq!(mask_of(&!m1, &d), vec![true, false, false, false]);
    }

    #[test]
    fn attributes_union_dedup_in_encounter_order() {
        let (_, x, y) = simple_data();
        let state = x.gt(1.0) & (y.lt(2.0) | x.lt(0.0));
        assert_eq!(state.attributes(), vec![x.clone(), y.clone()]);
        let inverted = !x.gt(1.0);
        assert_eq!(inverted.attributes(), vec![x]);
    }

    #[test]
    fn element_state_bounds_checked() {
        let (d, _, _) = simple_data();
        let state = SubsetState::Element(ElementSubsetState { indices: vec![0, 4] });
        assert!(matches!(
            state.to_mask(&d, None),
            Err(SelectionError::IndexOutOfBounds { index: 4, len: 4 })
        ));
    }

    #[test]
    fn element_index_list_bypasses_mask() {
        let (d, _, _) = simple_data();
        let state = SubsetState::Element(ElementSubsetState { indices: vec![1, 3] });
        assert_eq!(state.to_index_list(&d).unwrap(), vec![1, 3]);
        assert_eq!(mask_of(&state, &d), vec![false, true, false, true]);
    }

    #[test]
    fn categorical_equality_on_labels() {
        let d = Dataset::from_columns("d", [("x", vec!["a", "b", "c", "b"])]).unwrap();
        let x = d.attribute("x").unwrap();
        let state = x.eq_value("b");
        assert_eq!(mask_of(&state, &d), vec![false, true, false, true]);
        assert_eq!(state.to_string(), "(x == b)");
    }

    #[test]
    fn expression_strings() {
        let (_, x, y) = simple_data();
        assert_eq!(x.gt(3.0).to_string(), "(x > 3)");
        assert_eq!(x.lt(2.0).to_string(), "(x < 2)");
        assert_eq!(x.lt(&y).to_string(), "(x < y)");
        assert_eq!(x.eq_value("a").to_string(), "(x == a)");
        assert_eq!((x.lt(&y) & x.lt(2.0)).to_string(), "((x < y) & (x < 2))");
        assert_eq!((x.lt(&y) | x.lt(2.0)).to_string(), "((x < y) | (x < 2))");
        assert_eq!((!x.lt(&y)).to_string(), "(~(x < y))");
    }

    #[test]
    fn copy_is_independent() {
        let (d, x, _) = simple_data();
        let mut original = SubsetState::Range(RangeSubsetState {
            att: x,
            lo: 0.0,
            hi: 2.0,
        });
        let copy = original.copy();
        if let SubsetState::Range(r) = &mut original {
            r.hi = 10.0;
        }
        assert_eq!(mask_of(&original, &d), vec![true; 4]);
        assert_eq!(mask_of(&copy, &d), vec![true, true, false, false]);
    }

    #[test]
    fn save_restore_via_json() {
        let (d, x, _) = simple_data();
        let state = x.gt(2.0) | SubsetState::Element(ElementSubsetState { indices: vec![0] });
        let saved = state.save();
        let json = serde_json::to_string(&saved).unwrap();
        let reloaded: SavedState = serde_json::from_str(&json).unwrap();
        let restored = SubsetState::restore(&reloaded, &d).unwrap();
        assert_eq!(mask_of(&restored, &d), mask_of(&state, &d));
    }

    #[test]
    fn restore_unknown_attribute_fails() {
        let (d, x, _) = simple_data();
        let other = Dataset::from_columns("other", [("z", vec![1.0])]).unwrap();
        let saved = x.gt(2.0).save();
        assert!(matches!(
            SubsetState::restore(&saved, &other),
            Err(SelectionError::UnknownAttribute { .. })
        ));
        drop(d);
    }
}
