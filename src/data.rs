use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::array::{NdArray, View};
use crate::error::{Result, SelectionError};
use crate::message::{Message, MessageHub};
use crate::registry::LabelRegistry;
use crate::subset::{Subset, WeakSubset};

// ---------------------------------------------------------------------------
// AttributeId – identity-based reference to one column of one dataset
// ---------------------------------------------------------------------------

/// Opaque reference to a named column/component of a dataset. Equality and
/// hashing are identity-based: two ids compare equal only if they are the
/// same registration, never merely because labels coincide.
#[derive(Clone)]
pub struct AttributeId {
    inner: Rc<AttrInner>,
}

#[derive(Debug)]
struct AttrInner {
    label: String,
    dataset: u64,
}

impl AttributeId {
    fn new(label: &str, dataset: u64) -> Self {
        AttributeId {
            inner: Rc::new(AttrInner {
                label: label.to_string(),
                dataset,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub(crate) fn dataset_id(&self) -> u64 {
        self.inner.dataset
    }
}

impl PartialEq for AttributeId {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for AttributeId {}

impl std::hash::Hash for AttributeId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.inner) as usize).hash(state);
    }
}

// Display = bare label, used by the inequality string form `(x > 3)`.
impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.label)
    }
}

impl fmt::Debug for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttributeId({})", self.inner.label)
    }
}

// ---------------------------------------------------------------------------
// Values – one column's contents
// ---------------------------------------------------------------------------

/// A column's values: plain numbers, or a categorical encoding of sorted
/// unique labels plus one integer code per record.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Numeric(NdArray<f64>),
    Categorical {
        codes: NdArray<usize>,
        labels: Arc<Vec<String>>,
    },
}

impl Values {
    /// Build a categorical column: labels are the sorted unique strings,
    /// codes index into them.
    pub fn categorical<S: AsRef<str>>(raw: &[S]) -> Values {
        let mut labels: Vec<String> = raw.iter().map(|s| s.as_ref().to_string()).collect();
        labels.sort();
        labels.dedup();
        let codes = raw
            .iter()
            .map(|s| {
                labels
                    .binary_search_by(|l| l.as_str().cmp(s.as_ref()))
                    .unwrap_or(0)
            })
            .collect();
        Values::Categorical {
            codes: NdArray::from_vec(codes),
            labels: Arc::new(labels),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Numeric(a) => a.shape(),
            Values::Categorical { codes, .. } => codes.shape(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Values::Numeric(a) => a.len(),
            Values::Categorical { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Values::Numeric(_) => "numeric",
            Values::Categorical { .. } => "categorical",
        }
    }

    /// Apply a view, preserving the variant.
    pub fn view(&self, view: &View) -> Result<Values> {
        Ok(match self {
            Values::Numeric(a) => Values::Numeric(a.view(view)?),
            Values::Categorical { codes, labels } => Values::Categorical {
                codes: codes.view(view)?,
                labels: labels.clone(),
            },
        })
    }

    /// Numeric contents, or a type error naming the attribute.
    pub fn as_numeric(&self, label: &str) -> Result<&NdArray<f64>> {
        match self {
            Values::Numeric(a) => Ok(a),
            Values::Categorical { .. } => Err(SelectionError::TypeMismatch {
                label: label.to_string(),
                expected: "numeric",
                actual: "categorical",
            }),
        }
    }

    /// Category label of the record at `flat`; `None` for numeric columns.
    pub fn label_at(&self, flat: usize) -> Option<&str> {
        match self {
            Values::Numeric(_) => None,
            Values::Categorical { codes, labels } => labels.get(*codes.get(flat)).map(String::as_str),
        }
    }
}

impl From<Vec<f64>> for Values {
    fn from(v: Vec<f64>) -> Self {
        Values::Numeric(NdArray::from_vec(v))
    }
}

impl From<Vec<i64>> for Values {
    fn from(v: Vec<i64>) -> Self {
        Values::Numeric(NdArray::from_vec(v.into_iter().map(|i| i as f64).collect()))
    }
}

impl From<NdArray<f64>> for Values {
    fn from(a: NdArray<f64>) -> Self {
        Values::Numeric(a)
    }
}

impl From<Vec<&str>> for Values {
    fn from(v: Vec<&str>) -> Self {
        Values::categorical(&v)
    }
}

impl From<Vec<String>> for Values {
    fn from(v: Vec<String>) -> Self {
        Values::categorical(&v)
    }
}

// ---------------------------------------------------------------------------
// Link – single-hop attribute resolution across datasets
// ---------------------------------------------------------------------------

/// Registered transform computing a *foreign* attribute's values from a
/// native one: `target ≙ func(values(source))`, applied elementwise.
/// Resolution is single-hop; chains are not followed.
#[derive(Clone)]
pub struct Link {
    source: AttributeId,
    target: AttributeId,
    func: Rc<dyn Fn(f64) -> f64>,
}

impl Link {
    pub fn new(source: AttributeId, target: AttributeId, func: impl Fn(f64) -> f64 + 'static) -> Self {
        Link {
            source,
            target,
            func: Rc::new(func),
        }
    }

    pub fn target(&self) -> &AttributeId {
        &self.target
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Link({} -> {})", self.source, self.target)
    }
}

// ---------------------------------------------------------------------------
// Dataset – the collaborator the evaluation engine consults
// ---------------------------------------------------------------------------

static NEXT_DATASET_ID: AtomicU64 = AtomicU64::new(1);

struct DataInner {
    id: u64,
    label: String,
    shape: Vec<usize>,
    columns: Vec<(AttributeId, Values)>,
    pixel_atts: Vec<AttributeId>,
    links: Vec<Link>,
    subsets: Vec<WeakSubset>,
    hub: Option<Rc<dyn MessageHub>>,
    registry: LabelRegistry,
}

/// Cheap-clone handle to a dataset: named columns of equal shape, per-axis
/// pixel attributes, registered links, a subset collection, and an optional
/// message hub. All clones share the same underlying dataset.
///
/// The subset collection holds weak back-references; subsets own a strong
/// handle to their dataset, so the two never form a strong cycle.
#[derive(Clone)]
pub struct Dataset {
    inner: Rc<RefCell<DataInner>>,
}

impl Dataset {
    pub fn new(label: &str) -> Dataset {
        let id = NEXT_DATASET_ID.fetch_add(1, Ordering::Relaxed);
        Dataset {
            inner: Rc::new(RefCell::new(DataInner {
                id,
                label: label.to_string(),
                shape: Vec::new(),
                columns: Vec::new(),
                pixel_atts: Vec::new(),
                links: Vec::new(),
                subsets: Vec::new(),
                hub: None,
                registry: LabelRegistry::new(),
            })),
        }
    }

    /// Convenience constructor: a dataset with the given 1-D columns.
    pub fn from_columns<I, S, V>(label: &str, columns: I) -> Result<Dataset>
    where
        I: IntoIterator<Item = (S, V)>,
        S: AsRef<str>,
        V: Into<Values>,
    {
        let data = Dataset::new(label);
        for (col_label, values) in columns {
            data.add_column(col_label.as_ref(), values)?;
        }
        Ok(data)
    }

    /// Handle identity: do the two handles refer to the same dataset?
    pub fn ptr_eq(&self, other: &Dataset) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn label(&self) -> String {
        self.inner.borrow().label.clone()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.inner.borrow().shape.clone()
    }

    pub fn ndim(&self) -> usize {
        self.inner.borrow().shape.len()
    }

    /// Total number of records.
    pub fn num_elements(&self) -> usize {
        self.inner.borrow().shape.iter().product()
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.borrow().id
    }

    /// Add (or replace) a column. The first column fixes the dataset shape
    /// and creates one pixel attribute per axis; later columns must match.
    pub fn add_column(&self, label: &str, values: impl Into<Values>) -> Result<AttributeId> {
        let values = values.into();
        let mut inner = self.inner.borrow_mut();
        if inner.shape.is_empty() && inner.columns.is_empty() {
            inner.shape = values.shape().to_vec();
            let id = inner.id;
            let ndim = inner.shape.len();
            inner.pixel_atts = (0..ndim)
                .map(|axis| AttributeId::new(&format!("Pixel Axis {axis}"), id))
                .collect();
        } else if values.shape() != inner.shape.as_slice() {
            return Err(SelectionError::ShapeMismatch {
                mask_shape: values.shape().to_vec(),
                data_shape: inner.shape.clone(),
            });
        }
        if let Some(existing) = inner.columns.iter_mut().find(|(a, _)| a.label() == label) {
            existing.1 = values;
            return Ok(existing.0.clone());
        }
        let att = AttributeId::new(label, inner.id);
        inner.columns.push((att.clone(), values));
        Ok(att)
    }

    /// Resolve a label to an attribute id (columns first, then pixel
    /// attributes). Unknown labels surface an error to the caller.
    pub fn attribute(&self, label: &str) -> Result<AttributeId> {
        let inner = self.inner.borrow();
        inner
            .columns
            .iter()
            .map(|(a, _)| a)
            .chain(inner.pixel_atts.iter())
            .find(|a| a.label() == label)
            .cloned()
            .ok_or_else(|| SelectionError::UnknownAttribute {
                dataset: inner.label.clone(),
                label: label.to_string(),
            })
    }

    pub fn attribute_ids(&self) -> Vec<AttributeId> {
        self.inner
            .borrow()
            .columns
            .iter()
            .map(|(a, _)| a.clone())
            .collect()
    }

    /// Per-axis coordinate attributes (`Pixel Axis 0`, ...).
    pub fn pixel_attribute_ids(&self) -> Vec<AttributeId> {
        self.inner.borrow().pixel_atts.clone()
    }

    /// Fetch values for an attribute under an optional view. Attributes not
    /// native to this dataset resolve through a registered link (one hop);
    /// anything else is an error.
    pub fn values(&self, att: &AttributeId, view: Option<&View>) -> Result<Values> {
        let full = self.values_full(att)?;
        match view {
            None => Ok(full),
            Some(v) => full.view(v),
        }
    }

    fn values_full(&self, att: &AttributeId) -> Result<Values> {
        if att.dataset_id() == self.id() {
            return self.native_values(att);
        }
        self.linked_values(att)
    }

    fn native_values(&self, att: &AttributeId) -> Result<Values> {
        let inner = self.inner.borrow();
        if let Some((_, values)) = inner.columns.iter().find(|(a, _)| a == att) {
            return Ok(values.clone());
        }
        if let Some(axis) = inner.pixel_atts.iter().position(|a| a == att) {
            return Ok(Values::Numeric(pixel_coordinates(&inner.shape, axis)));
        }
        Err(SelectionError::UnknownAttribute {
            dataset: inner.label.clone(),
            label: att.label().to_string(),
        })
    }

    /// Resolve a foreign attribute through a registered link.
    pub fn get_linked_values(&self, att: &AttributeId, view: Option<&View>) -> Result<Values> {
        let full = self.linked_values(att)?;
        match view {
            None => Ok(full),
            Some(v) => full.view(v),
        }
    }

    fn linked_values(&self, att: &AttributeId) -> Result<Values> {
        let link = {
            let inner = self.inner.borrow();
            inner.links.iter().find(|l| l.target() == att).cloned()
        };
        let link = link.ok_or_else(|| SelectionError::UnresolvedAttribute {
            dataset: self.label(),
            label: att.label().to_string(),
        })?;
        log::debug!(
            "resolving '{}' on '{}' via link from '{}'",
            att.label(),
            self.label(),
            link.source.label()
        );
        let source = self.native_values(&link.source)?;
        let numeric = source.as_numeric(link.source.label())?;
        Ok(Values::Numeric(numeric.map(|&v| (link.func)(v))))
    }

    /// Register a link that computes a foreign attribute from one of this
    /// dataset's own attributes.
    pub fn add_link(&self, link: Link) {
        self.inner.borrow_mut().links.push(link);
    }

    pub fn set_hub(&self, hub: Rc<dyn MessageHub>) {
        self.inner.borrow_mut().hub = Some(hub);
    }

    pub fn hub(&self) -> Option<Rc<dyn MessageHub>> {
        self.inner.borrow().hub.clone()
    }

    /// Broadcast through the hub, if one is attached.
    pub(crate) fn broadcast(&self, message: Message) {
        let hub = self.hub();
        if let Some(hub) = hub {
            hub.broadcast(message);
        }
    }

    // -- subset collection ---------------------------------------------------

    /// Create, label, and register a new subset bound to this dataset.
    pub fn new_subset(&self) -> Subset {
        let label = self
            .inner
            .borrow_mut()
            .registry
            .next_label("Subset");
        let subset = Subset::new(Some(self.clone()));
        subset.set_label(Some(label));
        subset.register();
        subset
    }

    /// Record a weak back-reference to `subset`. The collection never keeps
    /// a subset alive; holders do.
    pub fn add_subset(&self, subset: &Subset) {
        self.inner.borrow_mut().subsets.push(subset.downgrade());
    }

    /// Remove by handle identity; dead entries are pruned along the way.
    pub fn remove_subset(&self, subset: &Subset) {
        self.inner
            .borrow_mut()
            .subsets
            .retain(|w| w.upgrade().map_or(false, |s| !s.ptr_eq(subset)));
    }

    pub fn contains_subset(&self, subset: &Subset) -> bool {
        self.inner
            .borrow()
            .subsets
            .iter()
            .any(|w| w.upgrade().map_or(false, |s| s.ptr_eq(subset)))
    }

    /// Live registered subsets, in registration order.
    pub fn subsets(&self) -> Vec<Subset> {
        self.inner
            .borrow()
            .subsets
            .iter()
            .filter_map(WeakSubset::upgrade)
            .collect()
    }

    /// Reset the subset-label registry (test hook).
    pub fn clear_registry(&self) {
        self.inner.borrow_mut().registry.clear();
    }

    /// Clone the dataset contents and push every live registered subset
    /// through the save/restore path. Restored subsets must produce
    /// bit-identical masks; links and hub are not carried over. The restored
    /// subsets are returned alongside the clone, since the clone's
    /// collection does not own them.
    pub fn deep_clone(&self) -> Result<(Dataset, Vec<Subset>)> {
        let clone = Dataset::new(&self.label());
        {
            let inner = self.inner.borrow();
            for (att, values) in &inner.columns {
                clone.add_column(att.label(), values.clone())?;
            }
        }
        let mut subsets = Vec::new();
        for subset in self.subsets() {
            subsets.push(subset.restore_onto(&clone)?);
        }
        Ok((clone, subsets))
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        write!(
            f,
            "Dataset({}, shape {:?}, {} columns, {} subsets)",
            inner.label,
            inner.shape,
            inner.columns.len(),
            inner.subsets.len()
        )
    }
}

/// Coordinate array along one axis, shaped like the dataset.
fn pixel_coordinates(shape: &[usize], axis: usize) -> NdArray<f64> {
    let total: usize = shape.iter().product();
    let after: usize = shape[axis + 1..].iter().product();
    let dim = shape[axis];
    let data = (0..total).map(|flat| ((flat / after) % dim) as f64).collect();
    NdArray::from_shape_vec(shape.to_vec(), data)
}
