use std::cell::RefCell;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};
use std::path::Path;
use std::rc::{Rc, Weak};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::array::{Mask, View};
use crate::data::{AttributeId, Dataset, Values};
use crate::error::{Result, SelectionError};
use crate::fits;
use crate::message::Message;
use crate::subset::state::{MaskSubsetState, SavedState, SubsetState};
use crate::subset::ElementSubsetState;

// ---------------------------------------------------------------------------
// VisualStyle – how a subset is drawn by the host application
// ---------------------------------------------------------------------------

/// Display attributes carried by a subset. The core never interprets them;
/// they only ride along through save/restore and paste.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualStyle {
    pub color: String,
    pub alpha: f64,
    pub markersize: f64,
}

impl Default for VisualStyle {
    fn default() -> Self {
        VisualStyle {
            color: "#e31a1c".to_string(),
            alpha: 0.5,
            markersize: 3.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Subset – one named selection bound to (at most) one dataset
// ---------------------------------------------------------------------------

struct SubsetInner {
    data: Option<Dataset>,
    label: Option<String>,
    style: VisualStyle,
    state: SubsetState,
    broadcasting: bool,
}

/// Cheap-clone handle to a named, stateful selection. Owns its
/// [`SubsetState`] tree and a strong handle to its dataset; the dataset's
/// subset collection only holds weak back-references, so the subset lives
/// exactly as long as its holders do.
#[derive(Clone)]
pub struct Subset {
    inner: Rc<RefCell<SubsetInner>>,
}

/// Non-owning entry in a dataset's subset collection.
#[derive(Clone)]
pub(crate) struct WeakSubset {
    inner: Weak<RefCell<SubsetInner>>,
}

impl WeakSubset {
    pub(crate) fn upgrade(&self) -> Option<Subset> {
        self.inner.upgrade().map(|inner| Subset { inner })
    }
}

impl Subset {
    /// Standalone, unregistered subset. `data` may be `None`.
    pub fn new(data: Option<Dataset>) -> Subset {
        Subset {
            inner: Rc::new(RefCell::new(SubsetInner {
                data,
                label: None,
                style: VisualStyle::default(),
                state: SubsetState::default(),
                broadcasting: false,
            })),
        }
    }

    /// Handle identity: do the two handles refer to the same subset?
    pub fn ptr_eq(&self, other: &Subset) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> WeakSubset {
        WeakSubset {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn data(&self) -> Option<Dataset> {
        self.inner.borrow().data.clone()
    }

    pub fn label(&self) -> Option<String> {
        self.inner.borrow().label.clone()
    }

    pub fn set_label(&self, label: Option<String>) {
        self.inner.borrow_mut().label = label;
        self.broadcast("label");
    }

    pub fn style(&self) -> VisualStyle {
        self.inner.borrow().style.clone()
    }

    pub fn set_style(&self, style: VisualStyle) {
        self.inner.borrow_mut().style = style;
        self.broadcast("style");
    }

    pub fn set_color(&self, color: &str) {
        self.inner.borrow_mut().style.color = color.to_string();
        self.broadcast("style");
    }

    /// The current predicate tree (cloned; states are plain values).
    pub fn state(&self) -> SubsetState {
        self.inner.borrow().state.clone()
    }

    /// Replace the predicate tree.
    pub fn set_state(&self, state: SubsetState) {
        self.inner.borrow_mut().state = state;
        self.broadcast("subset_state");
    }

    /// Replace the predicate tree with a raw boolean mask. The mask shape
    /// must match the dataset shape; it is wrapped as a [`MaskSubsetState`]
    /// over the dataset's pixel attributes.
    pub fn set_mask_state(&self, mask: Mask) -> Result<()> {
        let data = self.require_data()?;
        if mask.shape() != data.shape().as_slice() {
            return Err(SelectionError::ShapeMismatch {
                mask_shape: mask.shape().to_vec(),
                data_shape: data.shape(),
            });
        }
        self.set_state(SubsetState::MaskState(MaskSubsetState {
            mask,
            pixel_atts: data.pixel_attribute_ids(),
        }));
        Ok(())
    }

    /// Snapshot the current selection as a raw-mask state bound to this
    /// dataset's pixel attributes. Useful before pasting onto a linked
    /// dataset: the snapshot evaluates there through the links.
    pub fn state_as_mask(&self) -> Result<SubsetState> {
        let data = self.require_data()?;
        Ok(SubsetState::MaskState(MaskSubsetState {
            mask: self.to_mask(None)?,
            pixel_atts: data.pixel_attribute_ids(),
        }))
    }

    fn require_data(&self) -> Result<Dataset> {
        self.data().ok_or_else(|| {
            SelectionError::NoData(self.label().unwrap_or_else(|| "(no label)".to_string()))
        })
    }

    // -- evaluation ----------------------------------------------------------

    /// Boolean mask of this subset over its own dataset.
    pub fn to_mask(&self, view: Option<&View>) -> Result<Mask> {
        let data = self.require_data()?;
        self.state().to_mask(&data, view)
    }

    /// Row-major flat indices of the selected records.
    pub fn to_index_list(&self) -> Result<Vec<usize>> {
        let data = self.require_data()?;
        self.state().to_index_list(&data)
    }

    pub fn attributes(&self) -> Vec<AttributeId> {
        self.inner.borrow().state.attributes()
    }

    /// Masked data access: the attribute's values under `view`, keeping
    /// only records the subset selects. Always 1-D; empty selections yield
    /// an empty result.
    pub fn get(&self, att: &AttributeId, view: Option<&View>) -> Result<Values> {
        let data = self.require_data()?;
        let mask = self.state().to_mask(&data, view)?;
        let values = data.values(att, view)?;
        values.view(&View::Mask(mask))
    }

    /// Like [`Subset::get`], resolving a label through the dataset's
    /// attribute table first.
    pub fn get_by_label(&self, label: &str, view: Option<&View>) -> Result<Values> {
        let data = self.require_data()?;
        let att = data.attribute(label)?;
        self.get(&att, view)
    }

    // -- lifecycle -----------------------------------------------------------

    /// Add this subset to its dataset's collection and enable
    /// broadcasting.
    pub fn register(&self) {
        if let Some(data) = self.data() {
            data.add_subset(self);
        }
        self.do_broadcast(true);
        log::debug!("registered subset {}", self);
        if let Some(data) = self.data() {
            data.broadcast(Message::SubsetCreate {
                subset: self.label().unwrap_or_default(),
            });
        }
    }

    /// Enable or disable broadcasting without touching registration.
    pub fn do_broadcast(&self, on: bool) {
        self.inner.borrow_mut().broadcasting = on;
    }

    /// Notify the dataset's hub that `attribute` changed. A no-op unless
    /// broadcasting is enabled and a hub is attached.
    pub fn broadcast(&self, attribute: &str) {
        if !self.inner.borrow().broadcasting {
            return;
        }
        if let Some(data) = self.data() {
            data.broadcast(Message::SubsetUpdate {
                subset: self.label().unwrap_or_default(),
                attribute: attribute.to_string(),
            });
        }
    }

    /// Remove this subset from its dataset and stop broadcasting. Safe to
    /// call any number of times and with no dataset; the deletion message
    /// goes out at most once.
    pub fn delete(&self) {
        let was_broadcasting = {
            let mut inner = self.inner.borrow_mut();
            std::mem::replace(&mut inner.broadcasting, false)
        };
        let Some(data) = self.data() else {
            return;
        };
        data.remove_subset(self);
        log::debug!("deleted subset {}", self);
        if was_broadcasting {
            data.broadcast(Message::SubsetDelete {
                subset: self.label().unwrap_or_default(),
            });
        }
    }

    /// Copy another subset's predicate tree into this one. The tree is
    /// deep-copied; later edits on either side stay independent.
    pub fn paste(&self, other: &Subset) {
        self.set_state(other.state().copy());
    }

    // -- serialization -------------------------------------------------------

    /// Portable snapshot: label, style, and the saved state tree.
    pub fn save(&self) -> SavedSubset {
        let inner = self.inner.borrow();
        SavedSubset {
            label: inner.label.clone(),
            style: inner.style.clone(),
            state: inner.state.save(),
        }
    }

    /// Rebuild a registered subset on `data` from a snapshot, resolving
    /// attribute labels against `data`'s table.
    pub fn restore(saved: &SavedSubset, data: &Dataset) -> Result<Subset> {
        let state = SubsetState::restore(&saved.state, data)?;
        let subset = Subset::new(Some(data.clone()));
        {
            let mut inner = subset.inner.borrow_mut();
            inner.label = saved.label.clone();
            inner.style = saved.style.clone();
            inner.state = state;
        }
        subset.register();
        Ok(subset)
    }

    /// Re-create this subset on another dataset through the save/restore
    /// path (used by [`Dataset::deep_clone`]).
    pub(crate) fn restore_onto(&self, data: &Dataset) -> Result<Subset> {
        Subset::restore(&self.save(), data)
    }

    // -- mask file export/import ---------------------------------------------

    /// Write the current mask to `path` as an integer-coded image. Only the
    /// FITS format is recognized; `format` defaults to the file extension,
    /// then to FITS.
    pub fn write_mask(&self, path: &Path, format: Option<&str>) -> anyhow::Result<()> {
        let fmt = format
            .map(str::to_string)
            .or_else(|| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase())
            })
            .unwrap_or_else(|| "fits".to_string());
        if fmt.trim_start_matches('.') != "fits" {
            return Err(SelectionError::UnsupportedFormat(fmt).into());
        }
        let mask = self.to_mask(None).context("computing mask")?;
        fits::write_mask(path, &mask)
    }

    /// Read a mask file written by [`Subset::write_mask`] back into this
    /// subset as an element state over the nonzero positions. The subset is
    /// left unchanged on error.
    pub fn read_mask(&self, path: &Path) -> anyhow::Result<()> {
        let mask = fits::read_mask(path)
            .map_err(|_| anyhow::anyhow!("Could not read {} (not a fits file?)", path.display()))?;
        self.set_state(SubsetState::Element(ElementSubsetState {
            indices: mask.flatnonzero(),
        }));
        Ok(())
    }
}

/// Portable snapshot of a [`Subset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSubset {
    pub label: Option<String>,
    pub style: VisualStyle,
    pub state: SavedState,
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.label().unwrap_or_else(|| "(no label)".to_string());
        match self.data() {
            Some(data) => write!(f, "Subset: {} (data: {})", label, data.label()),
            None => write!(f, "Subset: {} (no data)", label),
        }
    }
}

impl fmt::Debug for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

// Combining two subsets yields a new, unregistered subset whose state is
// the composite of deep-copied child states.
fn combined(a: &Subset, b: &Subset, f: impl FnOnce(SubsetState, SubsetState) -> SubsetState) -> Subset {
    let result = Subset::new(a.data());
    result.set_state(f(a.state().copy(), b.state().copy()));
    result
}

impl BitAnd for &Subset {
    type Output = Subset;
    fn bitand(self, rhs: &Subset) -> Subset {
        combined(self, rhs, |a, b| a & b)
    }
}

impl BitOr for &Subset {
    type Output = Subset;
    fn bitor(self, rhs: &Subset) -> Subset {
        combined(self, rhs, |a, b| a | b)
    }
}

impl BitXor for &Subset {
    type Output = Subset;
    fn bitxor(self, rhs: &Subset) -> Subset {
        combined(self, rhs, |a, b| a ^ b)
    }
}
