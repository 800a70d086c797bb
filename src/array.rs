use std::ops::{BitAnd, BitOr, BitXor, Not};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectionError};

// ---------------------------------------------------------------------------
// NdArray – a minimal row-major N-dimensional array
// ---------------------------------------------------------------------------

/// Row-major N-dimensional array. One record per entry; `shape` is the
/// dataset shape, `data` the flattened contents (C order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

/// Boolean mask shaped like a dataset: one entry per record.
pub type Mask = NdArray<bool>;

impl<T: Clone> NdArray<T> {
    /// 1-D array from a flat vector.
    pub fn from_vec(data: Vec<T>) -> Self {
        let shape = vec![data.len()];
        NdArray { shape, data }
    }

    /// N-D array from a shape and row-major flat data.
    /// Panics if the element count doesn't match the shape.
    pub fn from_shape_vec(shape: Vec<usize>, data: Vec<T>) -> Self {
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape/data length mismatch"
        );
        NdArray { shape, data }
    }

    /// Array of the given shape with every entry set to `value`.
    pub fn full(shape: Vec<usize>, value: T) -> Self {
        let n = shape.iter().product();
        NdArray {
            shape,
            data: vec![value; n],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat (row-major) element access.
    pub fn get(&self, flat: usize) -> &T {
        &self.data[flat]
    }

    pub fn set(&mut self, flat: usize, value: T) {
        self.data[flat] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Elementwise map preserving shape.
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> NdArray<U> {
        NdArray {
            shape: self.shape.clone(),
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Row-major flat index of an N-D coordinate.
    fn flat_index(&self, coords: &[usize]) -> usize {
        let mut flat = 0;
        for (c, dim) in coords.iter().zip(&self.shape) {
            flat = flat * dim + c;
        }
        flat
    }

    /// Apply a [`View`], producing the sliced array. The contract
    /// `a.view(v) == full-array result indexed by v` (numpy semantics) is
    /// what makes lazy mask slicing legal.
    pub fn view(&self, view: &View) -> Result<NdArray<T>> {
        match view {
            View::Slices(dims) => self.view_slices(dims),
            View::Mask(mask) => self.view_mask(mask),
            View::Points(coords) => self.view_points(coords),
        }
    }

    fn view_slices(&self, dims: &[DimSlice]) -> Result<NdArray<T>> {
        if dims.len() > self.ndim() {
            return Err(SelectionError::InvalidView(format!(
                "{} indexers for {} axes",
                dims.len(),
                self.ndim()
            )));
        }
        // One index list per axis; axes indexed by a scalar are dropped
        // from the output shape.
        let mut axis_indices: Vec<Vec<usize>> = Vec::with_capacity(self.ndim());
        let mut out_shape = Vec::new();
        for (axis, len) in self.shape.iter().enumerate() {
            match dims.get(axis) {
                Some(DimSlice::Index(i)) => {
                    let idx = resolve_index(*i, *len)?;
                    axis_indices.push(vec![idx]);
                }
                Some(DimSlice::Slice { start, stop, step }) => {
                    if *step == 0 {
                        return Err(SelectionError::InvalidView(
                            "slice step cannot be zero".into(),
                        ));
                    }
                    let indices = slice_indices(*start, *stop, *step, *len);
                    out_shape.push(indices.len());
                    axis_indices.push(indices);
                }
                None => {
                    out_shape.push(*len);
                    axis_indices.push((0..*len).collect());
                }
            }
        }
        // Row-major cartesian product over the per-axis index lists.
        let count: usize = axis_indices.iter().map(Vec::len).product();
        let mut data = Vec::with_capacity(count);
        let mut cursor = vec![0usize; axis_indices.len()];
        for _ in 0..count {
            let coords: Vec<usize> = cursor
                .iter()
                .zip(&axis_indices)
                .map(|(&c, idxs)| idxs[c])
                .collect();
            data.push(self.data[self.flat_index(&coords)].clone());
            // odometer increment, last axis fastest
            for axis in (0..cursor.len()).rev() {
                cursor[axis] += 1;
                if cursor[axis] < axis_indices[axis].len() {
                    break;
                }
                cursor[axis] = 0;
            }
        }
        Ok(NdArray {
            shape: out_shape,
            data,
        })
    }

    fn view_mask(&self, mask: &Mask) -> Result<NdArray<T>> {
        if mask.shape() != self.shape() {
            return Err(SelectionError::InvalidView(format!(
                "boolean view shape {:?} does not match array shape {:?}",
                mask.shape(),
                self.shape()
            )));
        }
        let data = self
            .data
            .iter()
            .zip(mask.iter())
            .filter(|(_, &keep)| keep)
            .map(|(v, _)| v.clone())
            .collect::<Vec<_>>();
        Ok(NdArray::from_vec(data))
    }

    fn view_points(&self, coords: &[Vec<usize>]) -> Result<NdArray<T>> {
        if coords.len() != self.ndim() {
            return Err(SelectionError::InvalidView(format!(
                "{} coordinate arrays for {} axes",
                coords.len(),
                self.ndim()
            )));
        }
        let npoints = coords.first().map_or(0, Vec::len);
        if coords.iter().any(|c| c.len() != npoints) {
            return Err(SelectionError::InvalidView(
                "coordinate arrays differ in length".into(),
            ));
        }
        let mut data = Vec::with_capacity(npoints);
        for p in 0..npoints {
            let point: Vec<usize> = coords.iter().map(|c| c[p]).collect();
            for (c, len) in point.iter().zip(&self.shape) {
                if c >= len {
                    return Err(SelectionError::ViewOutOfBounds {
                        index: *c as isize,
                        len: *len,
                    });
                }
            }
            data.push(self.data[self.flat_index(&point)].clone());
        }
        Ok(NdArray::from_vec(data))
    }
}

impl Mask {
    /// Flat (row-major) indices of the entries that are `true`, in order.
    /// Matches `numpy.flatnonzero` for any dimensionality.
    pub fn flatnonzero(&self) -> Vec<usize> {
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &b)| b)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    /// Point-list view (`numpy.where`-tuple) selecting this mask's `true`
    /// entries: one coordinate vector per axis.
    pub fn where_points(&self) -> Vec<Vec<usize>> {
        let mut coords: Vec<Vec<usize>> = vec![Vec::new(); self.ndim()];
        for flat in self.flatnonzero() {
            let mut rem = flat;
            let mut point = vec![0usize; self.ndim()];
            for axis in (0..self.ndim()).rev() {
                point[axis] = rem % self.shape[axis];
                rem /= self.shape[axis];
            }
            for (axis, c) in point.into_iter().enumerate() {
                coords[axis].push(c);
            }
        }
        coords
    }
}

fn combine(a: &Mask, b: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
    assert_eq!(a.shape, b.shape, "mask shape mismatch");
    NdArray {
        shape: a.shape.clone(),
        data: a.data.iter().zip(&b.data).map(|(&x, &y)| f(x, y)).collect(),
    }
}

impl BitAnd for &Mask {
    type Output = Mask;
    fn bitand(self, rhs: &Mask) -> Mask {
        combine(self, rhs, |a, b| a & b)
    }
}

impl BitOr for &Mask {
    type Output = Mask;
    fn bitor(self, rhs: &Mask) -> Mask {
        combine(self, rhs, |a, b| a | b)
    }
}

impl BitXor for &Mask {
    type Output = Mask;
    fn bitxor(self, rhs: &Mask) -> Mask {
        combine(self, rhs, |a, b| a ^ b)
    }
}

impl Not for &Mask {
    type Output = Mask;
    fn not(self) -> Mask {
        self.map(|&b| !b)
    }
}

// ---------------------------------------------------------------------------
// Views – basic slicing, boolean views, point-list views
// ---------------------------------------------------------------------------

/// A single-axis indexer for basic (slice) views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DimSlice {
    /// Pick one coordinate; the axis is dropped from the result.
    /// Negative values index from the end.
    Index(isize),
    /// Python slice semantics, including negative `step`.
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: isize,
    },
}

impl DimSlice {
    /// The full-axis slice (`:`).
    pub fn all() -> Self {
        DimSlice::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// The reversed full-axis slice (`::-1`).
    pub fn reversed() -> Self {
        DimSlice::Slice {
            start: None,
            stop: None,
            step: -1,
        }
    }

    /// `start..stop` with step 1.
    pub fn range(start: isize, stop: isize) -> Self {
        DimSlice::Slice {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// `..` with a step (`::step`).
    pub fn step_by(step: isize) -> Self {
        DimSlice::Slice {
            start: None,
            stop: None,
            step,
        }
    }
}

/// A lazy index into a dataset-shaped array. Applying a view to the full
/// mask must equal computing the mask under the view — see
/// [`crate::subset::SubsetState::to_mask`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum View {
    /// Per-axis basic indexing; missing trailing axes are taken whole.
    Slices(Vec<DimSlice>),
    /// Boolean array of the same shape; selects flat, yields 1-D.
    Mask(Mask),
    /// `where`-tuple: one coordinate vector per axis, yields 1-D.
    Points(Vec<Vec<usize>>),
}

impl View {
    /// The identity view (`[:]`).
    pub fn all() -> Self {
        View::Slices(vec![DimSlice::all()])
    }
}

fn resolve_index(i: isize, len: usize) -> Result<usize> {
    let resolved = if i < 0 { i + len as isize } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(SelectionError::ViewOutOfBounds { index: i, len });
    }
    Ok(resolved as usize)
}

/// Expand a Python-style slice into explicit indices (CPython
/// `slice.indices` semantics).
fn slice_indices(start: Option<isize>, stop: Option<isize>, step: isize, len: usize) -> Vec<usize> {
    debug_assert!(step != 0, "callers reject step 0 before expanding");
    let len = len as isize;
    let clamp = |v: isize, lo: isize, hi: isize| v.max(lo).min(hi);
    let norm = |v: isize| if v < 0 { v + len } else { v };
    let (start, stop) = if step > 0 {
        (
            clamp(start.map_or(0, norm), 0, len),
            clamp(stop.map_or(len, norm), 0, len),
        )
    } else {
        (
            clamp(start.map_or(len - 1, norm), -1, len - 1),
            clamp(stop.map_or(-1, |v| norm(v).max(-1)), -1, len - 1),
        )
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i += step;
    }
    out
}
