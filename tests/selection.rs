//! End-to-end tests for the selection algebra: composite evaluation, view
//! equivalence, serialization round-trips, cross-dataset links, and mask
//! file export.

use std::collections::{BTreeMap, BTreeSet};

use rowmask::array::{DimSlice, Mask, NdArray, View};
use rowmask::data::{Dataset, Link, Values};
use rowmask::roi::{CategoricalRoi, RectangularRoi};
use rowmask::subset::{
    CategoricalMultiRangeSubsetState, CategoricalRoi2DSubsetState, CategoricalRoiSubsetState,
    CategorySubsetState, ElementSubsetState, MaskSubsetState, RangeSubsetState, RoiSubsetState,
    SubsetState,
};

fn mask_vec(state: &SubsetState, d: &Dataset) -> Vec<bool> {
    state.to_mask(d, None).unwrap().into_vec()
}

fn bools(bits: &[u8]) -> Vec<bool> {
    bits.iter().map(|&b| b != 0).collect()
}

/// The four-column dataset the serialization scenarios run against.
fn mixed_data() -> Dataset {
    let data = Dataset::new("mixed");
    data.add_column("a", vec![-3.0, 2.0, 4.0, 1.0]).unwrap();
    data.add_column("b", vec!["a", "b", "a", "c"]).unwrap();
    data.add_column("c", vec![1.2, 1.3, 1.5, 1.9]).unwrap();
    data.add_column("d", vec!["x", "y", "z", "y"]).unwrap();
    data
}

/// Evaluate on the original, deep-clone the dataset (save/restore path),
/// and require a bit-identical mask on the clone.
fn assert_clone_mask(data: &Dataset, state: SubsetState, expected: &[u8]) {
    let subset = data.new_subset();
    subset.set_state(state);
    assert_eq!(
        subset.to_mask(None).unwrap().into_vec(),
        bools(expected),
        "mask on original dataset"
    );

    let (clone, clones) = data.deep_clone().unwrap();
    assert!(clone.contains_subset(&clones[0]));
    assert_eq!(
        clones[0].to_mask(None).unwrap().into_vec(),
        bools(expected),
        "mask on cloned dataset"
    );
    subset.delete();
}

// ---------------------------------------------------------------------------
// Composite evaluation
// ---------------------------------------------------------------------------

#[test]
fn multicomposite_evaluation() {
    let d = Dataset::from_columns("d", [("x", vec![1.0, 2.0, 3.0, 4.0])]).unwrap();
    let x = d.attribute("x").unwrap();
    let sub1 = x.le(2.0); // T T F F
    let sub2 = x.eq_value(1.0) | x.eq_value(3.0); // T F T F
    let s3 = sub1.copy() & sub2.copy();
    assert_eq!(mask_vec(&s3, &d), bools(&[1, 0, 0, 0]));
    let s4 = s3 ^ sub1;
    assert_eq!(mask_vec(&s4, &d), bools(&[0, 1, 0, 0]));
}

// ---------------------------------------------------------------------------
// View equivalence: to_mask(d, v) == to_mask(d)[v] for every state and view
// ---------------------------------------------------------------------------

fn grid_states(d: &Dataset) -> Vec<(&'static str, SubsetState)> {
    let cid = d.attribute("test").unwrap();
    let mut roi = RectangularRoi::new(0.0, 0.0, 0.0, 0.0);
    roi.update_limits(0.5, 0.5, 1.5, 1.5);
    let roi_state = SubsetState::Roi(RoiSubsetState {
        xatt: cid.clone(),
        yatt: cid.clone(),
        roi: roi.into(),
    });
    let range_state = SubsetState::Range(RangeSubsetState {
        att: cid.clone(),
        lo: 0.5,
        hi: 2.5,
    });
    vec![
        ("roi", roi_state.clone()),
        ("range", range_state.clone()),
        ("or", roi_state.copy() | range_state.copy()),
        ("and", roi_state.copy() & range_state.copy()),
        ("xor", roi_state.copy() ^ range_state.copy()),
        ("invert", !range_state),
        (
            "element",
            SubsetState::Element(ElementSubsetState {
                indices: vec![0, 1],
            }),
        ),
        ("inequality", cid.gt(2.5)),
        ("base", SubsetState::Base),
    ]
}

fn grid_views() -> Vec<(&'static str, View)> {
    let checker = NdArray::from_shape_vec(vec![2, 2], vec![true, false, false, true]);
    vec![
        ("full", View::all()),
        (
            "reversed-pick",
            View::Slices(vec![DimSlice::reversed(), DimSlice::Index(0)]),
        ),
        ("row", View::Slices(vec![DimSlice::Index(0), DimSlice::all()])),
        ("col", View::Slices(vec![DimSlice::all(), DimSlice::Index(0)])),
        ("boolean", View::Mask(checker.clone())),
        ("points", View::Points(checker.where_points())),
        ("all-false", View::Mask(Mask::full(vec![2, 2], false))),
    ]
}

#[test]
fn mask_of_view_is_view_of_mask() {
    let d = Dataset::new("grid");
    d.add_column(
        "test",
        Values::Numeric(NdArray::from_shape_vec(
            vec![2, 2],
            vec![1.0, 2.0, 3.0, 4.0],
        )),
    )
    .unwrap();

    for (state_name, state) in grid_states(&d) {
        let full = state.to_mask(&d, None).unwrap();
        for (view_name, view) in grid_views() {
            let lazy = state.to_mask(&d, Some(&view)).unwrap();
            let sliced = full.view(&view).unwrap();
            assert_eq!(lazy, sliced, "state {state_name}, view {view_name}");
        }
    }
}

#[test]
fn step_zero_view_surfaces_error() {
    let d = Dataset::from_columns("d", [("x", vec![1.0, 2.0, 3.0])]).unwrap();
    let x = d.attribute("x").unwrap();
    let v = View::Slices(vec![DimSlice::Slice {
        start: None,
        stop: None,
        step: 0,
    }]);
    assert!(x.gt(1.0).to_mask(&d, Some(&v)).is_err());
}

#[test]
fn masked_access_under_views() {
    let d = Dataset::new("grid");
    let cid = d
        .add_column(
            "test",
            Values::Numeric(NdArray::from_shape_vec(
                vec![2, 2],
                vec![1.0, 2.0, 3.0, 4.0],
            )),
        )
        .unwrap();
    let s = d.new_subset();
    s.set_state(cid.gt(1.5)); // selects 2, 3, 4

    let got = s.get(&cid, None).unwrap();
    assert_eq!(got.as_numeric("test").unwrap().as_slice(), &[2.0, 3.0, 4.0]);

    // under a row view only that row's selected records survive
    let row0 = View::Slices(vec![DimSlice::Index(0), DimSlice::all()]);
    let got = s.get(&cid, Some(&row0)).unwrap();
    assert_eq!(got.as_numeric("test").unwrap().as_slice(), &[2.0]);
}

// ---------------------------------------------------------------------------
// Index lists
// ---------------------------------------------------------------------------

#[test]
fn index_list_matches_flatnonzero() {
    let d = Dataset::new("nd");
    d.add_column(
        "x",
        Values::Numeric(NdArray::from_shape_vec(
            vec![2, 2],
            vec![1.0, 2.0, 1.0, 2.0],
        )),
    )
    .unwrap();
    let x = d.attribute("x").unwrap();

    let state = x.gt(1.5);
    let mask = state.to_mask(&d, None).unwrap();
    assert_eq!(state.to_index_list(&d).unwrap(), mask.flatnonzero());
    assert_eq!(state.to_index_list(&d).unwrap(), vec![1, 3]);

    assert!(SubsetState::Base.to_index_list(&d).unwrap().is_empty());
    let all = !SubsetState::Base;
    assert_eq!(all.to_index_list(&d).unwrap(), vec![0, 1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Serialization round-trips, one per state kind
// ---------------------------------------------------------------------------

#[test]
fn clone_element_subset_state() {
    let data = mixed_data();
    assert_clone_mask(
        &data,
        SubsetState::Element(ElementSubsetState {
            indices: vec![1, 2],
        }),
        &[0, 1, 1, 0],
    );
}

#[test]
fn clone_categorical_roi_subset_state() {
    let data = mixed_data();
    let state = SubsetState::CategoricalRoi(CategoricalRoiSubsetState {
        att: data.attribute("b").unwrap(),
        roi: CategoricalRoi::new(["a", "c"]),
    });
    assert_clone_mask(&data, state, &[1, 0, 1, 1]);
}

#[test]
fn clone_categorical_roi_2d_subset_state() {
    let data = mixed_data();
    let selection: BTreeMap<String, BTreeSet<String>> = [
        ("a", vec!["x"]),
        ("b", vec!["x"]),
        ("c", vec!["y"]),
    ]
    .into_iter()
    .map(|(k, v)| {
        (
            k.to_string(),
            v.into_iter().map(str::to_string).collect(),
        )
    })
    .collect();
    let state = SubsetState::CategoricalRoi2D(CategoricalRoi2DSubsetState {
        selection,
        att1: data.attribute("b").unwrap(),
        att2: data.attribute("d").unwrap(),
    });
    assert_clone_mask(&data, state, &[1, 0, 0, 1]);
}

#[test]
fn clone_category_subset_state() {
    let data = mixed_data();
    let state = SubsetState::Category(CategorySubsetState {
        att: data.attribute("b").unwrap(),
        categories: [0, 2].into_iter().collect(),
    });
    assert_clone_mask(&data, state, &[1, 0, 1, 1]);
}

#[test]
fn clone_categorical_multi_range_subset_state() {
    let data = mixed_data();
    let ranges: BTreeMap<String, Vec<(f64, f64)>> = [
        ("a".to_string(), vec![(1.0, 1.1), (1.3, 1.6)]),
        ("b".to_string(), vec![(1.1, 1.4), (1.7, 1.8)]),
        ("c".to_string(), vec![(1.1, 1.2)]),
    ]
    .into_iter()
    .collect();
    let state = SubsetState::CategoricalMultiRange(CategoricalMultiRangeSubsetState {
        ranges,
        cat_att: data.attribute("b").unwrap(),
        range_att: data.attribute("c").unwrap(),
    });
    assert_clone_mask(&data, state, &[0, 1, 1, 0]);
}

#[test]
fn clone_inequality_subset_state() {
    let data = mixed_data();
    let a = data.attribute("a").unwrap();
    assert_clone_mask(&data, a.gt(1.5), &[0, 1, 1, 0]);
}

#[test]
fn clone_mask_subset_state() {
    let data = mixed_data();
    let state = SubsetState::MaskState(MaskSubsetState {
        mask: Mask::from_vec(bools(&[0, 1, 0, 1])),
        pixel_atts: data.pixel_attribute_ids(),
    });
    assert_clone_mask(&data, state, &[0, 1, 0, 1]);
}

#[test]
fn clone_range_subset_state() {
    let data = mixed_data();
    let state = SubsetState::Range(RangeSubsetState {
        att: data.attribute("c").unwrap(),
        lo: 1.1,
        hi: 1.4,
    });
    assert_clone_mask(&data, state, &[1, 1, 0, 0]);
}

#[test]
fn clone_and_or_not_xor_subset_states() {
    let data = mixed_data();
    let a = data.attribute("a").unwrap();
    let c = data.attribute("c").unwrap();
    assert_clone_mask(&data, a.gt(1.0) & c.lt(1.5), &[0, 1, 0, 0]);
    assert_clone_mask(&data, a.gt(1.0) | c.lt(1.5), &[1, 1, 1, 0]);
    assert_clone_mask(&data, !a.gt(1.0), &[1, 0, 0, 1]);
    assert_clone_mask(&data, a.gt(1.0) ^ c.gt(1.3), &[0, 1, 0, 1]);
}

#[test]
fn clone_roi_subset_state() {
    let data = mixed_data();
    let state = SubsetState::Roi(RoiSubsetState {
        xatt: data.attribute("a").unwrap(),
        yatt: data.attribute("c").unwrap(),
        roi: RectangularRoi::new(0.0, 3.0, 1.1, 1.4).into(),
    });
    assert_clone_mask(&data, state, &[0, 1, 0, 0]);
}

#[test]
fn element_indices_survive_save_restore() {
    let data = mixed_data();
    let state = SubsetState::Element(ElementSubsetState {
        indices: vec![1, 3],
    });
    let restored = SubsetState::restore(&state.save(), &data).unwrap();
    match restored {
        SubsetState::Element(e) => assert_eq!(e.indices, vec![1, 3]),
        other => panic!("expected element state, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Copy independence for composites
// ---------------------------------------------------------------------------

#[test]
fn composite_copy_is_deep() {
    let data = mixed_data();
    let c = data.attribute("c").unwrap();
    let original = SubsetState::Range(RangeSubsetState {
        att: c,
        lo: 1.1,
        hi: 1.4,
    }) & SubsetState::Element(ElementSubsetState {
        indices: vec![0, 1],
    });
    let mut copy = original.copy();
    if let SubsetState::And(and) = &mut copy {
        if let SubsetState::Element(e) = and.state2.as_mut() {
            e.indices.clear();
        }
    }
    assert_eq!(mask_vec(&original, &data), bools(&[1, 1, 0, 0]));
    assert_eq!(mask_vec(&copy, &data), bools(&[0, 0, 0, 0]));
}

// ---------------------------------------------------------------------------
// Cross-dataset evaluation through a link
// ---------------------------------------------------------------------------

#[test]
fn mask_state_follows_link_across_datasets() {
    let d = Dataset::from_columns("d", [("x", vec![1.0, 2.0, 3.0])]).unwrap();
    let d2 = Dataset::from_columns("d2", [("x", vec![2.0, 3.0, 4.0])]).unwrap();

    // d's pixel coordinate, expressed on d2: one hop, x -> x - 1
    let target = d.pixel_attribute_ids()[0].clone();
    let source = d2.pixel_attribute_ids()[0].clone();
    d2.add_link(Link::new(source, target, |x| x - 1.0));

    let sub = d.new_subset();
    sub.set_state(d.attribute("x").unwrap().gt(1.0));
    sub.set_state(sub.state_as_mask().unwrap());
    assert_eq!(sub.to_mask(None).unwrap().into_vec(), bools(&[0, 1, 1]));

    let sub2 = d2.new_subset();
    sub2.paste(&sub);
    assert_eq!(sub2.to_mask(None).unwrap().into_vec(), bools(&[0, 0, 1]));
}

#[test]
fn state_as_mask_freezes_selection() {
    let d = Dataset::from_columns("d", [("x", vec![1.0, 2.0, 3.0])]).unwrap();
    let sub = d.new_subset();
    sub.set_state(d.attribute("x").unwrap().gt(1.0));
    sub.set_state(sub.state_as_mask().unwrap());
    assert_eq!(sub.to_mask(None).unwrap().into_vec(), bools(&[0, 1, 1]));

    // the frozen mask no longer tracks the column
    d.add_column("x", vec![5.0, 0.0, 0.0]).unwrap();
    assert_eq!(sub.to_mask(None).unwrap().into_vec(), bools(&[0, 1, 1]));
}

// ---------------------------------------------------------------------------
// Mask file export / import
// ---------------------------------------------------------------------------

#[test]
fn write_and_read_mask_round_trip() {
    let data = Dataset::new("image");
    data.add_column(
        "v",
        Values::Numeric(NdArray::full(vec![4, 4], 0.0)),
    )
    .unwrap();
    let subset = data.new_subset();
    subset.set_state(SubsetState::Element(ElementSubsetState {
        indices: vec![1, 2, 3],
    }));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mask.fits");
    subset.write_mask(&path, None).unwrap();

    let subset2 = data.new_subset();
    subset2.read_mask(&path).unwrap();
    assert_eq!(
        subset.to_mask(None).unwrap(),
        subset2.to_mask(None).unwrap()
    );
    assert_eq!(subset2.to_index_list().unwrap(), vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Documented categorical scenarios
// ---------------------------------------------------------------------------

#[test]
fn categorical_roi_scenario() {
    let data = Dataset::from_columns("cats", [("b", vec!["a", "b", "a", "c"])]).unwrap();
    let state = SubsetState::CategoricalRoi(CategoricalRoiSubsetState {
        att: data.attribute("b").unwrap(),
        roi: CategoricalRoi::new(["a", "c"]),
    });
    assert_eq!(mask_vec(&state, &data), bools(&[1, 0, 1, 1]));
}

#[test]
fn categorical_multi_range_scenario() {
    let data = Dataset::new("cats");
    data.add_column("b", vec!["a", "b", "a", "c"]).unwrap();
    data.add_column("c", vec![1.2, 1.3, 1.5, 1.9]).unwrap();
    let ranges: BTreeMap<String, Vec<(f64, f64)>> = [
        ("a".to_string(), vec![(1.0, 1.1), (1.3, 1.6)]),
        ("b".to_string(), vec![(1.1, 1.4), (1.7, 1.8)]),
        ("c".to_string(), vec![(1.1, 1.2)]),
    ]
    .into_iter()
    .collect();
    let state = SubsetState::CategoricalMultiRange(CategoricalMultiRangeSubsetState {
        ranges,
        cat_att: data.attribute("b").unwrap(),
        range_att: data.attribute("c").unwrap(),
    });
    assert_eq!(mask_vec(&state, &data), bools(&[0, 1, 1, 0]));
}
