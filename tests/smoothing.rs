//! Centroid-smoothing tests: Jacobi sweep semantics, fixity, and the
//! checked preconditions.

use daedalus::smoothing::smooth_centroid;
use daedalus::types::DaedalusError;
use ndarray::{array, Array2};

// ─────────────────────────────────────────────────────────────
//  Helpers
// ─────────────────────────────────────────────────────────────

/// Three vertices on a line, ends fixed:  0 — 1 — 2.
fn line_graph() -> (Vec<Vec<usize>>, Vec<bool>) {
    let adjacency = vec![vec![1], vec![0, 2], vec![1]];
    let fixed = vec![true, false, true];
    (adjacency, fixed)
}

// ─────────────────────────────────────────────────────────────
//  End-to-end sweeps
// ─────────────────────────────────────────────────────────────

/// A middle vertex already at the centroid of its neighbours stays put.
#[test]
fn line_already_converged() {
    let (adjacency, fixed) = line_graph();
    let mut vertices = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];

    smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap();

    let expected = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
    assert_eq!(vertices, expected);
}

/// A perturbed middle vertex lands exactly on the centroid after one sweep.
#[test]
fn midpoint_moves_to_centroid() {
    let (adjacency, fixed) = line_graph();
    let mut vertices = array![[0.0, 0.0, 0.0], [1.0, 1.0, 0.0], [2.0, 0.0, 0.0]];

    smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap();

    assert_eq!(vertices[[1, 0]], 1.0);
    assert_eq!(vertices[[1, 1]], 0.0);
    assert_eq!(vertices[[1, 2]], 0.0);
}

/// Each sweep reads only the previous sweep's coordinates: a free vertex
/// must average its neighbours' *old* positions, not freshly updated ones.
#[test]
fn sweep_is_jacobi_not_gauss_seidel() {
    // Chain 0 — 1 — 2 — 3 with the ends fixed.
    let adjacency = vec![vec![1], vec![0, 2], vec![1, 3], vec![2]];
    let fixed = vec![true, false, false, true];
    let mut vertices = array![
        [0.0, 0.0, 0.0],
        [1.0, 3.0, 0.0],
        [2.0, 2.0, 0.0],
        [3.0, 0.0, 0.0],
    ];

    smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap();

    // Vertex 1: mean of old v0 and old v2 = (1, 1, 0).
    assert_eq!(vertices[[1, 0]], 1.0);
    assert_eq!(vertices[[1, 1]], 1.0);
    // Vertex 2: mean of old v1 (1, 3, 0) and v3 = (2, 1.5, 0).
    // Gauss–Seidel would see the updated v1 and give y = 0.5.
    assert_eq!(vertices[[2, 0]], 2.0);
    assert_eq!(vertices[[2, 1]], 1.5);
}

// ─────────────────────────────────────────────────────────────
//  Fixity and no-op invariants
// ─────────────────────────────────────────────────────────────

/// Fixed vertices are bit-identical before and after, even with awkward
/// float values.
#[test]
fn fixed_vertices_preserved_bitwise() {
    let (adjacency, fixed) = line_graph();
    let x0 = 0.1 + 0.2; // deliberately not exactly representable as 0.3
    let mut vertices = array![[x0, -0.7, 1e-30], [5.0, 5.0, 5.0], [2.5, 0.3, -4.0]];
    let before = vertices.clone();

    smooth_centroid(&mut vertices, &adjacency, &fixed, 7, &mut |_: usize| {}).unwrap();

    for &i in &[0usize, 2] {
        for d in 0..3 {
            assert!(
                vertices[[i, d]].to_bits() == before[[i, d]].to_bits(),
                "fixed vertex {i} dim {d} changed",
            );
        }
    }
}

/// `kmax = 0` is a no-op and the monitor is never called.
#[test]
fn zero_sweeps_is_noop() {
    let (adjacency, fixed) = line_graph();
    let mut vertices = array![[0.0, 0.0, 0.0], [1.0, 9.0, 0.0], [2.0, 0.0, 0.0]];
    let before = vertices.clone();

    let mut calls = 0usize;
    let mut monitor = |_k: usize| calls += 1;
    smooth_centroid(&mut vertices, &adjacency, &fixed, 0, &mut monitor).unwrap();

    assert_eq!(vertices, before);
    assert_eq!(calls, 0);
}

/// On a fully fixed graph any number of sweeps leaves the coordinates
/// identical.
#[test]
fn fully_fixed_graph_is_idempotent() {
    let adjacency = vec![vec![1], vec![0, 2], vec![1]];
    let fixed = vec![true, true, true];
    let mut vertices = array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 8.0]];
    let before = vertices.clone();

    smooth_centroid(&mut vertices, &adjacency, &fixed, 25, &mut |_: usize| {}).unwrap();

    assert_eq!(vertices, before);
}

// ─────────────────────────────────────────────────────────────
//  Monitor surface
// ─────────────────────────────────────────────────────────────

/// One notification per sweep, indices 0..kmax in order.
#[test]
fn monitor_sees_every_sweep() {
    let (adjacency, fixed) = line_graph();
    let mut vertices = array![[0.0, 0.0, 0.0], [1.0, 2.0, 0.0], [2.0, 0.0, 0.0]];

    let mut seen = Vec::new();
    let mut monitor = |k: usize| seen.push(k);
    smooth_centroid(&mut vertices, &adjacency, &fixed, 4, &mut monitor).unwrap();

    assert_eq!(seen, vec![0, 1, 2, 3]);
}

// ─────────────────────────────────────────────────────────────
//  Checked preconditions
// ─────────────────────────────────────────────────────────────

/// A free vertex with no neighbours has no centroid.
#[test]
fn free_vertex_without_neighbours_rejected() {
    let adjacency = vec![vec![1], vec![0], Vec::new()];
    let fixed = vec![true, true, false];
    let mut vertices = Array2::zeros((3, 3));

    let err = smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap_err();
    assert!(matches!(err, DaedalusError::Shape(_)), "got {err}");
}

/// Neighbour indices must refer to existing vertices.
#[test]
fn out_of_range_neighbour_rejected() {
    let adjacency = vec![vec![1], vec![0, 5], vec![1]];
    let fixed = vec![true, false, true];
    let mut vertices = Array2::zeros((3, 3));

    let err = smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap_err();
    assert!(matches!(err, DaedalusError::Index { index: 5, .. }), "got {err}");
}

/// Per-vertex arrays must agree in length.
#[test]
fn mismatched_fixed_length_rejected() {
    let adjacency = vec![vec![1], vec![0]];
    let fixed = vec![true];
    let mut vertices = Array2::zeros((2, 3));

    let err = smooth_centroid(&mut vertices, &adjacency, &fixed, 1, &mut |_: usize| {}).unwrap_err();
    assert!(matches!(err, DaedalusError::Shape(_)), "got {err}");
}
