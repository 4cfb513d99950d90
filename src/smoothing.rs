//! Laplacian centroid smoothing of a vertex graph under per-vertex
//! fixity.
//!
//! Each sweep is Jacobi-style: free vertices move to the arithmetic mean
//! of their neighbours' coordinates *from the previous sweep*, so the
//! visit order cannot affect the result.

use crate::types::{DaedalusError, Monitor};
use ndarray::Array2;

/// Run `kmax` centroid-smoothing sweeps over `vertices` in place.
///
/// `adjacency[i]` lists the neighbours of vertex `i`; `fixed[i]` pins a
/// vertex.  The monitor is notified once after each completed sweep.
///
/// Fails with `Shape` when the per-vertex arrays disagree in length or a
/// free vertex has no neighbours (its centroid is undefined), and with
/// `Index` for an out-of-range neighbour.
pub fn smooth_centroid(
    vertices: &mut Array2<f64>,
    adjacency: &[Vec<usize>],
    fixed: &[bool],
    kmax: usize,
    monitor: &mut dyn Monitor,
) -> Result<(), DaedalusError> {
    let n = vertices.nrows();

    if vertices.ncols() != 3 {
        return Err(DaedalusError::Shape(format!(
            "vertices is {n} × {}, expected {n} × 3", vertices.ncols(),
        )));
    }
    if adjacency.len() != n {
        return Err(DaedalusError::Shape(format!(
            "adjacency has {} entries for {n} vertices", adjacency.len(),
        )));
    }
    if fixed.len() != n {
        return Err(DaedalusError::Shape(format!(
            "fixed has {} entries for {n} vertices", fixed.len(),
        )));
    }
    for (i, nbrs) in adjacency.iter().enumerate() {
        if !fixed[i] && nbrs.is_empty() {
            return Err(DaedalusError::Shape(format!(
                "free vertex {i} has no neighbours",
            )));
        }
        for &j in nbrs {
            if j >= n {
                return Err(DaedalusError::Index { what: "neighbour", index: j, bound: n });
            }
        }
    }

    let mut snapshot = Array2::<f64>::zeros((n, 3));

    for k in 0..kmax {
        snapshot.assign(vertices);

        for i in 0..n {
            if fixed[i] {
                continue;
            }
            let nbrs = &adjacency[i];
            let count = nbrs.len() as f64;
            for d in 0..3 {
                let mut sum = 0.0;
                for &j in nbrs {
                    sum += snapshot[[j, d]];
                }
                vertices[[i, d]] = sum / count;
            }
        }

        monitor.on_step(k);
    }

    Ok(())
}
