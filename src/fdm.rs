//! Force-density form-finding: assemble the reduced system, solve it with
//! a column-pivoted QR, scatter the free-node coordinates.
//!
//! The network is in equilibrium when
//!
//!     CᵢᵀQCᵢ · Xᵢ  =  Pᵢ − CᵢᵀQCf · Xf
//!
//! holds over the free block.  A = CᵢᵀQCᵢ is symmetric positive
//! semidefinite in the well-posed case but turns singular whenever part
//! of the free subgraph has no path to a support, so the solve goes
//! through a rank-revealing pivoted QR rather than a Cholesky
//! factorisation.

use crate::types::{DaedalusError, FdResult, Monitor, NetworkTopology};
use nalgebra::DMatrix;
use ndarray::Array2;
use sprs::{CsMat, TriMat};

// ─────────────────────────────────────────────────────────────
//  Top-level solve
// ─────────────────────────────────────────────────────────────

/// Solve for the equilibrium geometry of `topology` under `loads` with
/// edge force densities `q`, mutating the free rows of `xyz` in place.
///
/// Fixed rows of `xyz` are preserved bit-identically.  With no free
/// nodes the solve is skipped and only the derived geometry is computed.
/// The monitor is notified once, after the direct solve.
pub fn fd(
    topology: &NetworkTopology,
    xyz: &mut Array2<f64>,
    loads: &Array2<f64>,
    q: &[f64],
    monitor: &mut dyn Monitor,
) -> Result<FdResult, DaedalusError> {
    let ne = topology.num_edges;
    let nn = topology.num_nodes;
    let nn_free = topology.free_node_indices.len();
    let nn_fixed = topology.fixed_node_indices.len();

    if xyz.nrows() != nn || xyz.ncols() != 3 {
        return Err(DaedalusError::Shape(format!(
            "xyz is {} × {}, expected {nn} × 3", xyz.nrows(), xyz.ncols(),
        )));
    }
    if loads.nrows() != nn || loads.ncols() != 3 {
        return Err(DaedalusError::Shape(format!(
            "loads is {} × {}, expected {nn} × 3", loads.nrows(), loads.ncols(),
        )));
    }
    if q.len() != ne {
        return Err(DaedalusError::Shape(format!(
            "q has {} entries for {ne} edges", q.len(),
        )));
    }

    if nn_free > 0 {
        // ── 1. A = Cᵢᵀ Q Cᵢ  via sparse products ───────────
        let mut q_tri = TriMat::new((ne, ne));
        for (i, &qi) in q.iter().enumerate() {
            q_tri.add_triplet(i, i, qi);
        }
        let q_diag: CsMat<f64> = q_tri.to_csc();

        let ci = &topology.free_incidence;
        let ci_t = ci.transpose_view().to_csc();
        let q_ci = &q_diag * ci;
        let a_sparse = &ci_t * &q_ci;

        // ── 2. Densify A for the pivoted factorisation ─────
        let a_csc = a_sparse.to_csc();
        let mut a = DMatrix::<f64>::zeros(nn_free, nn_free);
        for col in 0..nn_free {
            let start = a_csc.indptr().raw_storage()[col];
            let end_ = a_csc.indptr().raw_storage()[col + 1];
            for nz in start..end_ {
                a[(a_csc.indices()[nz], col)] = a_csc.data()[nz];
            }
        }

        // ── 3. b = Pᵢ − Cᵢᵀ · (Q Cf Xf) ────────────────────
        let mut xf = Array2::<f64>::zeros((nn_fixed, 3));
        for (i, &node) in topology.fixed_node_indices.iter().enumerate() {
            for d in 0..3 {
                xf[[i, d]] = xyz[[node, d]];
            }
        }

        let cf_csc = topology.fixed_incidence.to_csc();
        let mut cf_xf = Array2::<f64>::zeros((ne, 3));
        accumulate_product(&cf_csc, &xf, 1.0, &mut cf_xf);
        for i in 0..ne {
            for d in 0..3 {
                cf_xf[[i, d]] *= q[i];
            }
        }

        let mut b = Array2::<f64>::zeros((nn_free, 3));
        for (i, &node) in topology.free_node_indices.iter().enumerate() {
            for d in 0..3 {
                b[[i, d]] = loads[[node, d]];
            }
        }
        accumulate_product(&ci_t, &cf_xf, -1.0, &mut b);

        // ── 4. Column-pivoted QR solve ─────────────────────
        let mut rhs = DMatrix::<f64>::zeros(nn_free, 3);
        for i in 0..nn_free {
            for d in 0..3 {
                rhs[(i, d)] = b[[i, d]];
            }
        }
        let solution = a.col_piv_qr().solve(&rhs).ok_or_else(|| {
            DaedalusError::Singular(
                "reduced stiffness is rank-deficient; check that every free node \
                 is connected to a support"
                    .into(),
            )
        })?;

        // ── 5. Scatter free rows back ──────────────────────
        for (i, &node) in topology.free_node_indices.iter().enumerate() {
            for d in 0..3 {
                xyz[[node, d]] = solution[(i, d)];
            }
        }
    }

    let result = compute_geometry(topology, xyz, loads, q);
    monitor.on_step(0);
    Ok(result)
}

// ─────────────────────────────────────────────────────────────
//  Derived geometry
// ─────────────────────────────────────────────────────────────

/// Edge lengths, axial forces, and nodal residuals at the current
/// positions.
///
/// The residual  P − CᵀQC·X  vanishes at free nodes in equilibrium and
/// equals the support reaction at fixed nodes.
pub fn compute_geometry(
    topology: &NetworkTopology,
    xyz: &Array2<f64>,
    loads: &Array2<f64>,
    q: &[f64],
) -> FdResult {
    let ne = topology.num_edges;

    let mut lengths = vec![0.0; ne];
    let mut forces = vec![0.0; ne];
    let mut residuals = loads.clone();

    for i in 0..ne {
        let s = topology.edge_starts[i];
        let e = topology.edge_ends[i];

        let dx = xyz[[e, 0]] - xyz[[s, 0]];
        let dy = xyz[[e, 1]] - xyz[[s, 1]];
        let dz = xyz[[e, 2]] - xyz[[s, 2]];

        let len = (dx * dx + dy * dy + dz * dz).sqrt();
        lengths[i] = len;
        forces[i] = q[i] * len;

        // An edge in tension pulls its start node toward the end and
        // its end node back.
        residuals[[s, 0]] += q[i] * dx;
        residuals[[s, 1]] += q[i] * dy;
        residuals[[s, 2]] += q[i] * dz;

        residuals[[e, 0]] -= q[i] * dx;
        residuals[[e, 1]] -= q[i] * dy;
        residuals[[e, 2]] -= q[i] * dz;
    }

    FdResult { lengths, forces, residuals }
}

// ─────────────────────────────────────────────────────────────
//  Sparse × dense helper
// ─────────────────────────────────────────────────────────────

/// out ← out + sign·(A·B)  for a CSC matrix A (m × k) and a dense
/// k × 3 block B, walking the outer (column) dimension the same way
/// the residual assembly walks CSR rows.
fn accumulate_product(a: &CsMat<f64>, b: &Array2<f64>, sign: f64, out: &mut Array2<f64>) {
    for (col, col_vec) in a.outer_iterator().enumerate() {
        for (row, &val) in col_vec.iter() {
            for d in 0..3 {
                out[[row, d]] += sign * val * b[[col, d]];
            }
        }
    }
}
