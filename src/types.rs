use ndarray::Array2;
use sprs::{CsMat, TriMat};
use std::fmt;

// ─────────────────────────────────────────────────────────────
//  Error type
// ─────────────────────────────────────────────────────────────

/// Unified error type for all fallible operations in the crate.
///
/// Every public solver returns `Result<T, DaedalusError>` instead of
/// panicking.  Precondition violations (mismatched array lengths,
/// out-of-range indices) are checked at entry and reported as `Shape`
/// or `Index` rather than left to run into garbage arithmetic.
#[derive(Debug)]
pub enum DaedalusError {
    /// The reduced force-density system has no solution (part of the
    /// free subgraph is disconnected from every support).
    Singular(String),
    /// Mismatched array lengths or counts.
    Shape(String),
    /// A node or edge index is out of range.
    Index { what: &'static str, index: usize, bound: usize },
}

impl fmt::Display for DaedalusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Singular(msg) => write!(f, "singular system: {msg}"),
            Self::Shape(msg) => write!(f, "shape error: {msg}"),
            Self::Index { what, index, bound } =>
                write!(f, "{what} index {index} out of range (expected < {bound})"),
        }
    }
}

impl std::error::Error for DaedalusError {}

// ─────────────────────────────────────────────────────────────
//  Progress monitor  (per-iteration callback capability)
// ─────────────────────────────────────────────────────────────

/// Per-iteration notification surface shared by all three solvers.
///
/// `on_step` is called once per completed iteration (or smoothing sweep)
/// with a zero-based, strictly increasing index, on the invoking thread,
/// between iterations.  The monitor observes; it cannot touch solver
/// state, and its return value is ignored by construction.
pub trait Monitor {
    fn on_step(&mut self, iteration: usize);
}

/// Any `FnMut(usize)` closure is a monitor; pass `&mut |_| {}` to run
/// silently.
impl<F: FnMut(usize)> Monitor for F {
    fn on_step(&mut self, iteration: usize) {
        self(iteration)
    }
}

// ─────────────────────────────────────────────────────────────
//  Network topology  (incidence matrix + fixity partition)
// ─────────────────────────────────────────────────────────────

/// Branch-node connectivity of a pin-jointed network, partitioned by
/// fixity.  Built once from an edge list; immutable afterwards.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    /// Free-node incidence block   (ne × nn_free)
    pub free_incidence: CsMat<f64>,
    /// Fixed-node incidence block  (ne × nn_fixed)
    pub fixed_incidence: CsMat<f64>,
    pub num_edges: usize,
    pub num_nodes: usize,
    /// Start / end node of each edge (global node indices, 0-based).
    pub edge_starts: Vec<usize>,
    pub edge_ends: Vec<usize>,
    pub free_node_indices: Vec<usize>,
    pub fixed_node_indices: Vec<usize>,
}

impl NetworkTopology {
    /// Build the signed incidence matrix C (ne × nn) and its free/fixed
    /// column blocks from an edge list.
    ///
    /// Convention:  `C[e, start] = −1`,  `C[e, end] = +1`.  The free set
    /// is the ordered complement of `fixed` in `0..num_nodes`.
    pub fn from_edges(
        edges: &[(usize, usize)],
        num_nodes: usize,
        fixed: &[usize],
    ) -> Result<Self, DaedalusError> {
        let ne = edges.len();

        for (e, &(s, t)) in edges.iter().enumerate() {
            if s >= num_nodes {
                return Err(DaedalusError::Index { what: "edge start node", index: s, bound: num_nodes });
            }
            if t >= num_nodes {
                return Err(DaedalusError::Index { what: "edge end node", index: t, bound: num_nodes });
            }
            if s == t {
                return Err(DaedalusError::Shape(format!("edge {e} is a self-loop on node {s}")));
            }
        }

        let mut is_fixed = vec![false; num_nodes];
        for &node in fixed {
            if node >= num_nodes {
                return Err(DaedalusError::Index { what: "fixed node", index: node, bound: num_nodes });
            }
            if is_fixed[node] {
                return Err(DaedalusError::Shape(format!("fixed node {node} listed twice")));
            }
            is_fixed[node] = true;
        }
        let free: Vec<usize> = (0..num_nodes).filter(|&i| !is_fixed[i]).collect();

        let mut tri = TriMat::new((ne, num_nodes));
        for (e, &(s, t)) in edges.iter().enumerate() {
            tri.add_triplet(e, s, -1.0);
            tri.add_triplet(e, t, 1.0);
        }
        let incidence = tri.to_csc();

        let free_incidence = extract_columns(&incidence, &free);
        let fixed_incidence = extract_columns(&incidence, fixed);

        Ok(Self {
            free_incidence,
            fixed_incidence,
            num_edges: ne,
            num_nodes,
            edge_starts: edges.iter().map(|&(s, _)| s).collect(),
            edge_ends: edges.iter().map(|&(_, t)| t).collect(),
            free_node_indices: free,
            fixed_node_indices: fixed.to_vec(),
        })
    }
}

/// Extract columns of a CSC matrix by index, preserving the given order.
pub(crate) fn extract_columns(mat: &CsMat<f64>, cols: &[usize]) -> CsMat<f64> {
    let nrows = mat.rows();
    let ncols = cols.len();
    let mut tri = TriMat::new((nrows, ncols));
    let mat_csc = mat.to_csc();
    for (new_col, &old_col) in cols.iter().enumerate() {
        let start = mat_csc.indptr().raw_storage()[old_col];
        let end_ = mat_csc.indptr().raw_storage()[old_col + 1];
        for nz in start..end_ {
            tri.add_triplet(mat_csc.indices()[nz], new_col, mat_csc.data()[nz]);
        }
    }
    tri.to_csc()
}

// ─────────────────────────────────────────────────────────────
//  Force-density result
// ─────────────────────────────────────────────────────────────

/// Derived geometry after a force-density solve.
#[derive(Debug, Clone)]
pub struct FdResult {
    /// Current edge lengths ℓ.
    pub lengths: Vec<f64>,
    /// Axial edge forces  f = q·ℓ.
    pub forces: Vec<f64>,
    /// Unbalanced nodal force  P − CᵀQC·X  (nn × 3).  Vanishes at free
    /// nodes in equilibrium; at fixed nodes it is the support reaction.
    pub residuals: Array2<f64>,
}

// ─────────────────────────────────────────────────────────────
//  Dynamic-relaxation network
// ─────────────────────────────────────────────────────────────

/// Bending-stiff beam triples overlaid on the axial network.
///
/// Each triple names three nodes along a beam; curvature is evaluated at
/// `mids[i]` and the resulting shear couple is spread over all three.
#[derive(Debug, Clone)]
pub struct BeamSet {
    pub starts: Vec<usize>,
    pub mids: Vec<usize>,
    pub ends: Vec<usize>,
    /// Flexural stiffness EIx about the local x axis, one per triple.
    pub stiffness_x: Vec<f64>,
    /// Flexural stiffness EIy about the local y axis, one per triple.
    pub stiffness_y: Vec<f64>,
}

/// A pin-jointed network of axial elements for dynamic relaxation.
///
/// Fixity is expressed through `dof_mask` (0.0 at supported DOFs, 1.0
/// elsewhere) rather than an index partition, so individual components
/// of a node can be restrained independently.  All fields are plain
/// data; `DrxCache::new` validates the shape of the whole set.
#[derive(Debug, Clone)]
pub struct DrxNetwork {
    /// Start node of each edge.
    pub edge_starts: Vec<usize>,
    /// End node of each edge.
    pub edge_ends: Vec<usize>,
    pub num_nodes: usize,
    /// Prestress f0, one per edge.
    pub prestress: Vec<f64>,
    /// Rest length ℓ0, one per edge.
    pub rest_lengths: Vec<f64>,
    /// Axial stiffness k0, one per edge.
    pub stiffnesses: Vec<f64>,
    /// Edges that carry only tension; computed compression is zeroed.
    pub tension_only: Vec<usize>,
    /// Edges that carry only compression; computed tension is zeroed.
    pub compression_only: Vec<usize>,
    /// Lumped nodal mass, one per node.
    pub masses: Vec<f64>,
    /// External nodal loads P  (nn × 3).
    pub loads: Array2<f64>,
    /// Per-DOF constraint mask B  (nn × 3): 0.0 kills the residual at a
    /// supported DOF so its velocity can never change.
    pub dof_mask: Array2<f64>,
    pub beams: Option<BeamSet>,
}

impl DrxNetwork {
    /// Check every cross-array invariant.  Called by [`DrxCache::new`].
    pub fn validate(&self) -> Result<(), DaedalusError> {
        let m = self.edge_starts.len();
        let n = self.num_nodes;

        if self.edge_ends.len() != m {
            return Err(DaedalusError::Shape(format!(
                "edge_starts has {m} entries but edge_ends has {}", self.edge_ends.len(),
            )));
        }
        for (name, len) in [
            ("prestress", self.prestress.len()),
            ("rest_lengths", self.rest_lengths.len()),
            ("stiffnesses", self.stiffnesses.len()),
        ] {
            if len != m {
                return Err(DaedalusError::Shape(format!(
                    "{name} has {len} entries for {m} edges",
                )));
            }
        }
        for &node in self.edge_starts.iter().chain(self.edge_ends.iter()) {
            if node >= n {
                return Err(DaedalusError::Index { what: "edge node", index: node, bound: n });
            }
        }
        for &edge in &self.tension_only {
            if edge >= m {
                return Err(DaedalusError::Index { what: "tension-only edge", index: edge, bound: m });
            }
        }
        for &edge in &self.compression_only {
            if edge >= m {
                return Err(DaedalusError::Index { what: "compression-only edge", index: edge, bound: m });
            }
        }
        if self.masses.len() != n {
            return Err(DaedalusError::Shape(format!(
                "masses has {} entries for {n} nodes", self.masses.len(),
            )));
        }
        for (name, rows, cols) in [
            ("loads", self.loads.nrows(), self.loads.ncols()),
            ("dof_mask", self.dof_mask.nrows(), self.dof_mask.ncols()),
        ] {
            if rows != n || cols != 3 {
                return Err(DaedalusError::Shape(format!(
                    "{name} is {rows} × {cols}, expected {n} × 3",
                )));
            }
        }
        if let Some(beams) = &self.beams {
            let nb = beams.mids.len();
            if beams.starts.len() != nb
                || beams.ends.len() != nb
                || beams.stiffness_x.len() != nb
                || beams.stiffness_y.len() != nb
            {
                return Err(DaedalusError::Shape(format!(
                    "beam arrays disagree: {} starts, {nb} mids, {} ends, {} EIx, {} EIy",
                    beams.starts.len(), beams.ends.len(),
                    beams.stiffness_x.len(), beams.stiffness_y.len(),
                )));
            }
            for &node in beams.starts.iter().chain(beams.mids.iter()).chain(beams.ends.iter()) {
                if node >= n {
                    return Err(DaedalusError::Index { what: "beam node", index: node, bound: n });
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────
//  Dynamic-relaxation options / outcome
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DrxOptions {
    /// Convergence limit on the mean residual force.
    pub tolerance: f64,
    /// Iteration budget; the loop runs at most `max_steps + 1` times.
    pub max_steps: usize,
    /// Emit a one-line report on termination.
    pub summary: bool,
    /// Fictitious-mass multiplier applied to every nodal mass.
    pub mass_factor: f64,
}

impl Default for DrxOptions {
    fn default() -> Self {
        Self {
            tolerance: 1e-3,
            max_steps: 10_000,
            summary: false,
            mass_factor: 1.0,
        }
    }
}

/// Final state of a dynamic-relaxation run.  Running out of steps is not
/// an error: the caller checks `converged` and `residual`.
#[derive(Debug, Clone, Copy)]
pub struct DrxOutcome {
    /// Number of iterations executed.
    pub steps: usize,
    /// Mean residual force at exit.
    pub residual: f64,
    /// `residual ≤ tolerance` at exit.
    pub converged: bool,
    /// Number of kinetic-energy peaks at which velocities were zeroed.
    pub resets: usize,
}

// ─────────────────────────────────────────────────────────────
//  Dynamic-relaxation scratch cache
// ─────────────────────────────────────────────────────────────

/// All per-iteration scratch for [`crate::drx::drx_solve`], sized once
/// from the network and reused across iterations.  Nothing allocates
/// inside the solver loop.
#[derive(Debug, Clone)]
pub struct DrxCache {
    /// Transpose connectivity Cᵀ (nn × ne, CSR): residual assembly walks
    /// its rows with a dense accumulator instead of scattering COO
    /// triples.  Entries are ±1, two per edge.
    pub ct: CsMat<f64>,
    /// Axial force f per edge.
    pub force: Vec<f64>,
    /// Cartesian force components per edge.
    pub force_x: Vec<f64>,
    pub force_y: Vec<f64>,
    pub force_z: Vec<f64>,
    /// Residual accumulators per node.
    pub residual_x: Vec<f64>,
    pub residual_y: Vec<f64>,
    pub residual_z: Vec<f64>,
}

impl DrxCache {
    /// Validate the network and pre-allocate every scratch buffer.
    pub fn new(network: &DrxNetwork) -> Result<Self, DaedalusError> {
        network.validate()?;

        let m = network.edge_starts.len();
        let n = network.num_nodes;

        let mut tri = TriMat::new((n, m));
        for (e, (&s, &t)) in network.edge_starts.iter().zip(&network.edge_ends).enumerate() {
            tri.add_triplet(s, e, -1.0);
            tri.add_triplet(t, e, 1.0);
        }
        let ct = tri.to_csr();

        Ok(Self {
            ct,
            force: vec![0.0; m],
            force_x: vec![0.0; m],
            force_y: vec![0.0; m],
            force_z: vec![0.0; m],
            residual_x: vec![0.0; n],
            residual_y: vec![0.0; n],
            residual_z: vec![0.0; n],
        })
    }
}
