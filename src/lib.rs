//! **Daedalus** — numerical core of a structural form-finding toolkit.
//!
//! Three independent solvers share a network data model and a small
//! 3-vector kernel:
//!
//! 1. **Force density** (`fdm`): assemble the reduced system A(q) = CᵢᵀQCᵢ,
//!    solve it with a column-pivoted QR, scatter the free-node coordinates.
//! 2. **Dynamic relaxation** (`drx`): explicit pseudo-dynamic integration
//!    with kinetic damping, unilateral elements, and beam bending.
//! 3. **Centroid smoothing** (`smoothing`): Jacobi-style Laplacian
//!    averaging of free vertices over an adjacency list.
//!
//! The caller owns every array; solvers mutate coordinates (and, for
//! dynamic relaxation, velocities and shears) in place and keep no state
//! between invocations.

pub mod types;
pub mod vector;
pub mod smoothing;
pub mod fdm;
pub mod drx;
