//! Dynamic relaxation with kinetic damping.
//!
//! Explicit pseudo-dynamic integration of a pin-jointed network of axial
//! elements, optionally stiffened by bending-resistant beam triples.
//! One iteration:
//!
//! 1. axial edge forces  f = f0 + k0(ℓ − ℓ0)  and components  (f/ℓ)·d;
//! 2. unilateral correction — tension-only edges drop compression,
//!    compression-only edges drop tension;
//! 3. beam curvature → bending moment → end-shear couples in S;
//! 4. residual assembly  fr = Cᵀf  over the cached CSR connectivity;
//! 5. velocity update  V += R / (M·factor)  under the DOF mask;
//! 6. kinetic damping — when kinetic energy drops below the previous
//!    iteration's, a peak has been passed: restart from rest;
//! 7. advance  X += V.
//!
//! The loop stops when the mean residual falls under `tolerance` or the
//! step budget runs out.  Running out of steps is not an error; the
//! caller inspects [`DrxOutcome::converged`].

use crate::types::{
    BeamSet, DaedalusError, DrxCache, DrxNetwork, DrxOptions, DrxOutcome, Monitor,
};
use crate::vector;
use ndarray::Array2;

// ─────────────────────────────────────────────────────────────
//  Top-level solve
// ─────────────────────────────────────────────────────────────

/// Relax `network` toward static equilibrium, mutating `xyz`,
/// `velocities`, and `shears` in place.
///
/// `shears` is only written when the network carries beams; without
/// them it still enters the residual as a constant internal force, so
/// callers normally pass zeros.  Velocities at masked DOFs are never
/// changed from their input values.
pub fn drx_solve(
    network: &DrxNetwork,
    cache: &mut DrxCache,
    xyz: &mut Array2<f64>,
    velocities: &mut Array2<f64>,
    shears: &mut Array2<f64>,
    opts: &DrxOptions,
    monitor: &mut dyn Monitor,
) -> Result<DrxOutcome, DaedalusError> {
    let n = network.num_nodes;
    let m = network.edge_starts.len();

    for (name, rows, cols) in [
        ("xyz", xyz.nrows(), xyz.ncols()),
        ("velocities", velocities.nrows(), velocities.ncols()),
        ("shears", shears.nrows(), shears.ncols()),
    ] {
        if rows != n || cols != 3 {
            return Err(DaedalusError::Shape(format!(
                "{name} is {rows} × {cols}, expected {n} × 3",
            )));
        }
    }
    if cache.force.len() != m || cache.residual_x.len() != n {
        return Err(DaedalusError::Shape(
            "cache was built for a different network".into(),
        ));
    }

    let mut ts: usize = 0;
    let mut uo = 0.0;
    let mut res = 1000.0 * opts.tolerance;
    let mut resets = 0usize;

    while ts <= opts.max_steps && res > opts.tolerance {
        axial_forces(network, xyz, cache);
        apply_unilateral(network, cache);
        if let Some(beams) = &network.beams {
            beam_shears(beams, xyz, shears);
        }
        assemble_residuals(cache);

        // ── Velocity and energy update ─────────────────────
        let mut un = 0.0;
        let mut rn = 0.0;
        for i in 0..n {
            let rx = (network.loads[[i, 0]] - shears[[i, 0]] - cache.residual_x[i])
                * network.dof_mask[[i, 0]];
            let ry = (network.loads[[i, 1]] - shears[[i, 1]] - cache.residual_y[i])
                * network.dof_mask[[i, 1]];
            let rz = (network.loads[[i, 2]] - shears[[i, 2]] - cache.residual_z[i])
                * network.dof_mask[[i, 2]];

            rn += (rx * rx + ry * ry + rz * rz).sqrt();

            let mi = network.masses[i] * opts.mass_factor;
            velocities[[i, 0]] += rx / mi;
            velocities[[i, 1]] += ry / mi;
            velocities[[i, 2]] += rz / mi;

            un += mi
                * (velocities[[i, 0]] * velocities[[i, 0]]
                    + velocities[[i, 1]] * velocities[[i, 1]]
                    + velocities[[i, 2]] * velocities[[i, 2]]);
        }

        // ── Kinetic damping ────────────────────────────────
        // Energy dropped: the system just passed a kinetic peak.
        // Restart the integration from rest.
        if un < uo {
            velocities.fill(0.0);
            resets += 1;
        }
        uo = un;

        // ── Advance ────────────────────────────────────────
        for i in 0..n {
            xyz[[i, 0]] += velocities[[i, 0]];
            xyz[[i, 1]] += velocities[[i, 1]];
            xyz[[i, 2]] += velocities[[i, 2]];
        }

        res = rn / n as f64;
        monitor.on_step(ts);
        ts += 1;
    }

    if opts.summary {
        eprintln!("Step: {}, Residual: {}", ts.saturating_sub(1), res);
    }

    Ok(DrxOutcome {
        steps: ts,
        residual: res,
        converged: res <= opts.tolerance,
        resets,
    })
}

// ─────────────────────────────────────────────────────────────
//  Per-iteration phases
// ─────────────────────────────────────────────────────────────

/// Axial forces  f = f0 + k0(ℓ − ℓ0)  and Cartesian components  (f/ℓ)·d.
fn axial_forces(network: &DrxNetwork, xyz: &Array2<f64>, cache: &mut DrxCache) {
    for i in 0..network.edge_starts.len() {
        let s = network.edge_starts[i];
        let e = network.edge_ends[i];

        let dx = xyz[[e, 0]] - xyz[[s, 0]];
        let dy = xyz[[e, 1]] - xyz[[s, 1]];
        let dz = xyz[[e, 2]] - xyz[[s, 2]];
        let l = (dx * dx + dy * dy + dz * dz).sqrt();

        let f = network.prestress[i] + network.stiffnesses[i] * (l - network.rest_lengths[i]);
        let q = f / l;

        cache.force[i] = f;
        cache.force_x[i] = q * dx;
        cache.force_y[i] = q * dy;
        cache.force_z[i] = q * dz;
    }
}

/// Zero the force components of unilateral edges carrying the wrong sign.
fn apply_unilateral(network: &DrxNetwork, cache: &mut DrxCache) {
    for &i in &network.tension_only {
        if cache.force[i] < 0.0 {
            cache.force_x[i] = 0.0;
            cache.force_y[i] = 0.0;
            cache.force_z[i] = 0.0;
        }
    }
    for &i in &network.compression_only {
        if cache.force[i] > 0.0 {
            cache.force_x[i] = 0.0;
            cache.force_y[i] = 0.0;
            cache.force_z[i] = 0.0;
        }
    }
}

/// Curvature-based bending shears, rebuilt into `shears` from scratch.
///
/// Per triple (s, i, f): the angle subtended at the middle node gives
/// the curvature  κ = 2·sin(α)/‖Xf − Xs‖;  the curvature vector is
/// resolved in the local frame spanned by the plane normal Qn and the
/// mid-chord μ, weighted by the flexural stiffnesses, and converted
/// into a self-equilibrated shear couple on the three nodes.  Triples
/// with a degenerate frame (colinear nodes, vanishing moment couple)
/// produce non-finite shears and are skipped so they cannot
/// contaminate S.
fn beam_shears(beams: &BeamSet, xyz: &Array2<f64>, shears: &mut Array2<f64>) {
    shears.fill(0.0);

    for i in 0..beams.mids.len() {
        let xs = node(xyz, beams.starts[i]);
        let xi = node(xyz, beams.mids[i]);
        let xf = node(xyz, beams.ends[i]);

        let qa = vector::subtract(&xi, &xs);
        let qb = vector::subtract(&xf, &xi);
        let qc = vector::subtract(&xf, &xs);
        let qn = vector::cross(&qa, &qb);
        let mut mu = vector::subtract(&xf, &xs);
        vector::scale(&mut mu, 0.5);

        let la = vector::length(&qa);
        let lb = vector::length(&qb);
        let lc = vector::length(&qc);
        let l_qn = vector::length(&qn);
        let l_mu = vector::length(&mu);

        let alpha = ((la * la + lb * lb - lc * lc) / (2.0 * la * lb)).acos();
        let kappa = 2.0 * alpha.sin() / lc;

        // Local frame: ex along the plane normal, ez along the mid-chord.
        let mut ex = qn;
        vector::scale(&mut ex, 1.0 / l_qn);
        let mut ez = mu;
        vector::scale(&mut ez, 1.0 / l_mu);
        let ey = vector::cross(&ez, &ex);

        // Bending moment from the stiffness-weighted curvature components.
        let mut k = qn;
        vector::scale(&mut k, kappa / l_qn);
        let mut kx = ex;
        vector::scale(&mut kx, vector::dot(&k, &ex) * beams.stiffness_x[i]);
        let mut ky = ey;
        vector::scale(&mut ky, vector::dot(&k, &ey) * beams.stiffness_y[i]);
        let mc = vector::add(&kx, &ky);

        // Shear directions and lever arms on either side of the middle node.
        let mut ua = vector::cross(&mc, &qa);
        let mut ub = vector::cross(&mc, &qb);
        vector::normalize(&mut ua);
        vector::normalize(&mut ub);
        let c1 = vector::cross(&qa, &ua);
        let c2 = vector::cross(&qb, &ub);

        let ms = vector::length_squared(&mc);
        vector::scale(&mut ua, ms * vector::length(&c1) / (la * vector::dot(&mc, &c1)));
        vector::scale(&mut ub, ms * vector::length(&c2) / (lb * vector::dot(&mc, &c2)));

        if ua.iter().chain(ub.iter()).any(|c| !c.is_finite()) {
            continue;
        }

        let (s, mid, e) = (beams.starts[i], beams.mids[i], beams.ends[i]);
        for d in 0..3 {
            shears[[s, d]] += ua[d];
            shears[[mid, d]] -= ua[d] + ub[d];
            shears[[e, d]] += ub[d];
        }
    }
}

/// fr ← Cᵀf componentwise: one dense accumulator per CSR row.
fn assemble_residuals(cache: &mut DrxCache) {
    for (row, row_vec) in cache.ct.outer_iterator().enumerate() {
        let mut fx = 0.0;
        let mut fy = 0.0;
        let mut fz = 0.0;
        for (col, &val) in row_vec.iter() {
            fx += val * cache.force_x[col];
            fy += val * cache.force_y[col];
            fz += val * cache.force_z[col];
        }
        cache.residual_x[row] = fx;
        cache.residual_y[row] = fy;
        cache.residual_z[row] = fz;
    }
}

#[inline]
fn node(xyz: &Array2<f64>, i: usize) -> [f64; 3] {
    [xyz[[i, 0]], xyz[[i, 1]], xyz[[i, 2]]]
}
