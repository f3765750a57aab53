//! Stateless kinematic math shared by the selection and feature paths.
//!
//! All mass-like quantities follow one policy for unphysical inputs: the
//! radicand is handed to the real [`f64::sqrt`] as-is, so a negative value
//! yields NaN rather than a panic or a complex number. Callers that need to
//! exclude unphysical events should test the result with
//! [`f64::is_finite`].

use std::f64::consts::{PI, TAU};

use crate::four_vector::FourVector;

/// Difference `phi1 - phi2` wrapped into `(-pi, pi]`.
///
/// The raw difference is first mapped to `[0, 2pi)` and then shifted down by
/// `2pi` when it exceeds `pi`, so the result is antisymmetric under swapping
/// the arguments (up to the sign convention exactly at `pi`).
pub fn delta_phi(phi1: f64, phi2: f64) -> f64 {
    // Map to 0..2pi, then pi..2pi --> -pi..0
    let wrapped = (phi1 - phi2).rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Element-aligned form of [`delta_phi`]: one wrapped difference per entry of
/// `phis` against a common second angle.
pub fn delta_phi_each(phis: &[f64], phi: f64) -> Vec<f64> {
    phis.iter().map(|phi1| delta_phi(*phi1, phi)).collect()
}

/// Angular separation `sqrt(deta^2 + dphi^2)`; symmetric in its two points.
pub fn delta_r(eta1: f64, phi1: f64, eta2: f64, phi2: f64) -> f64 {
    ((eta1 - eta2).powi(2) + delta_phi(phi1, phi2).powi(2)).sqrt()
}

/// Transverse mass of `jet` against the missing transverse momentum,
/// taken at its raw azimuth `met_phi`.
///
/// Computes `sqrt((Et + met)^2 - (px + metx)^2 - (py + mety)^2)` with
/// `Et = sqrt(E^2 - pz^2)`. NaN on a negative radicand.
pub fn transverse_mass(jet: &FourVector, met: f64, met_phi: f64) -> f64 {
    let met_x = met_phi.cos() * met;
    let met_y = met_phi.sin() * met;
    let transverse_e = (jet.energy.powi(2) - jet.pz().powi(2)).sqrt();
    ((transverse_e + met).powi(2) - (jet.px() + met_x).powi(2) - (jet.py() + met_y).powi(2))
        .sqrt()
}

/// Invariant mass `sqrt(E^2 - |p|^2)`. NaN on a negative radicand.
pub fn invariant_mass(jet: &FourVector) -> f64 {
    (jet.energy.powi(2) - jet.momentum().norm_squared()).sqrt()
}

/// How the missing transverse momentum is folded into a jet-plus-MET mass.
///
/// These are experimental alternates kept for spectrum studies; the
/// extraction pipeline itself only uses [`transverse_mass`] and
/// [`invariant_mass`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MetMassScheme {
    /// MET treated as a massless vector with no longitudinal component.
    MasslessMet,
    /// MET carried at the jet's longitudinal momentum.
    MetWithPz,
    /// As [`MetMassScheme::MetWithPz`], with the visible mass also assigned
    /// to the MET leg.
    MetWithPzAndMass,
}

/// Jet-plus-MET invariant mass under the approximation picked by `scheme`.
/// NaN on a negative radicand.
pub fn met_corrected_mass(jet: &FourVector, met: f64, met_phi: f64, scheme: MetMassScheme) -> f64 {
    let visible = invariant_mass(jet);
    let cos_dphi = delta_phi(jet.phi, met_phi).cos();
    let pt2 = jet.pt.powi(2);
    let pz2 = jet.pz().powi(2);
    let visible_e2 = pz2 + pt2 + visible.powi(2);
    let m2 = match scheme {
        MetMassScheme::MasslessMet => {
            visible.powi(2) + 2.0 * met * visible_e2.sqrt() - 2.0 * jet.pt * met * cos_dphi
        }
        MetMassScheme::MetWithPz => {
            visible.powi(2) + 2.0 * (met.powi(2) + pz2).sqrt() * visible_e2.sqrt()
                - 2.0 * (jet.pt * met * cos_dphi + pz2)
        }
        MetMassScheme::MetWithPzAndMass => {
            2.0 * visible.powi(2)
                + 2.0 * (met.powi(2) + pz2 + visible.powi(2)).sqrt() * visible_e2.sqrt()
                - 2.0 * (jet.pt * met * cos_dphi + pz2)
        }
    };
    m2.sqrt()
}
