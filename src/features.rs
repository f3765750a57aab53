//! Per-event feature extraction for the classifier.

use itertools::{izip, Itertools};
use thiserror::Error;

use crate::four_vector::{
    Constituents, FourVector, FourVectorError, GenParticles, LargeJet, LargeJets, SmallJets,
};
use crate::kinematics::{delta_phi, delta_r, invariant_mass, transverse_mass};
use crate::record::{Branch, Event, RecordError};

/// All generator-level objects must lie within this separation of the
/// selected jet for a signal event to count as truth-matched.
pub const TRUTH_MATCH_MAX_DR: f64 = 1.5;
/// Numeric identifier of the heavy mediator.
pub const MEDIATOR_PDG_ID: i64 = 4_900_023;
/// Numeric identifier of the dark-quark daughters.
pub const DARK_QUARK_PDG_ID: i64 = 4_900_101;
/// Generator status required of the dark-quark daughters.
pub const DARK_QUARK_STATUS: i64 = 71;
/// Which constituent-offset entry is carried into the signal schema.
const CONSTITUENT_FEATURE_INDEX: usize = 2;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    FourVector(#[from] FourVectorError),
    #[error("no object at index {index} in the {collection} collection")]
    MissingObject {
        collection: &'static str,
        index: usize,
    },
    #[error("expected a row of width {expected}, got {found}")]
    SchemaMismatch { expected: usize, found: usize },
}

/// The sub-leading large-radius jet together with its derived observables.
#[derive(Debug, Clone)]
pub struct SubleadingJet {
    pub jet: LargeJet,
    /// `sqrt(1 + MET / pt)`.
    pub rt: f64,
    /// Wrapped azimuthal distance from the jet to the MET direction.
    pub met_dphi: f64,
    pub mt: f64,
    pub mass: f64,
}

/// Reconstruct the sub-leading large-radius jet and its kinematic features.
///
/// `mt` is computed against the raw MET and MET-phi; folding the azimuthal
/// distance in first was tried and skews the spectrum, so it stays off.
pub fn subleading_jet(event: &Event) -> Result<SubleadingJet, FeatureError> {
    let jets = LargeJets::from_event(event)?;
    let jet = jets.jet(1).ok_or(FeatureError::MissingObject {
        collection: "large-radius jet",
        index: 1,
    })?;
    let met = event.float(Branch::Met)?;
    let met_phi = event.float(Branch::MetPhi)?;
    let rt = (1.0 + met / jet.p4.pt).sqrt();
    let met_dphi = delta_phi(jet.p4.phi, met_phi);
    let mt = transverse_mass(&jet.p4, met, met_phi);
    let mass = invariant_mass(&jet.p4);
    Ok(SubleadingJet {
        jet,
        rt,
        met_dphi,
        mt,
        mass,
    })
}

/// Parton flavor of the small-radius jet closest in angle to `jet`.
pub fn closest_small_jet_flavor(event: &Event, jet: &FourVector) -> Result<i64, FeatureError> {
    let small_jets = SmallJets::from_event(event)?;
    let separations = small_jets.delta_r_to(jet.eta, jet.phi);
    let closest = separations
        .iter()
        .copied()
        .position_min_by(f64::total_cmp)
        .ok_or(FeatureError::MissingObject {
            collection: "small-radius jet",
            index: 0,
        })?;
    Ok(small_jets.aux.parton_flavor[closest])
}

/// The constituent-offset entry carried into the signal schema.
pub fn constituent_offset(event: &Event) -> Result<i64, FeatureError> {
    let constituents = Constituents::from_event(event)?;
    constituents
        .offset(CONSTITUENT_FEATURE_INDEX)
        .ok_or(FeatureError::MissingObject {
            collection: "jet constituent",
            index: CONSTITUENT_FEATURE_INDEX,
        })
}

/// Check that the event's generator record matches the signal topology
/// around `jet`: one mediator, exactly two dark-quark daughters at the
/// required status, all three within [`TRUTH_MATCH_MAX_DR`] of the jet.
///
/// A failed match is a normal negative outcome (`Ok(false)`), never an
/// error; it excludes the event from the output without counting as a
/// preselection failure.
pub fn truth_match(event: &Event, jet: &FourVector) -> Result<bool, FeatureError> {
    let particles = GenParticles::from_event(event)?;

    let is_mediator: Vec<bool> = particles
        .aux
        .pdg_id
        .iter()
        .map(|id| *id == MEDIATOR_PDG_ID)
        .collect();
    let mediators = particles.mask(&is_mediator)?;
    let Some(mediator) = mediators.get(0) else {
        return Ok(false);
    };

    let is_daughter: Vec<bool> = izip!(&particles.aux.pdg_id, &particles.aux.status)
        .map(|(id, status)| id.abs() == DARK_QUARK_PDG_ID && *status == DARK_QUARK_STATUS)
        .collect();
    let daughters = particles.mask(&is_daughter)?;
    if daughters.len() != 2 {
        return Ok(false);
    }

    let mut objects = vec![mediator];
    objects.extend((0..daughters.len()).filter_map(|i| daughters.get(i)));
    Ok(objects
        .iter()
        .all(|p| delta_r(jet.eta, jet.phi, p.eta, p.phi) < TRUTH_MATCH_MAX_DR))
}

/// Column order of the signal feature schema.
pub const SIGNAL_COLUMNS: [&str; 21] = [
    "girth",
    "axisminor",
    "ecfM2b1",
    "ecfD2b1",
    "ecfC2b1",
    "ecfN2b2",
    "metdphi",
    "ptD",
    "multiplicity",
    "axismajor",
    "constituents_offset",
    "parton_flavor",
    "pt",
    "eta",
    "phi",
    "energy",
    "rt",
    "mt",
    "met",
    "softdrop_mass",
    "mass",
];

/// Column order of the background feature schema.
pub const BACKGROUND_COLUMNS: [&str; 17] = [
    "ptD",
    "axismajor",
    "multiplicity",
    "girth",
    "axisminor",
    "metdphi",
    "ecfM2b1",
    "ecfD2b1",
    "ecfC2b1",
    "ecfN2b2",
    "parton_flavor",
    "pt",
    "eta",
    "phi",
    "energy",
    "rt",
    "mt",
];

fn signal_row(
    subleading: &SubleadingJet,
    parton_flavor: i64,
    constituent_offset: i64,
    met: f64,
) -> [f64; 21] {
    let jet = &subleading.jet;
    [
        jet.girth,
        jet.axis_minor,
        jet.ecf_m2b1,
        jet.ecf_d2b1,
        jet.ecf_c2b1,
        jet.ecf_n2b2,
        subleading.met_dphi,
        jet.pt_d,
        jet.multiplicity,
        jet.axis_major,
        constituent_offset as f64,
        parton_flavor as f64,
        jet.p4.pt,
        jet.p4.eta,
        jet.p4.phi,
        jet.p4.energy,
        subleading.rt,
        subleading.mt,
        met,
        jet.soft_drop_mass,
        subleading.mass,
    ]
}

fn background_row(subleading: &SubleadingJet, parton_flavor: i64) -> [f64; 17] {
    let jet = &subleading.jet;
    [
        jet.pt_d,
        jet.axis_major,
        jet.multiplicity,
        jet.girth,
        jet.axis_minor,
        subleading.met_dphi,
        jet.ecf_m2b1,
        jet.ecf_d2b1,
        jet.ecf_c2b1,
        jet.ecf_n2b2,
        parton_flavor as f64,
        jet.p4.pt,
        jet.p4.eta,
        jet.p4.phi,
        jet.p4.energy,
        subleading.rt,
        subleading.mt,
    ]
}

/// Compute the background feature row for one preselected event.
pub fn background_features(event: &Event) -> Result<[f64; 17], FeatureError> {
    let subleading = subleading_jet(event)?;
    let parton_flavor = closest_small_jet_flavor(event, &subleading.jet.p4)?;
    Ok(background_row(&subleading, parton_flavor))
}

/// Compute the signal feature row for one preselected event, or `None` when
/// the generator record fails truth-matching.
pub fn signal_features(event: &Event) -> Result<Option<[f64; 21]>, FeatureError> {
    let subleading = subleading_jet(event)?;
    if !truth_match(event, &subleading.jet.p4)? {
        return Ok(None);
    }
    let parton_flavor = closest_small_jet_flavor(event, &subleading.jet.p4)?;
    let offset = constituent_offset(event)?;
    let met = event.float(Branch::Met)?;
    Ok(Some(signal_row(&subleading, parton_flavor, offset, met)))
}

/// An in-memory batch of feature rows with one fixed column schema.
///
/// The buffer is owned by the processing loop that fills it and is flushed
/// at a unit boundary; it is never shared across input units.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    width: usize,
    data: Vec<f64>,
}

impl RowBuffer {
    pub fn new(width: usize) -> Self {
        Self {
            width,
            data: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows accumulated so far.
    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, row: &[f64]) -> Result<(), FeatureError> {
        if row.len() != self.width {
            return Err(FeatureError::SchemaMismatch {
                expected: self.width,
                found: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.width)
    }

    /// The row-major backing storage.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_buffer_enforces_its_schema() {
        let mut buffer = RowBuffer::new(3);
        buffer.push(&[1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(
            buffer.push(&[1.0, 2.0]),
            Err(FeatureError::SchemaMismatch {
                expected: 3,
                found: 2
            })
        ));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.rows().next().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn schemas_match_their_column_lists() {
        assert_eq!(SIGNAL_COLUMNS.len(), 21);
        assert_eq!(BACKGROUND_COLUMNS.len(), 17);
    }
}
