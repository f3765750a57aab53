use itertools::izip;
use nalgebra::Vector3;
use thiserror::Error;

use crate::kinematics::delta_r;
use crate::record::{Branch, Event, RecordError};

#[derive(Error, Debug)]
pub enum FourVectorError {
    #[error("component arrays must share one length: pt={pt}, eta={eta}, phi={phi}, energy={energy}")]
    ComponentMismatch {
        pt: usize,
        eta: usize,
        phi: usize,
        energy: usize,
    },
    #[error("auxiliary column {name:?} has length {found}, expected {expected}")]
    AuxiliaryMismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("selector of length {selector} cannot apply to a collection of {objects} objects")]
    SelectorMismatch { selector: usize, objects: usize },
    #[error("index {index} out of bounds for a collection of {objects} objects")]
    OutOfBounds { index: usize, objects: usize },
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// One reconstructed object in detector coordinates.
///
/// Stored as `(pt, eta, phi, E)`; the Cartesian momentum components are
/// derived on access:
/// `px = pt cos(phi)`, `py = pt sin(phi)`, `pz = pt sinh(eta)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FourVector {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub energy: f64,
}

impl FourVector {
    pub fn px(&self) -> f64 {
        self.phi.cos() * self.pt
    }

    pub fn py(&self) -> f64 {
        self.phi.sin() * self.pt
    }

    pub fn pz(&self) -> f64 {
        self.eta.sinh() * self.pt
    }

    /// The 3-momentum as a [`nalgebra::Vector3<f64>`].
    pub fn momentum(&self) -> Vector3<f64> {
        Vector3::new(self.px(), self.py(), self.pz())
    }
}

/// Auxiliary per-object columns carried alongside the four-vector
/// components of a collection. Implementations keep their columns
/// element-aligned with the kinematic arrays under every selection.
pub trait AuxColumns: Sized {
    fn validate(&self, objects: usize) -> Result<(), FourVectorError>;
    fn mask(&self, keep: &[bool]) -> Self;
    fn take(&self, indices: &[usize]) -> Self;
}

impl AuxColumns for () {
    fn validate(&self, _objects: usize) -> Result<(), FourVectorError> {
        Ok(())
    }

    fn mask(&self, _keep: &[bool]) -> Self {}

    fn take(&self, _indices: &[usize]) -> Self {}
}

fn filter_floats(values: &[f64], keep: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(keep.iter())
        .filter_map(|(v, k)| k.then_some(*v))
        .collect()
}

fn filter_ints(values: &[i64], keep: &[bool]) -> Vec<i64> {
    values
        .iter()
        .zip(keep.iter())
        .filter_map(|(v, k)| k.then_some(*v))
        .collect()
}

fn pick_floats(values: &[f64], indices: &[usize]) -> Vec<f64> {
    indices.iter().map(|i| values[*i]).collect()
}

fn pick_ints(values: &[i64], indices: &[usize]) -> Vec<i64> {
    indices.iter().map(|i| values[*i]).collect()
}

/// An ordered collection of N objects with mandatory `(pt, eta, phi, E)`
/// components plus a tagged set of auxiliary columns.
///
/// Constructed fresh from an [`Event`] for each event and discarded after
/// feature extraction. Construction validates that every array, auxiliary
/// columns included, has the same length; a mismatch is a data-integrity
/// error, never a silent misalignment. Selection returns a new collection
/// and preserves object order; derived quantities are computed on demand so
/// they always reflect the current selection.
#[derive(Debug, Clone)]
pub struct FourVectorCollection<A> {
    pt: Vec<f64>,
    eta: Vec<f64>,
    phi: Vec<f64>,
    energy: Vec<f64>,
    pub aux: A,
}

impl<A: AuxColumns> FourVectorCollection<A> {
    pub fn new(
        pt: Vec<f64>,
        eta: Vec<f64>,
        phi: Vec<f64>,
        energy: Vec<f64>,
        aux: A,
    ) -> Result<Self, FourVectorError> {
        if pt.len() != eta.len() || pt.len() != phi.len() || pt.len() != energy.len() {
            return Err(FourVectorError::ComponentMismatch {
                pt: pt.len(),
                eta: eta.len(),
                phi: phi.len(),
                energy: energy.len(),
            });
        }
        aux.validate(pt.len())?;
        Ok(Self {
            pt,
            eta,
            phi,
            energy,
            aux,
        })
    }

    pub fn len(&self) -> usize {
        self.pt.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pt.is_empty()
    }

    pub fn pt(&self) -> &[f64] {
        &self.pt
    }

    pub fn eta(&self) -> &[f64] {
        &self.eta
    }

    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    pub fn px(&self) -> Vec<f64> {
        izip!(&self.pt, &self.phi).map(|(pt, phi)| phi.cos() * pt).collect()
    }

    pub fn py(&self) -> Vec<f64> {
        izip!(&self.pt, &self.phi).map(|(pt, phi)| phi.sin() * pt).collect()
    }

    pub fn pz(&self) -> Vec<f64> {
        izip!(&self.pt, &self.eta).map(|(pt, eta)| eta.sinh() * pt).collect()
    }

    pub fn get(&self, index: usize) -> Option<FourVector> {
        if index >= self.len() {
            return None;
        }
        Some(FourVector {
            pt: self.pt[index],
            eta: self.eta[index],
            phi: self.phi[index],
            energy: self.energy[index],
        })
    }

    /// Keep the objects where `keep` is true; auxiliary columns follow.
    pub fn mask(&self, keep: &[bool]) -> Result<Self, FourVectorError> {
        if keep.len() != self.len() {
            return Err(FourVectorError::SelectorMismatch {
                selector: keep.len(),
                objects: self.len(),
            });
        }
        Ok(Self {
            pt: filter_floats(&self.pt, keep),
            eta: filter_floats(&self.eta, keep),
            phi: filter_floats(&self.phi, keep),
            energy: filter_floats(&self.energy, keep),
            aux: self.aux.mask(keep),
        })
    }

    /// Subset/reorder by position; auxiliary columns follow.
    pub fn take(&self, indices: &[usize]) -> Result<Self, FourVectorError> {
        for index in indices {
            if *index >= self.len() {
                return Err(FourVectorError::OutOfBounds {
                    index: *index,
                    objects: self.len(),
                });
            }
        }
        Ok(Self {
            pt: pick_floats(&self.pt, indices),
            eta: pick_floats(&self.eta, indices),
            phi: pick_floats(&self.phi, indices),
            energy: pick_floats(&self.energy, indices),
            aux: self.aux.take(indices),
        })
    }

    /// Angular separation of each object from the point `(eta, phi)`.
    pub fn delta_r_to(&self, eta: f64, phi: f64) -> Vec<f64> {
        izip!(&self.eta, &self.phi)
            .map(|(obj_eta, obj_phi)| delta_r(*obj_eta, *obj_phi, eta, phi))
            .collect()
    }
}

/// The full substructure observable set of the large-radius jet collection:
/// the fourteen energy-correlation functions plus shape variables.
#[derive(Debug, Clone, Default)]
pub struct JetSubstructure {
    pub ecf_c2b1: Vec<f64>,
    pub ecf_c2b2: Vec<f64>,
    pub ecf_c3b1: Vec<f64>,
    pub ecf_c3b2: Vec<f64>,
    pub ecf_d2b1: Vec<f64>,
    pub ecf_d2b2: Vec<f64>,
    pub ecf_m2b1: Vec<f64>,
    pub ecf_m2b2: Vec<f64>,
    pub ecf_m3b1: Vec<f64>,
    pub ecf_m3b2: Vec<f64>,
    pub ecf_n2b1: Vec<f64>,
    pub ecf_n2b2: Vec<f64>,
    pub ecf_n3b1: Vec<f64>,
    pub ecf_n3b2: Vec<f64>,
    pub multiplicity: Vec<f64>,
    pub girth: Vec<f64>,
    pub pt_d: Vec<f64>,
    pub axis_major: Vec<f64>,
    pub axis_minor: Vec<f64>,
    pub soft_drop_mass: Vec<f64>,
}

impl JetSubstructure {
    fn columns(&self) -> [(&'static str, &Vec<f64>); 20] {
        [
            ("ecfC2b1", &self.ecf_c2b1),
            ("ecfC2b2", &self.ecf_c2b2),
            ("ecfC3b1", &self.ecf_c3b1),
            ("ecfC3b2", &self.ecf_c3b2),
            ("ecfD2b1", &self.ecf_d2b1),
            ("ecfD2b2", &self.ecf_d2b2),
            ("ecfM2b1", &self.ecf_m2b1),
            ("ecfM2b2", &self.ecf_m2b2),
            ("ecfM3b1", &self.ecf_m3b1),
            ("ecfM3b2", &self.ecf_m3b2),
            ("ecfN2b1", &self.ecf_n2b1),
            ("ecfN2b2", &self.ecf_n2b2),
            ("ecfN3b1", &self.ecf_n3b1),
            ("ecfN3b2", &self.ecf_n3b2),
            ("multiplicity", &self.multiplicity),
            ("girth", &self.girth),
            ("ptD", &self.pt_d),
            ("axismajor", &self.axis_major),
            ("axisminor", &self.axis_minor),
            ("softDropMass", &self.soft_drop_mass),
        ]
    }
}

impl AuxColumns for JetSubstructure {
    fn validate(&self, objects: usize) -> Result<(), FourVectorError> {
        for (name, column) in self.columns() {
            if column.len() != objects {
                return Err(FourVectorError::AuxiliaryMismatch {
                    name,
                    expected: objects,
                    found: column.len(),
                });
            }
        }
        Ok(())
    }

    fn mask(&self, keep: &[bool]) -> Self {
        Self {
            ecf_c2b1: filter_floats(&self.ecf_c2b1, keep),
            ecf_c2b2: filter_floats(&self.ecf_c2b2, keep),
            ecf_c3b1: filter_floats(&self.ecf_c3b1, keep),
            ecf_c3b2: filter_floats(&self.ecf_c3b2, keep),
            ecf_d2b1: filter_floats(&self.ecf_d2b1, keep),
            ecf_d2b2: filter_floats(&self.ecf_d2b2, keep),
            ecf_m2b1: filter_floats(&self.ecf_m2b1, keep),
            ecf_m2b2: filter_floats(&self.ecf_m2b2, keep),
            ecf_m3b1: filter_floats(&self.ecf_m3b1, keep),
            ecf_m3b2: filter_floats(&self.ecf_m3b2, keep),
            ecf_n2b1: filter_floats(&self.ecf_n2b1, keep),
            ecf_n2b2: filter_floats(&self.ecf_n2b2, keep),
            ecf_n3b1: filter_floats(&self.ecf_n3b1, keep),
            ecf_n3b2: filter_floats(&self.ecf_n3b2, keep),
            multiplicity: filter_floats(&self.multiplicity, keep),
            girth: filter_floats(&self.girth, keep),
            pt_d: filter_floats(&self.pt_d, keep),
            axis_major: filter_floats(&self.axis_major, keep),
            axis_minor: filter_floats(&self.axis_minor, keep),
            soft_drop_mass: filter_floats(&self.soft_drop_mass, keep),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            ecf_c2b1: pick_floats(&self.ecf_c2b1, indices),
            ecf_c2b2: pick_floats(&self.ecf_c2b2, indices),
            ecf_c3b1: pick_floats(&self.ecf_c3b1, indices),
            ecf_c3b2: pick_floats(&self.ecf_c3b2, indices),
            ecf_d2b1: pick_floats(&self.ecf_d2b1, indices),
            ecf_d2b2: pick_floats(&self.ecf_d2b2, indices),
            ecf_m2b1: pick_floats(&self.ecf_m2b1, indices),
            ecf_m2b2: pick_floats(&self.ecf_m2b2, indices),
            ecf_m3b1: pick_floats(&self.ecf_m3b1, indices),
            ecf_m3b2: pick_floats(&self.ecf_m3b2, indices),
            ecf_n2b1: pick_floats(&self.ecf_n2b1, indices),
            ecf_n2b2: pick_floats(&self.ecf_n2b2, indices),
            ecf_n3b1: pick_floats(&self.ecf_n3b1, indices),
            ecf_n3b2: pick_floats(&self.ecf_n3b2, indices),
            multiplicity: pick_floats(&self.multiplicity, indices),
            girth: pick_floats(&self.girth, indices),
            pt_d: pick_floats(&self.pt_d, indices),
            axis_major: pick_floats(&self.axis_major, indices),
            axis_minor: pick_floats(&self.axis_minor, indices),
            soft_drop_mass: pick_floats(&self.soft_drop_mass, indices),
        }
    }
}

/// Parton-flavor tag of the small-radius jet collection.
#[derive(Debug, Clone, Default)]
pub struct PartonFlavor {
    pub parton_flavor: Vec<i64>,
}

impl AuxColumns for PartonFlavor {
    fn validate(&self, objects: usize) -> Result<(), FourVectorError> {
        if self.parton_flavor.len() != objects {
            return Err(FourVectorError::AuxiliaryMismatch {
                name: "partonFlavor",
                expected: objects,
                found: self.parton_flavor.len(),
            });
        }
        Ok(())
    }

    fn mask(&self, keep: &[bool]) -> Self {
        Self {
            parton_flavor: filter_ints(&self.parton_flavor, keep),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            parton_flavor: pick_ints(&self.parton_flavor, indices),
        }
    }
}

/// Generator-level particle identity and status codes.
#[derive(Debug, Clone, Default)]
pub struct GenId {
    pub pdg_id: Vec<i64>,
    pub status: Vec<i64>,
}

impl AuxColumns for GenId {
    fn validate(&self, objects: usize) -> Result<(), FourVectorError> {
        for (name, column) in [("PdgId", &self.pdg_id), ("Status", &self.status)] {
            if column.len() != objects {
                return Err(FourVectorError::AuxiliaryMismatch {
                    name,
                    expected: objects,
                    found: column.len(),
                });
            }
        }
        Ok(())
    }

    fn mask(&self, keep: &[bool]) -> Self {
        Self {
            pdg_id: filter_ints(&self.pdg_id, keep),
            status: filter_ints(&self.status, keep),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            pdg_id: pick_ints(&self.pdg_id, indices),
            status: pick_ints(&self.status, indices),
        }
    }
}

/// Per-entry offsets of the large-radius jet constituents.
#[derive(Debug, Clone, Default)]
pub struct ConstituentOffsets {
    pub offsets: Vec<i64>,
}

impl AuxColumns for ConstituentOffsets {
    fn validate(&self, objects: usize) -> Result<(), FourVectorError> {
        if self.offsets.len() != objects {
            return Err(FourVectorError::AuxiliaryMismatch {
                name: "constituentsOffsets",
                expected: objects,
                found: self.offsets.len(),
            });
        }
        Ok(())
    }

    fn mask(&self, keep: &[bool]) -> Self {
        Self {
            offsets: filter_ints(&self.offsets, keep),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        Self {
            offsets: pick_ints(&self.offsets, indices),
        }
    }
}

pub type LargeJets = FourVectorCollection<JetSubstructure>;
pub type SmallJets = FourVectorCollection<PartonFlavor>;
pub type GenParticles = FourVectorCollection<GenId>;
pub type Constituents = FourVectorCollection<ConstituentOffsets>;

/// A single large-radius jet with the substructure observables the feature
/// schema reads.
#[derive(Debug, Clone)]
pub struct LargeJet {
    pub p4: FourVector,
    pub ecf_c2b1: f64,
    pub ecf_d2b1: f64,
    pub ecf_m2b1: f64,
    pub ecf_n2b2: f64,
    pub multiplicity: f64,
    pub girth: f64,
    pub pt_d: f64,
    pub axis_major: f64,
    pub axis_minor: f64,
    pub soft_drop_mass: f64,
}

impl LargeJets {
    /// Build the large-radius jet collection with its full auxiliary
    /// observable set.
    ///
    /// # Errors
    /// Fails if a required branch is absent or mistyped, or if any column
    /// length disagrees with the jet count.
    pub fn from_event(event: &Event) -> Result<Self, FourVectorError> {
        Self::new(
            event.floats(Branch::LargeJetPt)?.to_vec(),
            event.floats(Branch::LargeJetEta)?.to_vec(),
            event.floats(Branch::LargeJetPhi)?.to_vec(),
            event.floats(Branch::LargeJetEnergy)?.to_vec(),
            JetSubstructure {
                ecf_c2b1: event.floats(Branch::EcfC2b1)?.to_vec(),
                ecf_c2b2: event.floats(Branch::EcfC2b2)?.to_vec(),
                ecf_c3b1: event.floats(Branch::EcfC3b1)?.to_vec(),
                ecf_c3b2: event.floats(Branch::EcfC3b2)?.to_vec(),
                ecf_d2b1: event.floats(Branch::EcfD2b1)?.to_vec(),
                ecf_d2b2: event.floats(Branch::EcfD2b2)?.to_vec(),
                ecf_m2b1: event.floats(Branch::EcfM2b1)?.to_vec(),
                ecf_m2b2: event.floats(Branch::EcfM2b2)?.to_vec(),
                ecf_m3b1: event.floats(Branch::EcfM3b1)?.to_vec(),
                ecf_m3b2: event.floats(Branch::EcfM3b2)?.to_vec(),
                ecf_n2b1: event.floats(Branch::EcfN2b1)?.to_vec(),
                ecf_n2b2: event.floats(Branch::EcfN2b2)?.to_vec(),
                ecf_n3b1: event.floats(Branch::EcfN3b1)?.to_vec(),
                ecf_n3b2: event.floats(Branch::EcfN3b2)?.to_vec(),
                multiplicity: event.floats(Branch::LargeJetMultiplicity)?.to_vec(),
                girth: event.floats(Branch::LargeJetGirth)?.to_vec(),
                pt_d: event.floats(Branch::LargeJetPtD)?.to_vec(),
                axis_major: event.floats(Branch::LargeJetAxisMajor)?.to_vec(),
                axis_minor: event.floats(Branch::LargeJetAxisMinor)?.to_vec(),
                soft_drop_mass: event.floats(Branch::LargeJetSoftDropMass)?.to_vec(),
            },
        )
    }

    pub fn jet(&self, index: usize) -> Option<LargeJet> {
        let p4 = self.get(index)?;
        Some(LargeJet {
            p4,
            ecf_c2b1: self.aux.ecf_c2b1[index],
            ecf_d2b1: self.aux.ecf_d2b1[index],
            ecf_m2b1: self.aux.ecf_m2b1[index],
            ecf_n2b2: self.aux.ecf_n2b2[index],
            multiplicity: self.aux.multiplicity[index],
            girth: self.aux.girth[index],
            pt_d: self.aux.pt_d[index],
            axis_major: self.aux.axis_major[index],
            axis_minor: self.aux.axis_minor[index],
            soft_drop_mass: self.aux.soft_drop_mass[index],
        })
    }
}

impl SmallJets {
    pub fn from_event(event: &Event) -> Result<Self, FourVectorError> {
        Self::new(
            event.floats(Branch::SmallJetPt)?.to_vec(),
            event.floats(Branch::SmallJetEta)?.to_vec(),
            event.floats(Branch::SmallJetPhi)?.to_vec(),
            event.floats(Branch::SmallJetEnergy)?.to_vec(),
            PartonFlavor {
                parton_flavor: event.ints(Branch::SmallJetPartonFlavor)?.to_vec(),
            },
        )
    }
}

impl GenParticles {
    pub fn from_event(event: &Event) -> Result<Self, FourVectorError> {
        Self::new(
            event.floats(Branch::GenParticlePt)?.to_vec(),
            event.floats(Branch::GenParticleEta)?.to_vec(),
            event.floats(Branch::GenParticlePhi)?.to_vec(),
            event.floats(Branch::GenParticleEnergy)?.to_vec(),
            GenId {
                pdg_id: event.ints(Branch::GenParticlePdgId)?.to_vec(),
                status: event.ints(Branch::GenParticleStatus)?.to_vec(),
            },
        )
    }
}

impl Constituents {
    pub fn from_event(event: &Event) -> Result<Self, FourVectorError> {
        Self::new(
            event.floats(Branch::ConstituentPt)?.to_vec(),
            event.floats(Branch::ConstituentEta)?.to_vec(),
            event.floats(Branch::ConstituentPhi)?.to_vec(),
            event.floats(Branch::ConstituentEnergy)?.to_vec(),
            ConstituentOffsets {
                offsets: event.ints(Branch::ConstituentOffsets)?.to_vec(),
            },
        )
    }

    pub fn offset(&self, index: usize) -> Option<i64> {
        self.aux.offsets.get(index).copied()
    }
}
