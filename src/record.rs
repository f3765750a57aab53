use std::fmt::Debug;
use std::hash::Hash;

use indexmap::IndexMap;
use thiserror::Error;

/// The kind of value a column holds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    Float,
    Int,
    Floats,
    Ints,
}

/// One named column of an event record: either a per-event scalar or a
/// per-object array.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(f64),
    Int(i64),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl Column {
    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Float(_) => ColumnKind::Float,
            Column::Int(_) => ColumnKind::Int,
            Column::Floats(_) => ColumnKind::Floats,
            Column::Ints(_) => ColumnKind::Ints,
        }
    }

    /// Length of an array column, [`None`] for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Column::Float(_) | Column::Int(_) => None,
            Column::Floats(values) => Some(values.len()),
            Column::Ints(values) => Some(values.len()),
        }
    }

    fn mask(&self, keep: &[bool]) -> Column {
        match self {
            Column::Floats(values) => Column::Floats(
                values
                    .iter()
                    .zip(keep.iter())
                    .filter_map(|(v, k)| k.then_some(*v))
                    .collect(),
            ),
            Column::Ints(values) => Column::Ints(
                values
                    .iter()
                    .zip(keep.iter())
                    .filter_map(|(v, k)| k.then_some(*v))
                    .collect(),
            ),
            scalar => scalar.clone(),
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Floats(values) => {
                Column::Floats(indices.iter().map(|i| values[*i]).collect())
            }
            Column::Ints(values) => Column::Ints(indices.iter().map(|i| values[*i]).collect()),
            scalar => scalar.clone(),
        }
    }

    fn at(&self, index: usize) -> Column {
        match self {
            Column::Floats(values) => Column::Float(values[index]),
            Column::Ints(values) => Column::Int(values[index]),
            scalar => scalar.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("no branch named {name:?}")]
    MissingBranch { name: String },
    #[error("branch {name:?} holds a {found:?} column, expected {expected:?}")]
    WrongKind {
        name: String,
        expected: ColumnKind,
        found: ColumnKind,
    },
    #[error("selector of length {selector} cannot apply to column {name:?} of length {column}")]
    SelectorMismatch {
        name: String,
        selector: usize,
        column: usize,
    },
    #[error("index {index} out of bounds for column {name:?} of length {len}")]
    OutOfBounds {
        name: String,
        index: usize,
        len: usize,
    },
}

/// A single event's flat branches: an insertion-ordered map from a key to a
/// [`Column`].
///
/// The same type serves two roles. A raw event decoded from a tree is a
/// `Record<Branch>` (see [`Event`]) consumed purely by key lookup through the
/// typed accessors. A record whose array columns all share one length also
/// supports selection: [`Record::mask`], [`Record::take`] and [`Record::at`]
/// filter every array column identically, so cross-column alignment is
/// preserved by construction. Scalar columns pass through selection
/// unchanged; this is well-defined for single-index selection and
/// unspecified (but harmless) for array selection.
///
/// All selection operations are purely functional and return a new record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record<K: Hash + Eq + Clone + Debug> {
    columns: IndexMap<K, Column>,
}

impl<K: Hash + Eq + Clone + Debug> Record<K> {
    pub fn new() -> Self {
        Self {
            columns: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, column: Column) {
        self.columns.insert(key, column);
    }

    pub fn contains(&self, key: K) -> bool {
        self.columns.contains_key(&key)
    }

    pub fn get(&self, key: K) -> Result<&Column, RecordError> {
        self.columns
            .get(&key)
            .ok_or_else(|| RecordError::MissingBranch {
                name: format!("{key:?}"),
            })
    }

    pub fn float(&self, key: K) -> Result<f64, RecordError> {
        match self.get(key.clone())? {
            Column::Float(value) => Ok(*value),
            // integer-valued scalars read fine as floats
            Column::Int(value) => Ok(*value as f64),
            other => Err(RecordError::WrongKind {
                name: format!("{key:?}"),
                expected: ColumnKind::Float,
                found: other.kind(),
            }),
        }
    }

    pub fn int(&self, key: K) -> Result<i64, RecordError> {
        match self.get(key.clone())? {
            Column::Int(value) => Ok(*value),
            other => Err(RecordError::WrongKind {
                name: format!("{key:?}"),
                expected: ColumnKind::Int,
                found: other.kind(),
            }),
        }
    }

    pub fn floats(&self, key: K) -> Result<&[f64], RecordError> {
        match self.get(key.clone())? {
            Column::Floats(values) => Ok(values),
            other => Err(RecordError::WrongKind {
                name: format!("{key:?}"),
                expected: ColumnKind::Floats,
                found: other.kind(),
            }),
        }
    }

    pub fn ints(&self, key: K) -> Result<&[i64], RecordError> {
        match self.get(key.clone())? {
            Column::Ints(values) => Ok(values),
            other => Err(RecordError::WrongKind {
                name: format!("{key:?}"),
                expected: ColumnKind::Ints,
                found: other.kind(),
            }),
        }
    }

    /// The common length of the record's array columns, or 1 if the record
    /// only holds scalars.
    pub fn len(&self) -> usize {
        self.columns
            .values()
            .find_map(Column::len)
            .unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep the objects where `keep` is true, in every array column at once.
    ///
    /// # Errors
    /// Fails if any array column's length differs from the mask length; a
    /// record with misaligned columns must not be silently filtered.
    pub fn mask(&self, keep: &[bool]) -> Result<Self, RecordError> {
        self.check_aligned(keep.len())?;
        Ok(Self {
            columns: self
                .columns
                .iter()
                .map(|(k, c)| (k.clone(), c.mask(keep)))
                .collect(),
        })
    }

    /// Reorder/subset the objects by position, in every array column at once.
    ///
    /// # Errors
    /// Fails on misaligned columns or an out-of-range index.
    pub fn take(&self, indices: &[usize]) -> Result<Self, RecordError> {
        let len = self.len();
        self.check_aligned(len)?;
        for index in indices {
            if *index >= len {
                return Err(RecordError::OutOfBounds {
                    name: self.first_array_name(),
                    index: *index,
                    len,
                });
            }
        }
        Ok(Self {
            columns: self
                .columns
                .iter()
                .map(|(k, c)| (k.clone(), c.take(indices)))
                .collect(),
        })
    }

    /// Single-object view: array columns collapse to scalars at `index`,
    /// scalar columns pass through unchanged.
    pub fn at(&self, index: usize) -> Result<Self, RecordError> {
        let len = self.len();
        self.check_aligned(len)?;
        if index >= len {
            return Err(RecordError::OutOfBounds {
                name: self.first_array_name(),
                index,
                len,
            });
        }
        Ok(Self {
            columns: self
                .columns
                .iter()
                .map(|(k, c)| (k.clone(), c.at(index)))
                .collect(),
        })
    }

    fn check_aligned(&self, expected: usize) -> Result<(), RecordError> {
        for (key, column) in &self.columns {
            if let Some(len) = column.len() {
                if len != expected {
                    return Err(RecordError::SelectorMismatch {
                        name: format!("{key:?}"),
                        selector: expected,
                        column: len,
                    });
                }
            }
        }
        Ok(())
    }

    fn first_array_name(&self) -> String {
        self.columns
            .iter()
            .find(|(_, c)| c.len().is_some())
            .map(|(k, _)| format!("{k:?}"))
            .unwrap_or_default()
    }
}

/// Enumerated branch identifiers for the event trees this crate consumes.
///
/// Decoders map raw tree names ([`Branch::name`]) to these identifiers once,
/// at the stream boundary; the core never sees a raw branch string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Branch {
    LargeJetPt,
    LargeJetEta,
    LargeJetPhi,
    LargeJetEnergy,
    EcfC2b1,
    EcfC2b2,
    EcfC3b1,
    EcfC3b2,
    EcfD2b1,
    EcfD2b2,
    EcfM2b1,
    EcfM2b2,
    EcfM3b1,
    EcfM3b2,
    EcfN2b1,
    EcfN2b2,
    EcfN3b1,
    EcfN3b2,
    LargeJetMultiplicity,
    LargeJetGirth,
    LargeJetPtD,
    LargeJetAxisMajor,
    LargeJetAxisMinor,
    LargeJetSoftDropMass,
    ConstituentPt,
    ConstituentEta,
    ConstituentPhi,
    ConstituentEnergy,
    ConstituentOffsets,
    SmallJetPt,
    SmallJetEta,
    SmallJetPhi,
    SmallJetEnergy,
    SmallJetPartonFlavor,
    TriggerJetPt,
    GenParticlePt,
    GenParticleEta,
    GenParticlePhi,
    GenParticleEnergy,
    GenParticlePdgId,
    GenParticleStatus,
    Met,
    MetPhi,
    MuonCount,
    ElectronCount,
    HbheNoiseFilter,
    HbheIsoNoiseFilter,
    EeBadScFilter,
    EcalBadCalibFilter,
    BadPfMuonFilter,
    BadChargedCandidateFilter,
    GlobalSuperTightHaloFilter,
}

impl Branch {
    /// The raw branch name in the flat analysis tree.
    pub fn name(self) -> &'static str {
        match self {
            Branch::LargeJetPt => "JetsAK15.fCoordinates.fPt",
            Branch::LargeJetEta => "JetsAK15.fCoordinates.fEta",
            Branch::LargeJetPhi => "JetsAK15.fCoordinates.fPhi",
            Branch::LargeJetEnergy => "JetsAK15.fCoordinates.fE",
            Branch::EcfC2b1 => "JetsAK15_ecfC2b1",
            Branch::EcfC2b2 => "JetsAK15_ecfC2b2",
            Branch::EcfC3b1 => "JetsAK15_ecfC3b1",
            Branch::EcfC3b2 => "JetsAK15_ecfC3b2",
            Branch::EcfD2b1 => "JetsAK15_ecfD2b1",
            Branch::EcfD2b2 => "JetsAK15_ecfD2b2",
            Branch::EcfM2b1 => "JetsAK15_ecfM2b1",
            Branch::EcfM2b2 => "JetsAK15_ecfM2b2",
            Branch::EcfM3b1 => "JetsAK15_ecfM3b1",
            Branch::EcfM3b2 => "JetsAK15_ecfM3b2",
            Branch::EcfN2b1 => "JetsAK15_ecfN2b1",
            Branch::EcfN2b2 => "JetsAK15_ecfN2b2",
            Branch::EcfN3b1 => "JetsAK15_ecfN3b1",
            Branch::EcfN3b2 => "JetsAK15_ecfN3b2",
            Branch::LargeJetMultiplicity => "JetsAK15_multiplicity",
            Branch::LargeJetGirth => "JetsAK15_girth",
            Branch::LargeJetPtD => "JetsAK15_ptD",
            Branch::LargeJetAxisMajor => "JetsAK15_axismajor",
            Branch::LargeJetAxisMinor => "JetsAK15_axisminor",
            Branch::LargeJetSoftDropMass => "JetsAK15_softDropMass",
            Branch::ConstituentPt => "JetsAK15_constituents.fCoordinates.fPt",
            Branch::ConstituentEta => "JetsAK15_constituents.fCoordinates.fEta",
            Branch::ConstituentPhi => "JetsAK15_constituents.fCoordinates.fPhi",
            Branch::ConstituentEnergy => "JetsAK15_constituents.fCoordinates.fE",
            Branch::ConstituentOffsets => "JetsAK15_constituentsOffsets",
            Branch::SmallJetPt => "Jets.fCoordinates.fPt",
            Branch::SmallJetEta => "Jets.fCoordinates.fEta",
            Branch::SmallJetPhi => "Jets.fCoordinates.fPhi",
            Branch::SmallJetEnergy => "Jets.fCoordinates.fE",
            Branch::SmallJetPartonFlavor => "Jets_partonFlavor",
            Branch::TriggerJetPt => "JetsAK8.fCoordinates.fPt",
            Branch::GenParticlePt => "GenParticles.fCoordinates.fPt",
            Branch::GenParticleEta => "GenParticles.fCoordinates.fEta",
            Branch::GenParticlePhi => "GenParticles.fCoordinates.fPhi",
            Branch::GenParticleEnergy => "GenParticles.fCoordinates.fE",
            Branch::GenParticlePdgId => "GenParticles_PdgId",
            Branch::GenParticleStatus => "GenParticles_Status",
            Branch::Met => "MET",
            Branch::MetPhi => "METPhi",
            Branch::MuonCount => "Muons",
            Branch::ElectronCount => "Electrons",
            Branch::HbheNoiseFilter => "HBHENoiseFilter",
            Branch::HbheIsoNoiseFilter => "HBHEIsoNoiseFilter",
            Branch::EeBadScFilter => "eeBadScFilter",
            Branch::EcalBadCalibFilter => "ecalBadCalibReducedFilter",
            Branch::BadPfMuonFilter => "BadPFMuonFilter",
            Branch::BadChargedCandidateFilter => "BadChargedCandidateFilter",
            Branch::GlobalSuperTightHaloFilter => "globalSuperTightHalo2016Filter",
        }
    }

    /// The column kind a decoder should produce for this branch.
    pub fn kind(self) -> ColumnKind {
        match self {
            Branch::ConstituentOffsets
            | Branch::SmallJetPartonFlavor
            | Branch::GenParticlePdgId
            | Branch::GenParticleStatus => ColumnKind::Ints,
            Branch::Met | Branch::MetPhi => ColumnKind::Float,
            Branch::MuonCount
            | Branch::ElectronCount
            | Branch::HbheNoiseFilter
            | Branch::HbheIsoNoiseFilter
            | Branch::EeBadScFilter
            | Branch::EcalBadCalibFilter
            | Branch::BadPfMuonFilter
            | Branch::BadChargedCandidateFilter
            | Branch::GlobalSuperTightHaloFilter => ColumnKind::Int,
            _ => ColumnKind::Floats,
        }
    }

    pub fn from_name(name: &str) -> Option<Branch> {
        ALL_BRANCHES.iter().copied().find(|b| b.name() == name)
    }
}

pub const ALL_BRANCHES: [Branch; 52] = [
    Branch::LargeJetPt,
    Branch::LargeJetEta,
    Branch::LargeJetPhi,
    Branch::LargeJetEnergy,
    Branch::EcfC2b1,
    Branch::EcfC2b2,
    Branch::EcfC3b1,
    Branch::EcfC3b2,
    Branch::EcfD2b1,
    Branch::EcfD2b2,
    Branch::EcfM2b1,
    Branch::EcfM2b2,
    Branch::EcfM3b1,
    Branch::EcfM3b2,
    Branch::EcfN2b1,
    Branch::EcfN2b2,
    Branch::EcfN3b1,
    Branch::EcfN3b2,
    Branch::LargeJetMultiplicity,
    Branch::LargeJetGirth,
    Branch::LargeJetPtD,
    Branch::LargeJetAxisMajor,
    Branch::LargeJetAxisMinor,
    Branch::LargeJetSoftDropMass,
    Branch::ConstituentPt,
    Branch::ConstituentEta,
    Branch::ConstituentPhi,
    Branch::ConstituentEnergy,
    Branch::ConstituentOffsets,
    Branch::SmallJetPt,
    Branch::SmallJetEta,
    Branch::SmallJetPhi,
    Branch::SmallJetEnergy,
    Branch::SmallJetPartonFlavor,
    Branch::TriggerJetPt,
    Branch::GenParticlePt,
    Branch::GenParticleEta,
    Branch::GenParticlePhi,
    Branch::GenParticleEnergy,
    Branch::GenParticlePdgId,
    Branch::GenParticleStatus,
    Branch::Met,
    Branch::MetPhi,
    Branch::MuonCount,
    Branch::ElectronCount,
    Branch::HbheNoiseFilter,
    Branch::HbheIsoNoiseFilter,
    Branch::EeBadScFilter,
    Branch::EcalBadCalibFilter,
    Branch::BadPfMuonFilter,
    Branch::BadChargedCandidateFilter,
    Branch::GlobalSuperTightHaloFilter,
];

/// One decoded collision event.
pub type Event = Record<Branch>;

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned_record() -> Record<&'static str> {
        let mut record = Record::new();
        record.insert("pt", Column::Floats(vec![600.0, 400.0, 30.0]));
        record.insert("flavor", Column::Ints(vec![5, 21, 1]));
        record.insert("met", Column::Float(50.0));
        record
    }

    #[test]
    fn length_is_common_array_length() {
        assert_eq!(aligned_record().len(), 3);
        let mut scalars = Record::new();
        scalars.insert("met", Column::Float(50.0));
        assert_eq!(scalars.len(), 1);
    }

    #[test]
    fn mask_filters_every_array_column() {
        let record = aligned_record();
        let picked = record.mask(&[true, false, true]).unwrap();
        assert_eq!(picked.floats("pt").unwrap(), &[600.0, 30.0]);
        assert_eq!(picked.ints("flavor").unwrap(), &[5, 1]);
        assert_eq!(picked.float("met").unwrap(), 50.0);
    }

    #[test]
    fn all_true_mask_is_identity_and_all_false_empties() {
        let record = aligned_record();
        assert_eq!(record.mask(&[true; 3]).unwrap(), record);
        let none = record.mask(&[false; 3]).unwrap();
        assert_eq!(none.len(), 0);
        assert!(none.floats("pt").unwrap().is_empty());
    }

    #[test]
    fn single_index_collapses_arrays_and_passes_scalars() {
        let record = aligned_record();
        let second = record.at(1).unwrap();
        assert_eq!(second.float("pt").unwrap(), 400.0);
        assert_eq!(second.int("flavor").unwrap(), 21);
        assert_eq!(second.float("met").unwrap(), 50.0);
    }

    #[test]
    fn take_reorders_consistently() {
        let record = aligned_record();
        let swapped = record.take(&[1, 0]).unwrap();
        assert_eq!(swapped.floats("pt").unwrap(), &[400.0, 600.0]);
        assert_eq!(swapped.ints("flavor").unwrap(), &[21, 5]);
        assert!(record.take(&[3]).is_err());
    }

    #[test]
    fn misaligned_columns_refuse_selection() {
        let mut record = aligned_record();
        record.insert("short", Column::Floats(vec![1.0]));
        assert!(matches!(
            record.mask(&[true, true, true]),
            Err(RecordError::SelectorMismatch { .. })
        ));
    }

    #[test]
    fn typed_accessors_distinguish_missing_from_mistyped() {
        let record = aligned_record();
        assert!(matches!(
            record.float("nope"),
            Err(RecordError::MissingBranch { .. })
        ));
        assert!(matches!(
            record.float("pt"),
            Err(RecordError::WrongKind { .. })
        ));
    }

    #[test]
    fn branch_names_round_trip() {
        for branch in ALL_BRANCHES {
            assert_eq!(Branch::from_name(branch.name()), Some(branch));
        }
        assert_eq!(Branch::from_name("NoSuchBranch"), None);
    }
}
