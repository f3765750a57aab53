pub mod cutflow;
pub mod features;
pub mod four_vector;
pub mod jsonl;
pub mod kinematics;
pub mod npz;
pub mod pipeline;
pub mod record;
pub mod selection;
pub mod stage;

pub mod prelude {
    pub use crate::cutflow::CutFlow;
    pub use crate::features::{
        background_features, signal_features, FeatureError, RowBuffer, SubleadingJet,
        BACKGROUND_COLUMNS, SIGNAL_COLUMNS,
    };
    pub use crate::four_vector::{
        Constituents, FourVector, FourVectorCollection, FourVectorError, GenParticles, LargeJet,
        LargeJets, SmallJets,
    };
    pub use crate::jsonl::JsonlUnit;
    pub use crate::kinematics::{
        delta_phi, delta_r, invariant_mass, met_corrected_mass, transverse_mass, MetMassScheme,
    };
    pub use crate::npz::{write_features, write_features_with_scores, ArtifactError};
    pub use crate::pipeline::{
        process_background, process_background_par, process_signal, process_unit, EventUnit,
        PipelineError, RunSummary, Scorer, StreamError, UnitOutcome,
    };
    pub use crate::record::{Branch, Column, ColumnKind, Event, Record, RecordError};
    pub use crate::selection::preselection;
    pub use crate::stage::{dirname_plus_basename, unit_id, LocalCopy};
}
