//! Batch processing of event streams into feature artifacts.

use std::fmt;
use std::path::Path;

use log::{error, info, warn};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;

use crate::cutflow::CutFlow;
use crate::features::{
    background_features, signal_features, FeatureError, RowBuffer, BACKGROUND_COLUMNS,
    SIGNAL_COLUMNS,
};
use crate::npz::{write_features, ArtifactError};
use crate::record::Event;
use crate::selection::preselection;
use crate::stage::StageError;

/// Failure of an event stream while it is being iterated.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream ended mid-event; everything read so far is still good.
    #[error("event stream truncated: {reason}")]
    Truncated { reason: String },
    #[error("failed to decode event at line {line}: {message}")]
    Decode { line: usize, message: String },
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// One independently-processable input unit: an identifier for naming its
/// output artifact plus a way to open its event stream.
pub trait EventUnit {
    type Events: Iterator<Item = Result<Event, StreamError>>;

    /// Path-derived identifier, e.g. `"QCD_Pt_600to800/7"`.
    fn id(&self) -> String;

    fn events(&self) -> Result<Self::Events, StreamError>;
}

/// Counts for one run (or one unit) of processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: u64,
    pub preselected: u64,
    pub accepted: u64,
}

impl RunSummary {
    pub fn merge(&mut self, other: &RunSummary) {
        self.total += other.total;
        self.preselected += other.preselected;
        self.accepted += other.accepted;
    }

    /// Percentage of events surviving preselection; 0 for an empty run.
    pub fn preselection_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.preselected as f64 / self.total as f64
        }
    }

    /// Percentage of events reaching the output; 0 for an empty run.
    pub fn acceptance(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.accepted as f64 / self.total as f64
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n_total: {}; n_presel: {}; n_final: {} ({:.2}%)",
            self.total,
            self.preselected,
            self.accepted,
            self.acceptance()
        )
    }
}

/// Run the signal path over a whole event stream.
///
/// Events failing preselection are skipped; preselected events that fail
/// truth-matching are excluded from the buffer without counting as
/// preselection failures. Stream and data-integrity errors are fatal here:
/// the signal sample is small and a broken file should be looked at, not
/// skipped.
pub fn process_signal<I>(
    events: I,
    cut_flow: &mut CutFlow,
) -> Result<(RowBuffer, RunSummary), PipelineError>
where
    I: IntoIterator<Item = Result<Event, StreamError>>,
{
    let mut buffer = RowBuffer::new(SIGNAL_COLUMNS.len());
    let mut summary = RunSummary::default();
    for event in events {
        let event = event?;
        summary.total += 1;
        if !preselection(&event, cut_flow).map_err(FeatureError::from)? {
            continue;
        }
        summary.preselected += 1;
        let Some(row) = signal_features(&event)? else {
            continue;
        };
        summary.accepted += 1;
        buffer.push(&row)?;
    }
    Ok((buffer, summary))
}

/// What one background unit produced.
#[derive(Debug)]
pub struct UnitOutcome {
    pub buffer: RowBuffer,
    pub summary: RunSummary,
    /// True when the unit's stream ended early and the buffer holds only
    /// the rows accumulated up to that point.
    pub truncated: bool,
}

/// Run the background path over one unit's event stream.
///
/// A truncated stream — or an event that passes preselection but is missing
/// an object the features need — ends the unit while keeping every row
/// already accumulated. Anything else is a real failure for this unit and
/// propagates.
pub fn process_unit<I>(events: I, cut_flow: &mut CutFlow) -> Result<UnitOutcome, PipelineError>
where
    I: IntoIterator<Item = Result<Event, StreamError>>,
{
    let mut buffer = RowBuffer::new(BACKGROUND_COLUMNS.len());
    let mut summary = RunSummary::default();
    let mut truncated = false;
    for event in events {
        let event = match event {
            Ok(event) => event,
            Err(StreamError::Truncated { reason }) => {
                warn!("{reason}; keeping {} accumulated entries", buffer.len());
                truncated = true;
                break;
            }
            Err(err) => return Err(err.into()),
        };
        summary.total += 1;
        if !preselection(&event, cut_flow).map_err(FeatureError::from)? {
            continue;
        }
        summary.preselected += 1;
        let row = match background_features(&event) {
            Ok(row) => row,
            Err(FeatureError::MissingObject { collection, index }) => {
                warn!(
                    "no object at index {index} in the {collection} collection; \
                     keeping {} accumulated entries",
                    buffer.len()
                );
                truncated = true;
                break;
            }
            Err(err) => return Err(err.into()),
        };
        summary.accepted += 1;
        buffer.push(&row)?;
    }
    Ok(UnitOutcome {
        buffer,
        summary,
        truncated,
    })
}

/// Process one unit end to end: open, select, extract, save.
///
/// Every per-unit failure mode is logged here rather than propagated, so a
/// bad unit never stops the run; `None` means the unit produced no counts
/// at all.
fn run_unit<U: EventUnit>(unit: &U, out_dir: &Path, cut_flow: &mut CutFlow) -> Option<RunSummary> {
    let id = unit.id();
    let events = match unit.events() {
        Ok(events) => events,
        Err(err) => {
            error!("could not open {id}: {err}");
            return None;
        }
    };
    let outcome = match process_unit(events, cut_flow) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("failed processing {id}: {err}");
            return None;
        }
    };
    info!(
        "{id}: n_total: {}; n_presel: {} ({:.2}%)",
        outcome.summary.total,
        outcome.summary.preselected,
        outcome.summary.preselection_rate()
    );
    if outcome.buffer.is_empty() {
        warn!("no entries for {id}, skipping");
        return Some(outcome.summary);
    }
    let outfile = out_dir.join(format!("{id}.npz"));
    if let Err(err) = write_features(&outfile, &outcome.buffer) {
        error!("could not save {id}: {err}");
    }
    Some(outcome.summary)
}

/// Run the background path over many input units sequentially, writing one
/// artifact per unit under `out_dir` and returning the cumulative counts.
pub fn process_background<U, I>(units: I, out_dir: &Path, cut_flow: &mut CutFlow) -> RunSummary
where
    U: EventUnit,
    I: IntoIterator<Item = U>,
{
    let mut cumulative = RunSummary::default();
    for unit in units {
        if let Some(summary) = run_unit(&unit, out_dir, cut_flow) {
            cumulative.merge(&summary);
        }
    }
    cumulative
}

/// As [`process_background`], processing independent units in parallel.
///
/// Units share no state; each gets its own cut flow and the per-unit
/// results are folded into the cumulative counters at the end of each unit.
pub fn process_background_par<U>(units: Vec<U>, out_dir: &Path) -> (RunSummary, CutFlow)
where
    U: EventUnit + Send,
{
    let cumulative = Mutex::new((RunSummary::default(), CutFlow::new()));
    units.into_par_iter().for_each(|unit| {
        let mut cut_flow = CutFlow::new();
        if let Some(summary) = run_unit(&unit, out_dir, &mut cut_flow) {
            let mut guard = cumulative.lock();
            guard.0.merge(&summary);
            guard.1.absorb(&cut_flow);
        }
    });
    cumulative.into_inner()
}

/// An opaque per-event scorer, e.g. a trained classifier.
///
/// Implementations receive one feature row in the schema order the buffer
/// was filled with.
pub trait Scorer {
    fn score(&self, features: &[f64]) -> f64;
}

/// Score every accumulated row.
pub fn score_rows(buffer: &RowBuffer, scorer: &dyn Scorer) -> Vec<f64> {
    buffer.rows().map(|row| scorer.score(row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MidpointScorer;

    impl Scorer for MidpointScorer {
        fn score(&self, features: &[f64]) -> f64 {
            features.iter().sum::<f64>() / features.len() as f64
        }
    }

    #[test]
    fn summary_display_guards_the_empty_run() {
        let summary = RunSummary::default();
        assert_eq!(summary.acceptance(), 0.0);
        assert_eq!(format!("{summary}"), "n_total: 0; n_presel: 0; n_final: 0 (0.00%)");
    }

    #[test]
    fn summaries_accumulate() {
        let mut cumulative = RunSummary::default();
        cumulative.merge(&RunSummary {
            total: 10,
            preselected: 3,
            accepted: 3,
        });
        cumulative.merge(&RunSummary {
            total: 10,
            preselected: 2,
            accepted: 1,
        });
        assert_eq!(cumulative.total, 20);
        assert_eq!(cumulative.preselected, 5);
        assert_eq!(cumulative.accepted, 4);
        assert_eq!(cumulative.acceptance(), 20.0);
    }

    #[test]
    fn scorer_sees_one_row_at_a_time() {
        let mut buffer = RowBuffer::new(2);
        buffer.push(&[1.0, 3.0]).unwrap();
        buffer.push(&[5.0, 7.0]).unwrap();
        let scores = score_rows(&buffer, &MidpointScorer);
        assert_eq!(scores, vec![2.0, 6.0]);
    }
}
