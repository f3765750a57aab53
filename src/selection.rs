//! The preselection applied to every event before feature extraction.

use crate::cutflow::CutFlow;
use crate::record::{Branch, Event, RecordError};

/// Leading trigger-jet pt threshold, in the same units as the jet pt branch.
pub const TRIGGER_PT_MIN: f64 = 550.0;
/// Acceptance window for the sub-leading jet's pseudorapidity.
pub const SUBLEADING_ETA_MAX: f64 = 2.4;
/// Lower bound on `sqrt(1 + MET / pt)` of the sub-leading jet.
pub const RT_MIN: f64 = 1.1;

/// The energy-correlation observables that must be non-negative for the
/// sub-leading jet.
const ECF_CUT_BRANCHES: [Branch; 4] = [
    Branch::EcfC2b1,
    Branch::EcfD2b1,
    Branch::EcfM2b1,
    Branch::EcfN2b2,
];

/// Detector-quality flags that must all be set.
const QUALITY_FILTERS: [Branch; 7] = [
    Branch::HbheNoiseFilter,
    Branch::HbheIsoNoiseFilter,
    Branch::EeBadScFilter,
    Branch::EcalBadCalibFilter,
    Branch::BadPfMuonFilter,
    Branch::BadChargedCandidateFilter,
    Branch::GlobalSuperTightHaloFilter,
];

/// Run the ordered preselection over one event's raw branches.
///
/// The stages run in a fixed order and short-circuit on the first failure;
/// each satisfied stage records a pass under its name, and a full pass
/// additionally records `preselection`. The return value is the verdict;
/// the cut-flow bookkeeping is a diagnostic side effect.
///
/// A missing *index* (e.g. fewer than two entries where the second is
/// inspected) is an ordinary rejection. A missing or mistyped *branch* is a
/// data-integrity problem and propagates as [`RecordError`].
pub fn preselection(event: &Event, cut_flow: &mut CutFlow) -> Result<bool, RecordError> {
    let jet_pt = event.floats(Branch::LargeJetPt)?;
    if jet_pt.len() < 2 {
        return Ok(false);
    }
    cut_flow.record_pass(">=2jets");

    let jet_eta = event.floats(Branch::LargeJetEta)?;
    match jet_eta.get(1) {
        Some(eta) if eta.abs() <= SUBLEADING_ETA_MAX => {}
        _ => return Ok(false),
    }
    cut_flow.record_pass("eta<2.4");

    let trigger_pt = event.floats(Branch::TriggerJetPt)?;
    match trigger_pt.first() {
        Some(pt) if *pt >= TRIGGER_PT_MIN => {}
        _ => return Ok(false),
    }
    cut_flow.record_pass("trigger");

    for branch in ECF_CUT_BRANCHES {
        match event.floats(branch)?.get(1) {
            Some(value) if *value >= 0.0 => {}
            // too few entries counts as a failed cut, not an error
            _ => return Ok(false),
        }
    }
    cut_flow.record_pass("ecf>0");

    let met = event.float(Branch::Met)?;
    let subleading_pt = jet_pt[1];
    // pt = 0 would divide to a non-finite ratio; treat it as a plain failure
    if subleading_pt <= 0.0 || (1.0 + met / subleading_pt).sqrt() < RT_MIN {
        return Ok(false);
    }
    cut_flow.record_pass("rtx>1.1");

    if event.int(Branch::MuonCount)? > 0 || event.int(Branch::ElectronCount)? > 0 {
        return Ok(false);
    }
    cut_flow.record_pass("nleptons==0");

    for branch in QUALITY_FILTERS {
        if event.int(branch)? == 0 {
            return Ok(false);
        }
    }
    cut_flow.record_pass("metfilter");

    cut_flow.record_pass("preselection");
    Ok(true)
}

/// Every stage name recorded by [`preselection`], in pass order.
pub const STAGE_NAMES: [&str; 8] = [
    ">=2jets",
    "eta<2.4",
    "trigger",
    "ecf>0",
    "rtx>1.1",
    "nleptons==0",
    "metfilter",
    "preselection",
];
