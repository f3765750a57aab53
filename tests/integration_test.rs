use std::fs::File;
use std::path::PathBuf;

use approx::assert_relative_eq;
use svj_core::prelude::*;
use svj_core::record::Branch;
use svj_core::selection::STAGE_NAMES;

const ECF_BRANCHES: [Branch; 14] = [
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
];

/// An event that survives every preselection stage and truth-matching.
fn passing_event() -> Event {
    let mut event = Event::new();
    event.insert(Branch::LargeJetPt, Column::Floats(vec![600.0, 400.0]));
    event.insert(Branch::LargeJetEta, Column::Floats(vec![0.1, 0.2]));
    event.insert(Branch::LargeJetPhi, Column::Floats(vec![0.0, 0.1]));
    event.insert(Branch::LargeJetEnergy, Column::Floats(vec![650.0, 450.0]));
    for branch in ECF_BRANCHES {
        event.insert(branch, Column::Floats(vec![0.1, 0.2]));
    }
    event.insert(
        Branch::LargeJetMultiplicity,
        Column::Floats(vec![40.0, 35.0]),
    );
    event.insert(Branch::LargeJetGirth, Column::Floats(vec![0.3, 0.25]));
    event.insert(Branch::LargeJetPtD, Column::Floats(vec![0.2, 0.18]));
    event.insert(Branch::LargeJetAxisMajor, Column::Floats(vec![0.4, 0.35]));
    event.insert(Branch::LargeJetAxisMinor, Column::Floats(vec![0.2, 0.15]));
    event.insert(
        Branch::LargeJetSoftDropMass,
        Column::Floats(vec![150.0, 120.0]),
    );
    event.insert(Branch::TriggerJetPt, Column::Floats(vec![600.0]));
    event.insert(Branch::SmallJetPt, Column::Floats(vec![380.0, 100.0]));
    event.insert(Branch::SmallJetEta, Column::Floats(vec![0.25, 1.4]));
    event.insert(Branch::SmallJetPhi, Column::Floats(vec![0.15, -2.0]));
    event.insert(Branch::SmallJetEnergy, Column::Floats(vec![400.0, 180.0]));
    event.insert(Branch::SmallJetPartonFlavor, Column::Ints(vec![5, 21]));
    event.insert(Branch::ConstituentPt, Column::Floats(vec![5.0, 3.0, 2.0]));
    event.insert(Branch::ConstituentEta, Column::Floats(vec![0.1, 0.2, 0.3]));
    event.insert(Branch::ConstituentPhi, Column::Floats(vec![0.0, 0.1, 0.2]));
    event.insert(
        Branch::ConstituentEnergy,
        Column::Floats(vec![6.0, 4.0, 3.0]),
    );
    event.insert(Branch::ConstituentOffsets, Column::Ints(vec![0, 12, 25]));
    event.insert(
        Branch::GenParticlePt,
        Column::Floats(vec![250.0, 120.0, 130.0, 40.0]),
    );
    event.insert(
        Branch::GenParticleEta,
        Column::Floats(vec![0.21, 0.3, 0.1, 2.0]),
    );
    event.insert(
        Branch::GenParticlePhi,
        Column::Floats(vec![0.11, 0.2, 0.0, -1.0]),
    );
    event.insert(
        Branch::GenParticleEnergy,
        Column::Floats(vec![600.0, 300.0, 310.0, 90.0]),
    );
    event.insert(
        Branch::GenParticlePdgId,
        Column::Ints(vec![4_900_023, 4_900_101, -4_900_101, 1]),
    );
    event.insert(Branch::GenParticleStatus, Column::Ints(vec![62, 71, 71, 23]));
    event.insert(Branch::Met, Column::Float(100.0));
    event.insert(Branch::MetPhi, Column::Float(0.3));
    event.insert(Branch::MuonCount, Column::Int(0));
    event.insert(Branch::ElectronCount, Column::Int(0));
    for branch in [
        Branch::HbheNoiseFilter,
        Branch::HbheIsoNoiseFilter,
        Branch::EeBadScFilter,
        Branch::EcalBadCalibFilter,
        Branch::BadPfMuonFilter,
        Branch::BadChargedCandidateFilter,
        Branch::GlobalSuperTightHaloFilter,
    ] {
        event.insert(branch, Column::Int(1));
    }
    event
}

/// An event with only one large-radius jet; fails the very first stage.
fn single_jet_event() -> Event {
    let mut event = passing_event();
    event.insert(Branch::LargeJetPt, Column::Floats(vec![600.0]));
    event.insert(Branch::LargeJetEta, Column::Floats(vec![0.1]));
    event
}

#[test]
fn full_preselection_pass_advances_every_stage_once() {
    let event = passing_event();
    let mut cut_flow = CutFlow::new();
    assert!(preselection(&event, &mut cut_flow).unwrap());
    for name in STAGE_NAMES {
        assert_eq!(cut_flow.get(name), 1, "stage {name}");
    }
}

#[test]
fn single_jet_event_is_rejected_before_any_later_stage() {
    let event = single_jet_event();
    let mut cut_flow = CutFlow::new();
    assert!(!preselection(&event, &mut cut_flow).unwrap());
    for name in STAGE_NAMES {
        assert_eq!(cut_flow.get(name), 0, "stage {name}");
    }
}

#[test]
fn zero_pt_subleading_jet_is_rejected_at_the_ratio_stage() {
    let mut event = passing_event();
    event.insert(Branch::LargeJetPt, Column::Floats(vec![600.0, 0.0]));
    let mut cut_flow = CutFlow::new();
    assert!(!preselection(&event, &mut cut_flow).unwrap());
    for name in [">=2jets", "eta<2.4", "trigger", "ecf>0"] {
        assert_eq!(cut_flow.get(name), 1, "stage {name}");
    }
    assert_eq!(cut_flow.get("rtx>1.1"), 0);
    assert_eq!(cut_flow.get("preselection"), 0);
}

#[test]
fn short_ecf_arrays_reject_without_erroring() {
    let mut event = passing_event();
    event.insert(Branch::EcfM2b1, Column::Floats(vec![0.1]));
    let mut cut_flow = CutFlow::new();
    assert!(!preselection(&event, &mut cut_flow).unwrap());
    assert_eq!(cut_flow.get("trigger"), 1);
    assert_eq!(cut_flow.get("ecf>0"), 0);
}

#[test]
fn lepton_and_filter_vetoes_reject() {
    let mut with_muon = passing_event();
    with_muon.insert(Branch::MuonCount, Column::Int(1));
    let mut cut_flow = CutFlow::new();
    assert!(!preselection(&with_muon, &mut cut_flow).unwrap());
    assert_eq!(cut_flow.get("nleptons==0"), 0);

    let mut bad_filter = passing_event();
    bad_filter.insert(Branch::EeBadScFilter, Column::Int(0));
    let mut cut_flow = CutFlow::new();
    assert!(!preselection(&bad_filter, &mut cut_flow).unwrap());
    assert_eq!(cut_flow.get("nleptons==0"), 1);
    assert_eq!(cut_flow.get("metfilter"), 0);
}

#[test]
fn missing_branch_is_an_error_not_a_rejection() {
    // enough branches to reach the kinematic-ratio stage, but no MET
    let source = passing_event();
    let mut stripped = Event::new();
    for branch in [
        Branch::LargeJetPt,
        Branch::LargeJetEta,
        Branch::TriggerJetPt,
        Branch::EcfC2b1,
        Branch::EcfD2b1,
        Branch::EcfM2b1,
        Branch::EcfN2b2,
    ] {
        stripped.insert(branch, source.get(branch).unwrap().clone());
    }
    let mut cut_flow = CutFlow::new();
    assert!(preselection(&stripped, &mut cut_flow).is_err());
    assert_eq!(cut_flow.get("ecf>0"), 1);
}

#[test]
fn misaligned_substructure_is_a_data_integrity_error() {
    let mut event = passing_event();
    event.insert(Branch::LargeJetGirth, Column::Floats(vec![0.3]));
    let err = background_features(&event).unwrap_err();
    assert!(matches!(err, FeatureError::FourVector(_)));
}

#[test]
fn signal_processing_extracts_one_truth_matched_row() {
    let matched = passing_event();

    // identical reconstruction, but the generator record has no mediator
    let mut unmatched = passing_event();
    unmatched.insert(
        Branch::GenParticlePdgId,
        Column::Ints(vec![1, 4_900_101, -4_900_101, 1]),
    );

    let rejected = single_jet_event();

    let events = vec![Ok(matched), Ok(unmatched), Ok(rejected)];
    let mut cut_flow = CutFlow::new();
    let (buffer, summary) = process_signal(events, &mut cut_flow).unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.preselected, 2);
    assert_eq!(summary.accepted, 1);
    assert_eq!(buffer.len(), 1);
    assert_eq!(buffer.width(), SIGNAL_COLUMNS.len());
    assert_eq!(cut_flow.get("preselection"), 2);

    let row = buffer.rows().next().unwrap();
    // girth, axisminor lead the schema
    assert_relative_eq!(row[0], 0.25, epsilon = 1e-12);
    assert_relative_eq!(row[1], 0.15, epsilon = 1e-12);
    // metdphi wraps jet phi against the MET azimuth
    assert_relative_eq!(row[6], delta_phi(0.1, 0.3), epsilon = 1e-12);
    // constituent offset and parton flavor carried over as floats
    assert_relative_eq!(row[10], 25.0, epsilon = 1e-12);
    assert_relative_eq!(row[11], 5.0, epsilon = 1e-12);
    // sub-leading kinematics
    assert_relative_eq!(row[12], 400.0, epsilon = 1e-12);
    assert_relative_eq!(row[16], 1.25f64.sqrt(), epsilon = 1e-12);
    let jet = FourVector {
        pt: 400.0,
        eta: 0.2,
        phi: 0.1,
        energy: 450.0,
    };
    assert_relative_eq!(row[17], transverse_mass(&jet, 100.0, 0.3), epsilon = 1e-12);
    assert_relative_eq!(row[18], 100.0, epsilon = 1e-12);
    assert_relative_eq!(row[20], invariant_mass(&jet), epsilon = 1e-12);
}

#[test]
fn signal_rows_are_dropped_when_the_mediator_sits_far_from_the_jet() {
    let mut event = passing_event();
    event.insert(
        Branch::GenParticleEta,
        Column::Floats(vec![4.0, 0.3, 0.1, 2.0]),
    );
    let mut cut_flow = CutFlow::new();
    let (buffer, summary) = process_signal(vec![Ok(event)], &mut cut_flow).unwrap();
    assert_eq!(summary.preselected, 1);
    assert_eq!(summary.accepted, 0);
    assert!(buffer.is_empty());
}

struct MemoryUnit {
    id: String,
    events: Vec<Event>,
    truncate: bool,
}

impl EventUnit for MemoryUnit {
    type Events = std::vec::IntoIter<Result<Event, StreamError>>;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn events(&self) -> Result<Self::Events, StreamError> {
        let mut items: Vec<Result<Event, StreamError>> =
            self.events.iter().cloned().map(Ok).collect();
        if self.truncate {
            items.push(Err(StreamError::Truncated {
                reason: "simulated torn file".to_string(),
            }));
        }
        Ok(items.into_iter())
    }
}

/// 10 events of which 3 pass preselection.
fn mixed_background_events() -> Vec<Event> {
    let mut events = Vec::new();
    for index in 0..10 {
        if index % 4 == 1 {
            events.push(passing_event());
        } else {
            events.push(single_jet_event());
        }
    }
    events
}

#[test]
fn truncated_background_unit_keeps_its_accumulated_rows() {
    let unit = MemoryUnit {
        id: "qcd_2018/7".to_string(),
        events: mixed_background_events(),
        truncate: true,
    };
    let mut cut_flow = CutFlow::new();
    let outcome = process_unit(unit.events().unwrap(), &mut cut_flow).unwrap();
    assert!(outcome.truncated);
    assert_eq!(outcome.summary.total, 10);
    assert_eq!(outcome.summary.preselected, 3);
    assert_eq!(outcome.buffer.len(), 3);
    assert_eq!(outcome.buffer.width(), BACKGROUND_COLUMNS.len());
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("svj-it-{}-{name}", std::process::id()))
}

#[test]
fn background_processing_writes_one_artifact_per_unit() {
    let out_dir = scratch_dir("bkg");
    let units = vec![
        MemoryUnit {
            id: "set_a/unit1".to_string(),
            events: mixed_background_events(),
            truncate: true,
        },
        MemoryUnit {
            id: "set_a/unit2".to_string(),
            events: vec![single_jet_event(); 4],
            truncate: false,
        },
    ];
    let mut cut_flow = CutFlow::new();
    let summary = process_background(units, &out_dir, &mut cut_flow);

    assert_eq!(summary.total, 14);
    assert_eq!(summary.preselected, 3);
    assert_eq!(summary.accepted, 3);

    let artifact = out_dir.join("set_a/unit1.npz");
    let mut archive = zip::ZipArchive::new(File::open(&artifact).unwrap()).unwrap();
    assert!(archive.by_name("X.npy").is_ok());
    // the all-rejected unit holds no rows and is skipped
    assert!(!out_dir.join("set_a/unit2.npz").exists());

    std::fs::remove_dir_all(&out_dir).unwrap();
}

#[test]
fn parallel_background_processing_matches_the_sequential_counts() {
    let out_dir = scratch_dir("bkg-par");
    let units: Vec<MemoryUnit> = (0..4)
        .map(|index| MemoryUnit {
            id: format!("set_b/unit{index}"),
            events: mixed_background_events(),
            truncate: false,
        })
        .collect();
    let (summary, cut_flow) = process_background_par(units, &out_dir);
    assert_eq!(summary.total, 40);
    assert_eq!(summary.preselected, 12);
    assert_eq!(cut_flow.get("preselection"), 12);
    for index in 0..4 {
        assert!(out_dir.join(format!("set_b/unit{index}.npz")).exists());
    }
    std::fs::remove_dir_all(&out_dir).unwrap();
}

#[test]
fn scores_can_be_dumped_next_to_the_features() {
    struct FirstColumn;
    impl Scorer for FirstColumn {
        fn score(&self, features: &[f64]) -> f64 {
            features[0]
        }
    }

    let mut cut_flow = CutFlow::new();
    let outcome = process_unit(
        mixed_background_events().into_iter().map(Ok),
        &mut cut_flow,
    )
    .unwrap();
    let scores = svj_core::pipeline::score_rows(&outcome.buffer, &FirstColumn);
    assert_eq!(scores.len(), 3);
    // ptD leads the background schema
    assert_relative_eq!(scores[0], 0.18, epsilon = 1e-12);

    let path = scratch_dir("scored").join("unit.npz");
    write_features_with_scores(&path, &outcome.buffer, &scores).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
    assert!(archive.by_name("X.npy").is_ok());
    assert!(archive.by_name("score.npy").is_ok());
    std::fs::remove_dir_all(path.parent().unwrap()).unwrap();
}
