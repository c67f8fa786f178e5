mod common;

use chrono::NaiveDate;
use common::{FailingDistricts, TestWorkspace, clean, known_districts, pledge_dataset};
use pledge_validator::{
    clean::{CleanedSnapshot, Cleaner},
    config::ValidatorConfig,
    correction::{Correction, CorrectionRevalidator, FinalDataset},
    data::{CellValue, CurrentValue},
    district::DistrictLookup,
    error::{CorrectionError, ErrorKind},
    schema::SchemaDescriptor,
    store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore, SnapshotToken},
    validate::Orchestrator,
};

const GOOD_IBAN: &str = "IE29AIBK93115212345678";
const BAD_IBAN: &str = "IE29AIBK931152";

fn apply(
    store: &mut dyn SnapshotStore,
    token: &SnapshotToken,
    corrections: &[Correction],
    lookup: &dyn DistrictLookup,
) -> Result<FinalDataset, CorrectionError> {
    let config = ValidatorConfig::default();
    let schema = SchemaDescriptor::from_config(&config);
    let cleaner = Cleaner::new(&schema, &config);
    let orchestrator = Orchestrator::new(&schema, &config, lookup);
    CorrectionRevalidator::new(&orchestrator, &cleaner).apply_corrections(store, token, corrections)
}

fn stored(rows: &[&[(&str, &str)]]) -> (MemorySnapshotStore, SnapshotToken, CleanedSnapshot) {
    let snapshot = clean(pledge_dataset(rows), &ValidatorConfig::default());
    let mut store = MemorySnapshotStore::new();
    let token = store.insert(&snapshot).expect("insert snapshot");
    (store, token, snapshot)
}

fn text(value: &str) -> CellValue {
    CellValue::String(value.to_string())
}

#[test]
fn unknown_token_is_session_expired() {
    let mut store = MemorySnapshotStore::new();
    let token = SnapshotToken::generate();
    let result = apply(
        &mut store,
        &token,
        &[Correction::new(2, "IBAN", GOOD_IBAN)],
        &known_districts(),
    );
    match result {
        Err(CorrectionError::SessionExpired(expired)) => assert_eq!(expired, token),
        other => panic!("expected SessionExpired, got {other:?}"),
    }
}

#[test]
fn failing_batch_leaves_snapshot_untouched() {
    let (mut store, token, original) =
        stored(&[&[("IBAN", BAD_IBAN)], &[("Eircode", "D02 AF3")]]);
    let corrections = [
        Correction::new(2, "IBAN", GOOD_IBAN),
        Correction::new(3, "Eircode", "still bad"),
    ];

    let errors = match apply(&mut store, &token, &corrections, &known_districts()) {
        Err(CorrectionError::Rejected(errors)) => errors,
        other => panic!("expected rejection, got {other:?}"),
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].row, Some(3));
    assert_eq!(errors[0].field.as_deref(), Some("Eircode"));
    assert!(errors[0].message.contains("'still bad'"));
    assert_eq!(
        errors[0].current_value,
        Some(CurrentValue::Value(text("STILL BAD")))
    );

    assert_eq!(store.get(&token).unwrap(), Some(original));
}

#[test]
fn passing_batch_consumes_snapshot_and_returns_final_dataset() {
    let (mut store, token, _) = stored(&[&[("IBAN", BAD_IBAN)], &[("Eircode", "D02 AF3")]]);
    let corrections = [
        Correction::new(2, "IBAN", GOOD_IBAN),
        Correction::new(3, "Eircode", "d02 af30"),
    ];

    let final_dataset = apply(&mut store, &token, &corrections, &known_districts()).unwrap();
    let dataset = final_dataset.dataset();
    assert_eq!(dataset.cell(0, "IBAN"), Some(&text(GOOD_IBAN)));
    assert_eq!(dataset.cell(1, "Eircode"), Some(&text("D02 AF30")));
    assert!(store.is_empty());

    let replay = apply(&mut store, &token, &corrections, &known_districts());
    assert!(matches!(replay, Err(CorrectionError::SessionExpired(_))));
}

#[test]
fn only_corrected_cells_are_rechecked() {
    let (mut store, token, _) = stored(&[&[("IBAN", BAD_IBAN)], &[("IBAN", BAD_IBAN)]]);

    let final_dataset = apply(
        &mut store,
        &token,
        &[Correction::new(2, "IBAN", GOOD_IBAN)],
        &known_districts(),
    )
    .unwrap();
    assert_eq!(final_dataset.dataset().cell(0, "IBAN"), Some(&text(GOOD_IBAN)));
    assert_eq!(final_dataset.dataset().cell(1, "IBAN"), Some(&text(BAD_IBAN)));
}

#[test]
fn out_of_range_and_unknown_field_corrections_are_ignored() {
    let (mut store, token, original) = stored(&[&[]]);
    let corrections = [
        Correction::new(1, "IBAN", "header row"),
        Correction::new(99, "IBAN", "junk"),
        Correction::new(2, "Shoe Size", "42"),
    ];

    let final_dataset = apply(&mut store, &token, &corrections, &known_districts()).unwrap();
    assert_eq!(final_dataset.into_inner(), original.into_cleaned());
}

#[test]
fn empty_batch_finalises_snapshot() {
    let (mut store, token, original) = stored(&[&[("Title", "Dr")]]);
    let final_dataset = apply(&mut store, &token, &[], &known_districts()).unwrap();
    assert_eq!(final_dataset.dataset(), original.cleaned());
    assert!(store.is_empty());
}

#[test]
fn date_corrections_are_normalised() {
    let (mut store, token, _) = stored(&[&[("DOB", "")]]);
    let final_dataset = apply(
        &mut store,
        &token,
        &[Correction::new(2, "DOB", "03/04/1981")],
        &known_districts(),
    )
    .unwrap();
    assert_eq!(
        final_dataset.dataset().cell(0, "DOB"),
        Some(&CellValue::Date(NaiveDate::from_ymd_opt(1981, 4, 3).unwrap()))
    );
}

#[test]
fn later_correction_to_same_cell_wins() {
    let (mut store, token, _) = stored(&[&[]]);
    let corrections = [
        Correction::new(2, "BIC", "nope"),
        Correction::new(2, "BIC", "BOFIIE2D"),
    ];
    let final_dataset = apply(&mut store, &token, &corrections, &known_districts()).unwrap();
    assert_eq!(final_dataset.dataset().cell(0, "BIC"), Some(&text("BOFIIE2D")));
}

#[test]
fn repeated_bad_correction_reports_cell_once() {
    let (mut store, token, _) = stored(&[&[]]);
    let corrections = [
        Correction::new(2, "BIC", "nope"),
        Correction::new(2, "BIC", "still nope"),
    ];
    match apply(&mut store, &token, &corrections, &known_districts()) {
        Err(CorrectionError::Rejected(errors)) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].message.contains("'still nope'"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn district_correction_during_outage_is_rejected() {
    let (mut store, token, original) = stored(&[&[("District", "Atlantis")]]);
    let corrections = [
        Correction::new(2, "District", "Kerry North"),
        Correction::new(2, "IBAN", GOOD_IBAN),
    ];
    match apply(&mut store, &token, &corrections, &FailingDistricts) {
        Err(CorrectionError::Rejected(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].kind, ErrorKind::System);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(store.get(&token).unwrap(), Some(original));
}

#[test]
fn file_store_survives_rejection_and_commits_on_success() {
    let workspace = TestWorkspace::new();
    let mut store = FileSnapshotStore::open(&workspace.path().join("snapshots")).unwrap();
    let snapshot = clean(
        pledge_dataset(&[&[("Post Opt-In", "maybe")]]),
        &ValidatorConfig::default(),
    );
    let token = store.insert(&snapshot).unwrap();

    let rejected = apply(
        &mut store,
        &token,
        &[Correction::new(2, "Post Opt-In", "perhaps")],
        &known_districts(),
    );
    assert!(matches!(rejected, Err(CorrectionError::Rejected(_))));
    assert_eq!(store.get(&token).unwrap(), Some(snapshot));

    let accepted = apply(
        &mut store,
        &token,
        &[Correction::new(2, "Post Opt-In", "1")],
        &known_districts(),
    )
    .unwrap();
    assert_eq!(accepted.dataset().cell(0, "Post Opt-In"), Some(&text("Yes")));
    assert_eq!(store.get(&token).unwrap(), None);
}

#[test]
fn padded_field_names_match_their_column() {
    let (mut store, token, _) = stored(&[&[("IBAN", BAD_IBAN)]]);
    let final_dataset = apply(
        &mut store,
        &token,
        &[Correction::new(2, " IBAN ", GOOD_IBAN)],
        &known_districts(),
    )
    .unwrap();
    assert_eq!(final_dataset.dataset().cell(0, "IBAN"), Some(&text(GOOD_IBAN)));
}

#[test]
fn interleaved_repeat_edits_recheck_each_cell_once() {
    let (mut store, token, _) = stored(&[&[], &[]]);
    let mut corrections = Vec::new();
    for attempt in 0..200 {
        corrections.push(Correction::new(2, "BIC", &format!("bad{attempt}")));
        corrections.push(Correction::new(3, "Eircode", &format!("x{attempt}")));
    }
    match apply(&mut store, &token, &corrections, &known_districts()) {
        Err(CorrectionError::Rejected(errors)) => {
            let cells = errors
                .iter()
                .map(|e| (e.row, e.field.clone()))
                .collect::<Vec<_>>();
            assert_eq!(
                cells,
                vec![
                    (Some(2), Some("BIC".to_string())),
                    (Some(3), Some("Eircode".to_string())),
                ]
            );
            assert!(errors[0].message.contains("'bad199'"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}
