use std::fs;

use chrono::NaiveDate;
use tempfile::tempdir;

use veil_core::{IdentifierMap, NANOS_PER_DAY, OffsetMap, OffsetPolicy};
use veil_ingest::{
    MapRepository, collect_column_values, collect_earliest_timestamps, collect_join_pairs,
};

#[test]
fn id_map_round_trips_through_repository() {
    let dir = tempdir().expect("tempdir");
    let repo = MapRepository::new(dir.path().join("maps")).expect("repository");

    let map = IdentifierMap::from_pairs([
        ("P001".to_string(), 417_220_572),
        ("P002".to_string(), 12),
        ("a,b \"quoted\"".to_string(), 900_000_001),
    ])
    .expect("build map");

    assert!(!repo.has_id_map("patient id"));
    repo.save_id_map("patient id", &map).expect("save");
    assert!(repo.has_id_map("patient id"));

    let restored = repo
        .load_id_map("patient id")
        .expect("load")
        .expect("snapshot present");
    assert_eq!(restored.export(), map.export());
    assert_eq!(restored.lookup("a,b \"quoted\""), Some(900_000_001));
    assert_eq!(restored.invert(12), Some("P002"));
}

#[test]
fn missing_snapshots_load_as_none() {
    let dir = tempdir().expect("tempdir");
    let repo = MapRepository::new(dir.path()).expect("repository");
    assert!(repo.load_id_map("patient_id").expect("load").is_none());
    assert!(repo.load_offset_pairs().expect("load").is_none());
}

#[test]
fn offsets_round_trip_including_negatives() {
    let dir = tempdir().expect("tempdir");
    let repo = MapRepository::new(dir.path()).expect("repository");

    let map = OffsetMap::from_pairs(
        OffsetPolicy::Random {
            max_days: 365,
            whole_days: true,
        },
        [
            ("P001".to_string(), -3 * NANOS_PER_DAY - NANOS_PER_DAY / 2),
            ("P002".to_string(), 42 * NANOS_PER_DAY),
        ],
    )
    .expect("build offsets");

    repo.save_offsets(&map).expect("save");
    let pairs = repo.load_offset_pairs().expect("load").expect("present");
    assert_eq!(pairs, map.export());
}

#[test]
fn malformed_surrogate_is_an_error() {
    let dir = tempdir().expect("tempdir");
    let repo = MapRepository::new(dir.path()).expect("repository");
    fs::write(
        dir.path().join("PATIENT_ID.ids.csv"),
        "original_value,surrogate_value\nP001,not-a-number\n",
    )
    .expect("write file");
    assert!(repo.load_id_map("patient_id").is_err());
}

#[test]
fn column_values_are_distinct_and_non_empty() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("demographics.csv");
    fs::write(
        &path,
        "patient id,site,admit time\n\
         P001,A,2020-01-15 10:00:00\n\
         P002,B,\n\
         P001,A,2020-02-01 08:30:00\n\
         ,C,2020-03-01 00:00:00\n",
    )
    .expect("write file");

    let values = collect_column_values(
        &path,
        &["patient id".to_string(), "missing column".to_string()],
    )
    .expect("collect");
    let patients: Vec<&str> = values["patient id"].iter().map(String::as_str).collect();
    assert_eq!(patients, vec!["P001", "P002"]);
    assert!(values["missing column"].is_empty());
}

#[test]
fn join_pairs_skip_rows_with_blanks() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("visits.csv");
    fs::write(
        &path,
        "visit id,patient id\nV1,P001\nV2,\n,P002\nV3,P002\n",
    )
    .expect("write file");

    let pairs = collect_join_pairs(&path, "visit id", "patient id").expect("collect");
    assert_eq!(
        pairs,
        vec![
            ("V1".to_string(), "P001".to_string()),
            ("V3".to_string(), "P002".to_string()),
        ]
    );
}

#[test]
fn earliest_timestamp_spans_all_time_columns() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("events.csv");
    fs::write(
        &path,
        "patient id,start,end\n\
         P001,2020-03-01 12:00:00,2020-02-20\n\
         P001,2020-05-01 00:00:00,garbage\n\
         P002,,2021-01-01 09:15:00\n",
    )
    .expect("write file");

    let earliest = collect_earliest_timestamps(
        &path,
        "patient id",
        &["start".to_string(), "end".to_string()],
    )
    .expect("collect");

    let expected_p001 = NaiveDate::from_ymd_opt(2020, 2, 20)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("timestamp");
    assert_eq!(earliest["P001"], expected_p001);
    let expected_p002 = NaiveDate::from_ymd_opt(2021, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 15, 0))
        .expect("timestamp");
    assert_eq!(earliest["P002"], expected_p002);
}
