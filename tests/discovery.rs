mod common;

use std::fs;

use sales_ingest::DiscoveryError;
use sales_ingest::ingestion::discover;

#[test]
fn discover_filters_and_sorts() {
    let (_dir, config) = common::layout();
    let inc = &config.incoming_dir;
    for name in ["b.xlsx", "a.XLSX", "~$a.xlsx", "~$open.XLSX", "notes.txt", "c.csv", "old.xls"] {
        fs::write(inc.join(name), b"x").unwrap();
    }
    fs::create_dir(inc.join("nested.xlsx")).unwrap();
    fs::write(inc.join("nested.xlsx").join("d.xlsx"), b"x").unwrap();

    let files = discover(inc).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.XLSX", "b.xlsx"]);
}

#[test]
fn discover_fails_when_only_lock_files_exist() {
    let (_dir, config) = common::layout();
    fs::write(config.incoming_dir.join("~$sales.xlsx"), b"x").unwrap();

    let err = discover(&config.incoming_dir).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoInputFiles { .. }));
    assert!(err.to_string().contains("no input files"));
}

#[test]
fn discover_fails_on_empty_directory() {
    let (_dir, config) = common::layout();
    let err = discover(&config.incoming_dir).unwrap_err();
    assert!(matches!(err, DiscoveryError::NoInputFiles { .. }));
}

#[test]
fn discover_reports_missing_directory() {
    let (dir, _config) = common::layout();
    let err = discover(dir.path().join("does_not_exist")).unwrap_err();
    assert!(matches!(err, DiscoveryError::Io { .. }));
}

#[test]
fn discover_has_no_side_effects() {
    let (_dir, config) = common::layout();
    common::write_single(&config.incoming_dir.join("one.xlsx"), 1, "SC");
    let before = common::names_in(&config.incoming_dir);
    discover(&config.incoming_dir).unwrap();
    discover(&config.incoming_dir).unwrap();
    assert_eq!(common::names_in(&config.incoming_dir), before);
    assert!(common::names_in(&config.work_dir).is_empty());
}
