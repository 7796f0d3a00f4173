//! Loading run inputs from disk.

use std::path::Path;

use revocation_archive_cli::{load_identities, load_roster};

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_inputs_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let agents = write(
        dir.path(),
        "agents.yaml",
        "- Mozilla/5.0 (X11; Linux x86_64)\n- Mozilla/5.0 (Macintosh)\n",
    );
    let names = write(
        dir.path(),
        "names.yaml",
        "\"2021-001\":\n  officer_name: Jane A Doe\n  agency: SFPD\n\"2021-002\":\n  officer_name: John Roe\n  agency: OPD\n",
    );

    let pool = load_identities(&agents).unwrap();
    assert_eq!(pool.len(), 2);

    let roster = load_roster(&names).unwrap();
    let casenos: Vec<&str> = roster.iter().map(|e| e.caseno.as_str()).collect();
    assert_eq!(casenos, vec!["2021-001", "2021-002"]);
    assert_eq!(roster[1].last_name(), "Roe");
}

#[test]
fn test_missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.yaml");
    let err = load_identities(&missing).unwrap_err();
    assert!(format!("{err:#}").contains("nope.yaml"));
}

#[test]
fn test_malformed_roster_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let names = write(dir.path(), "names.yaml", "- just\n- a list\n");
    let err = load_roster(&names).unwrap_err();
    assert!(format!("{err:#}").contains("names.yaml"));
}
