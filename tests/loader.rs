use std::fs;

use camino::Utf8PathBuf;
use serde_json::json;

use neuro_catalog::domain::NOT_SPECIFIED;
use neuro_catalog::loader::load_datasets;

fn temp_cache() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

#[test]
fn merges_cache_files_and_skips_corrupt_ones() {
    let (_temp, root) = temp_cache();
    let openneuro = json!([
        {"id": "ds001", "name": "Faces", "source": "openneuro", "modalities": ["MRI"]},
        {"id": "ds002", "name": "", "source": "openneuro", "tasks": []},
        {"id": "ds001", "name": "Faces again", "source": "openneuro"}
    ]);
    let dandi = json!([
        {"id": "ds001", "name": "Same id, other source", "source": "dandi"},
        {"id": "000003/0.230629.1955", "name": "Granule cells", "source": "dandi", "size": "12"}
    ]);
    fs::write(root.join("openneuro_datasets.json"), openneuro.to_string()).unwrap();
    fs::write(root.join("dandi_datasets.json"), dandi.to_string()).unwrap();
    fs::write(root.join("broken_datasets.json"), "[{\"id\": ").unwrap();
    fs::write(root.join("notes.json"), "[]").unwrap();

    let loaded = load_datasets(&root).unwrap();

    assert_eq!(loaded.files.len(), 2);
    assert_eq!(loaded.skipped_files.len(), 1);
    assert!(loaded.skipped_files[0].ends_with("broken_datasets.json"));
    assert_eq!(loaded.duplicates, 1);
    assert_eq!(loaded.datasets.len(), 4);

    let faces = loaded
        .datasets
        .iter()
        .find(|record| record.identity() == ("openneuro", "ds001"))
        .unwrap();
    assert_eq!(faces.name, "Faces");
    assert!(
        loaded
            .datasets
            .iter()
            .any(|record| record.identity() == ("dandi", "ds001"))
    );

    let untitled = loaded
        .datasets
        .iter()
        .find(|record| record.id == "ds002")
        .unwrap();
    assert_eq!(untitled.name, NOT_SPECIFIED);
    assert_eq!(untitled.tasks, vec![NOT_SPECIFIED]);

    let granule = loaded
        .datasets
        .iter()
        .find(|record| record.source == "dandi" && record.size == 12);
    assert!(granule.is_some());
}

#[test]
fn non_array_cache_is_skipped() {
    let (_temp, root) = temp_cache();
    fs::write(root.join("openneuro_datasets.json"), "{\"id\": \"ds001\"}").unwrap();

    let loaded = load_datasets(&root).unwrap();
    assert!(loaded.datasets.is_empty());
    assert_eq!(loaded.skipped_files.len(), 1);
}

#[test]
fn missing_directory_loads_nothing() {
    let (_temp, root) = temp_cache();
    let loaded = load_datasets(&root.join("does-not-exist")).unwrap();
    assert!(loaded.datasets.is_empty());
    assert!(loaded.files.is_empty());
}

#[test]
fn records_without_id_are_skipped_not_deduplicated() {
    let (_temp, root) = temp_cache();
    let records = json!([
        {"name": "Alpha", "source": "openneuro"},
        {"id": "N/A", "name": "Beta", "source": "openneuro"},
        {"id": "ds001", "name": "Faces", "source": "openneuro"}
    ]);
    fs::write(root.join("openneuro_datasets.json"), records.to_string()).unwrap();

    let loaded = load_datasets(&root).unwrap();
    assert_eq!(loaded.datasets.len(), 1);
    assert_eq!(loaded.datasets[0].id, "ds001");
    assert_eq!(loaded.skipped_records, 2);
    assert_eq!(loaded.duplicates, 0);
}
