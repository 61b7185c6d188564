//! Registry behaviour over a fake hwmon tree.

use lensors_hw::{DeviceId, HwmonSource, SensorKind, SensorTree, TreeOptions};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

fn hwmon_dir(root: &TempDir, entry: &str, name: &str) -> std::path::PathBuf {
    let dir = root.path().join(entry);
    fs::create_dir(&dir).unwrap();
    write(&dir, "name", &format!("{}\n", name));
    dir
}

fn tree(root: &TempDir) -> SensorTree {
    SensorTree::new(Box::new(HwmonSource::new(root.path())))
}

#[test]
fn test_coretemp_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000\n");
    write(&dir, "temp1_label", "Package\n");

    let tree = tree(&root);
    assert_eq!(tree.discover(), 1);
    tree.refresh();

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "coretemp");
    assert_eq!(snapshot[0].sensors.len(), 1);

    let sensor = &snapshot[0].sensors[0];
    assert_eq!(sensor.label, "Package");
    assert_eq!(sensor.kind, SensorKind::Temperature);
    assert_eq!(sensor.value, "45.0 °C");
    assert_eq!(sensor.min, "45.0 °C");
    assert_eq!(sensor.max, "45.0 °C");
}

#[test]
fn test_refresh_tracks_bounds_and_history() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000");

    let tree = tree(&root);
    tree.discover();
    write(&dir, "temp1_input", "50000");
    tree.refresh();
    write(&dir, "temp1_input", "40000");
    tree.refresh();

    let sensor = &tree.snapshot()[0].sensors[0];
    assert_eq!(sensor.value, "40.0 °C");
    assert_eq!(sensor.min, "40.0 °C");
    assert_eq!(sensor.max, "50.0 °C");

    let id = DeviceId::new(dir.display().to_string());
    let values: Vec<f64> = tree
        .history(&id, "temp1")
        .unwrap()
        .iter()
        .map(|p| p.value)
        .collect();
    assert_eq!(values, vec![45000.0, 50000.0, 40000.0]);
}

#[test]
fn test_non_numeric_content_keeps_sensor() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "nct6775");
    write(&dir, "in0_input", "1200");

    let tree = tree(&root);
    tree.discover();
    write(&dir, "in0_input", "garbage");
    tree.refresh();

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    let sensor = &snapshot[0].sensors[0];
    assert_eq!(sensor.value, "N/A");
    assert_eq!(sensor.min, "N/A");
    assert_eq!(sensor.max, "N/A");
}

#[test]
fn test_rediscovery_does_not_duplicate() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000");
    write(&dir, "temp2_input", "47000");

    let tree = tree(&root);
    assert_eq!(tree.discover(), 1);
    tree.refresh();
    assert_eq!(tree.discover(), 0);

    assert_eq!(tree.len(), 1);
    let snapshot = tree.snapshot();
    assert_eq!(snapshot[0].sensors.len(), 2);

    // Same sensor identity: history from before the rediscovery survives
    let id = DeviceId::new(dir.display().to_string());
    assert_eq!(tree.history(&id, "temp1").unwrap().len(), 2);
}

#[test]
fn test_rediscovery_picks_up_new_hardware() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000");

    let tree = tree(&root);
    tree.discover();

    write(&dir, "temp2_input", "47000");
    let other = hwmon_dir(&root, "hwmon1", "acpitz");
    write(&other, "temp1_input", "30000");

    assert_eq!(tree.discover(), 1);
    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].sensors.len(), 2);
    assert_eq!(snapshot[1].name, "acpitz");
}

#[test]
fn test_vanished_device_is_evicted() {
    let root = tempfile::tempdir().unwrap();
    let first = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&first, "temp1_input", "45000");
    let second = hwmon_dir(&root, "hwmon1", "nvme");
    write(&second, "temp1_input", "38000");

    let tree = tree(&root);
    tree.discover();
    fs::remove_dir_all(&first).unwrap();

    let report = tree.refresh();
    assert_eq!(report.devices, 1);
    assert_eq!(report.evicted.len(), 1);
    assert_eq!(report.evicted[0].1, "coretemp");

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "nvme");

    // Removal is terminal until discovery runs again
    tree.refresh();
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_failure_on_second_sensor_evicts_whole_device() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000");
    write(&dir, "temp2_input", "47000");
    let other = hwmon_dir(&root, "hwmon1", "nvme");
    write(&other, "temp1_input", "38000");

    let tree = tree(&root);
    tree.discover();
    let coretemp = DeviceId::new(dir.display().to_string());
    assert_eq!(tree.history(&coretemp, "temp1").unwrap().len(), 1);

    write(&dir, "temp1_input", "99000");
    fs::remove_file(dir.join("temp2_input")).unwrap();

    let report = tree.refresh();
    assert_eq!(report.evicted, vec![(coretemp.clone(), "coretemp".to_string())]);
    assert!(tree.history(&coretemp, "temp1").is_none());

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "nvme");
    assert_eq!(snapshot[0].sensors[0].value, "38.0 °C");
}

#[test]
fn test_zero_readings_and_empty_devices_are_hidden() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "nct6775");
    write(&dir, "fan1_input", "0");
    write(&dir, "fan2_input", "1100");
    let empty = hwmon_dir(&root, "hwmon1", "acpi_fan");
    write(&empty, "fan1_input", "0");

    let tree = tree(&root);
    tree.discover();
    assert_eq!(tree.len(), 2);

    let snapshot = tree.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].sensors.len(), 1);
    assert_eq!(snapshot[0].sensors[0].key, "fan2");
    assert_eq!(snapshot[0].sensors[0].value, "1100.0 RPM");
}

#[test]
fn test_zero_readings_shown_when_policy_disabled() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "nct6775");
    write(&dir, "fan1_input", "0");

    let options = TreeOptions {
        hide_zero: false,
        ..TreeOptions::default()
    };
    let tree = SensorTree::with_options(Box::new(HwmonSource::new(root.path())), options);
    tree.discover();

    let snapshot = tree.snapshot();
    assert_eq!(snapshot[0].sensors[0].value, "0.0 RPM");
}

#[test]
fn test_history_limit_from_options() {
    let root = tempfile::tempdir().unwrap();
    let dir = hwmon_dir(&root, "hwmon0", "coretemp");
    write(&dir, "temp1_input", "45000");

    let options = TreeOptions {
        history_limit: Some(3),
        ..TreeOptions::default()
    };
    let tree = SensorTree::with_options(Box::new(HwmonSource::new(root.path())), options);
    tree.discover();
    for _ in 0..5 {
        tree.refresh();
    }

    let id = DeviceId::new(dir.display().to_string());
    assert_eq!(tree.history(&id, "temp1").unwrap().len(), 3);
    assert!(tree.history(&id, "temp9").is_none());
}
