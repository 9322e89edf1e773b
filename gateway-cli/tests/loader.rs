use std::fs;
use std::path::Path;
use std::sync::Arc;

use gateway_cli::{populate, ConfigSet, LoadError};
use mqtt_bus::MemoryBus;
use pico_gateway::{Gateway, GatewayConfig};
use rstest::rstest;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn layout() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "cs.yaml",
        "name: cs01\nsimulated: true\nprimary:\n  incls: [\".*\"]\n---\nname: cs02\nsimulated: true\nsecondary:\n  incls: [\"^br\"]\n",
    );
    write(
        dir.path(),
        "locos/br.yml",
        "name: br01\naddr: 3\nfcts:\n  light:\n    no: 0\n---\nname: br02\naddr: 4\n",
    );
    write(dir.path(), "locos/v200.yaml", "name: v200\naddr: 7\n");
    write(dir.path(), "notes.txt", "not a config");
    dir
}

#[test]
fn test_load_dir_recursive() {
    let dir = layout();
    let mut configs = ConfigSet::new();

    assert_eq!(configs.load_dir(dir.path()).unwrap(), 3);
    assert_eq!(
        configs.controllers.keys().collect::<Vec<_>>(),
        vec!["cs01", "cs02"]
    );
    assert_eq!(
        configs.entities.keys().collect::<Vec<_>>(),
        vec!["br01", "br02", "v200"]
    );
    assert_eq!(configs.entities["br01"].fcts["light"].no, 0);
}

#[test]
fn test_later_file_overwrites() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.yaml", "name: br01\naddr: 3\n");
    write(dir.path(), "b.yaml", "name: br01\naddr: 5\n");

    let mut configs = ConfigSet::new();
    configs.load_dir(dir.path()).unwrap();
    assert_eq!(configs.entities["br01"].addr, 5);
}

#[rstest]
#[case::missing_name("addr: 3\n")]
#[case::unknown_kind("name: x\ncolor: red\n")]
#[case::bad_yaml("name: [unclosed\n")]
#[case::bad_field("name: br01\naddr: not-a-number\n")]
fn test_invalid_file(#[case] content: &str) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "broken.yaml", content);

    let mut configs = ConfigSet::new();
    let err = configs.load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::File { .. }));
    assert!(err.to_string().contains("broken.yaml"));
}

#[test]
fn test_missing_dir() {
    let mut configs = ConfigSet::new();
    let err = configs.load_dir(Path::new("/definitely/not/here")).unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_populate_gateway() {
    let dir = layout();
    let mut configs = ConfigSet::new();
    configs.load_dir(dir.path()).unwrap();

    let bus = Arc::new(MemoryBus::new());
    let mut gateway = Gateway::new(GatewayConfig::default(), bus.clone()).unwrap();
    populate(&mut gateway, &configs).unwrap();

    let snapshot = gateway.snapshot();
    let cs01 = snapshot.controller("cs01").unwrap();
    assert_eq!(cs01.primaries, vec!["br01", "br02", "v200"]);
    let cs02 = snapshot.controller("cs02").unwrap();
    assert_eq!(cs02.secondaries, vec!["br01", "br02"]);
    assert_eq!(snapshot.entity("v200").unwrap().primary.as_deref(), Some("cs01"));
    assert!(snapshot.entity("v200").unwrap().secondaries.is_empty());

    gateway.listen().unwrap();
    bus.inject("pico-cs/loco/br01/speed/set", "12", false);
    gateway.close().unwrap();
    assert_eq!(bus.retained("pico-cs/loco/br01/speed"), Some(b"12".to_vec()));
}

#[test]
fn test_populate_conflict_aborts() {
    let mut configs = ConfigSet::new();
    configs
        .parse_yaml("name: cs01\nsimulated: true\nprimary:\n  incls: [\".*\"]\n---\nname: cs02\nsimulated: true\nprimary:\n  incls: [\"^br\"]\n---\nname: br01\naddr: 3\n")
        .unwrap();

    let bus = Arc::new(MemoryBus::new());
    let mut gateway = Gateway::new(GatewayConfig::default(), bus).unwrap();
    let err = populate(&mut gateway, &configs).unwrap_err();
    assert!(format!("{err:#}").contains("br01"));
}

#[test]
fn test_populate_unsupported_transport() {
    let mut configs = ConfigSet::new();
    configs.parse_yaml("name: cs01\nhost: 10.0.0.2\nport: 4242\n").unwrap();

    let bus = Arc::new(MemoryBus::new());
    let mut gateway = Gateway::new(GatewayConfig::default(), bus).unwrap();
    let err = populate(&mut gateway, &configs).unwrap_err();
    assert!(err.to_string().contains("tcp://10.0.0.2:4242"));
}
