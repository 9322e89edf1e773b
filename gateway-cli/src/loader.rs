//! Configuration directory loader
//!
//! A configuration directory holds YAML files with any number of documents
//! each. A document with a `host`, `port` or `simulated` key describes a
//! command station, a document with an `addr` key describes a loco. Files
//! are read in path order; a later document overwrites an earlier one with
//! the same name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use pico_gateway::{ControllerConfig, EntityConfig};
use serde::Deserialize;
use serde_yaml::Value;

const YAML_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

const STATION_KEYS: [&str; 3] = ["host", "port", "simulated"];
const LOCO_KEY: &str = "addr";

/// Errors while loading configuration files
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid document {0} - name missing")]
    MissingName(String),

    #[error("Invalid configuration {0} - neither command station nor loco")]
    Unrecognized(String),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: Box<LoadError>,
    },
}

/// Command station and loco descriptors by name
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConfigSet {
    pub controllers: BTreeMap<String, ControllerConfig>,
    pub entities: BTreeMap<String, EntityConfig>,
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every YAML file below `dir`. Returns the number of files read.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, LoadError> {
        let mut files = Vec::new();
        collect_files(dir, &mut files)?;
        files.sort();

        let mut loaded = 0;
        for path in files {
            if !is_yaml(&path) {
                tracing::info!("...skipped {}", path.display());
                continue;
            }
            self.load_file(&path)?;
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), LoadError> {
        let source = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_yaml(&source).map_err(|e| LoadError::File {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        tracing::info!("...loaded {}", path.display());
        Ok(())
    }

    /// Parse a multi-document YAML source.
    pub fn parse_yaml(&mut self, source: &str) -> Result<(), LoadError> {
        for document in serde_yaml::Deserializer::from_str(source) {
            let mut value = Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }

            let Some(name) = value.get("name").map(describe) else {
                return Err(LoadError::MissingName(describe(&value)));
            };

            if STATION_KEYS.iter().any(|key| value.get(key).is_some()) {
                normalize_port(&mut value);
                let config: ControllerConfig = serde_yaml::from_value(value)?;
                if self.controllers.insert(config.name.clone(), config).is_some() {
                    tracing::info!("...command station {} overwritten", name);
                }
            } else if value.get(LOCO_KEY).is_some() {
                let config: EntityConfig = serde_yaml::from_value(value)?;
                if self.entities.insert(config.name.clone(), config).is_some() {
                    tracing::info!("...loco {} overwritten", name);
                }
            } else {
                return Err(LoadError::Unrecognized(describe(&value)));
            }
        }
        Ok(())
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), LoadError> {
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let path = entry
            .map_err(|source| LoadError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| YAML_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Ports may be written as numbers; the descriptor keeps them as text.
fn normalize_port(value: &mut Value) {
    let port = match value.get("port") {
        Some(Value::Number(n)) => n.to_string(),
        _ => return,
    };
    value["port"] = Value::String(port);
}

fn describe(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pico_gateway::{FilterConfig, Transport};

    const LAYOUT: &str = r#"
name: cs01
port: /dev/ttyACM0
primary:
  incls: [".*"]
  excls: ["^v"]
---
name: br01
addr: 3
fcts:
  light:
    no: 0
  horn:
    no: 2
---
name: cs02
host: 192.168.1.20
port: 4242
secondary:
  incls: [".*"]
"#;

    #[test]
    fn test_parse_multi_document() {
        let mut set = ConfigSet::new();
        set.parse_yaml(LAYOUT).unwrap();

        assert_eq!(set.controllers.len(), 2);
        assert_eq!(set.entities.len(), 1);

        let cs01 = &set.controllers["cs01"];
        assert_eq!(
            cs01.transport().unwrap(),
            Transport::Serial { port: "/dev/ttyACM0".to_string() }
        );
        assert_eq!(cs01.primary, FilterConfig::all().excluding(["^v"]));

        let cs02 = &set.controllers["cs02"];
        assert_eq!(cs02.port.as_deref(), Some("4242"));
        assert_eq!(cs02.secondary, FilterConfig::all());
        assert_eq!(cs02.primary, FilterConfig::default());

        let br01 = &set.entities["br01"];
        assert_eq!(br01.addr, 3);
        assert_eq!(br01.fcts["horn"].no, 2);
    }

    #[test]
    fn test_simulated_station() {
        let mut set = ConfigSet::new();
        set.parse_yaml("name: sim\nsimulated: true\n").unwrap();
        assert_eq!(set.controllers["sim"].transport().unwrap(), Transport::Simulated);
    }

    #[test]
    fn test_station_ios() {
        let mut set = ConfigSet::new();
        set.parse_yaml("name: cs01\nport: /dev/ttyACM0\nios:\n  button:\n    gpio: 12\n  door:\n    gpio: 13\n")
            .unwrap();
        let cs01 = &set.controllers["cs01"];
        assert_eq!(cs01.ios.len(), 2);
        assert_eq!(cs01.ios["button"].gpio, 12);
        assert_eq!(cs01.ios["door"].gpio, 13);
        assert!(cs01.validate().is_ok());
    }

    #[test]
    fn test_missing_name() {
        let mut set = ConfigSet::new();
        let err = set.parse_yaml("addr: 3\n").unwrap_err();
        assert!(matches!(err, LoadError::MissingName(_)));
    }

    #[test]
    fn test_unrecognized_document() {
        let mut set = ConfigSet::new();
        let err = set.parse_yaml("name: what\ncolor: red\n").unwrap_err();
        assert!(matches!(err, LoadError::Unrecognized(_)));
    }

    #[test]
    fn test_later_document_overwrites() {
        let mut set = ConfigSet::new();
        set.parse_yaml("name: br01\naddr: 3\n---\nname: br01\naddr: 4\n").unwrap();
        assert_eq!(set.entities["br01"].addr, 4);
    }

    #[test]
    fn test_empty_documents_skipped() {
        let mut set = ConfigSet::new();
        set.parse_yaml("---\n---\nname: br01\naddr: 3\n").unwrap();
        assert_eq!(set.entities.len(), 1);
    }

    #[test]
    fn test_yaml_extension() {
        assert!(is_yaml(Path::new("a/cs.yaml")));
        assert!(is_yaml(Path::new("a/cs.YML")));
        assert!(!is_yaml(Path::new("a/cs.json")));
        assert!(!is_yaml(Path::new("a/README")));
    }
}
