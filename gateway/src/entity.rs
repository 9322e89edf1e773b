//! Locos known to the gateway

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::EntityConfig;
use crate::error::Result;

/// A validated loco
///
/// Immutable after creation. Which command stations control it is tracked
/// by the ownership registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    name: String,
    addr: u16,
    functions: BTreeMap<String, u8>,
}

impl Entity {
    pub fn from_config(config: &EntityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: config.name.clone(),
            addr: config.addr,
            functions: config
                .fcts
                .iter()
                .map(|(name, fct)| (name.clone(), fct.no))
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decoder address
    pub fn addr(&self) -> u16 {
        self.addr
    }

    /// Function names and decoder function numbers, ordered by name.
    pub fn functions(&self) -> impl Iterator<Item = (&str, u8)> + '_ {
        self.functions.iter().map(|(name, no)| (name.as_str(), *no))
    }

    pub fn function(&self, name: &str) -> Option<u8> {
        self.functions.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = EntityConfig::new("br01", 3)
            .with_function("light", 0)
            .with_function("horn", 2);
        let entity = Entity::from_config(&config).unwrap();

        assert_eq!(entity.name(), "br01");
        assert_eq!(entity.addr(), 3);
        assert_eq!(entity.function("horn"), Some(2));
        assert_eq!(entity.function("bell"), None);
        assert_eq!(
            entity.functions().collect::<Vec<_>>(),
            vec![("horn", 2), ("light", 0)]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(Entity::from_config(&EntityConfig::new("br/01", 3)).is_err());
    }
}
