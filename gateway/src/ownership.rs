//! Primary and secondary ownership of locos
//!
//! Every loco has at most one primary command station, which executes its
//! commands and reports its state, and any number of secondary stations that
//! mirror the published state onto their own track.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use crate::error::OwnershipError;

/// Role of a command station for one loco
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => f.write_str("primary"),
            Role::Secondary => f.write_str("secondary"),
        }
    }
}

/// Ownership state of one loco
///
/// The primary is never one of the secondaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ownership {
    primary: Option<String>,
    secondaries: BTreeSet<String>,
}

impl Ownership {
    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn secondaries(&self) -> impl Iterator<Item = &str> + '_ {
        self.secondaries.iter().map(String::as_str)
    }

    pub fn role_of(&self, controller: &str) -> Option<Role> {
        if self.primary.as_deref() == Some(controller) {
            Some(Role::Primary)
        } else if self.secondaries.contains(controller) {
            Some(Role::Secondary)
        } else {
            None
        }
    }

    fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondaries.is_empty()
    }
}

/// Ownership of all locos, keyed by loco name
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    entries: HashMap<String, Ownership>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide the role of `controller` for `entity`.
    ///
    /// `primary_match` and `secondary_match` are the results of the
    /// controller's filters for the entity name. Returns the assigned role,
    /// or `None` when the controller gets no role.
    pub fn assign(
        &mut self,
        controller: &str,
        entity: &str,
        primary_match: bool,
        secondary_match: bool,
    ) -> Result<Option<Role>, OwnershipError> {
        let ownership = self.entries.entry(entity.to_string()).or_default();

        if primary_match {
            return match ownership.primary.as_deref() {
                None if ownership.secondaries.contains(controller) => {
                    Err(OwnershipError::AlreadyAssigned {
                        entity: entity.to_string(),
                        controller: controller.to_string(),
                        role: Role::Secondary,
                    })
                }
                None => {
                    ownership.primary = Some(controller.to_string());
                    Ok(Some(Role::Primary))
                }
                Some(primary) if primary == controller => Err(OwnershipError::AlreadyAssigned {
                    entity: entity.to_string(),
                    controller: controller.to_string(),
                    role: Role::Primary,
                }),
                Some(primary) => Err(OwnershipError::Conflict {
                    entity: entity.to_string(),
                    primary: primary.to_string(),
                    controller: controller.to_string(),
                }),
            };
        }

        if secondary_match
            && ownership.primary.as_deref() != Some(controller)
            && ownership.secondaries.insert(controller.to_string())
        {
            return Ok(Some(Role::Secondary));
        }
        if ownership.is_empty() {
            self.entries.remove(entity);
        }
        Ok(None)
    }

    /// Remove `controller` from `entity` in whatever role it holds.
    pub fn release(&mut self, controller: &str, entity: &str) -> Option<Role> {
        let ownership = self.entries.get_mut(entity)?;
        let role = ownership.role_of(controller)?;
        match role {
            Role::Primary => ownership.primary = None,
            Role::Secondary => {
                ownership.secondaries.remove(controller);
            }
        }
        if ownership.is_empty() {
            self.entries.remove(entity);
        }
        Some(role)
    }

    pub fn get(&self, entity: &str) -> Option<&Ownership> {
        self.entries.get(entity)
    }

    pub fn primary_of(&self, entity: &str) -> Option<&str> {
        self.entries.get(entity).and_then(Ownership::primary)
    }

    /// Entities `controller` holds a role for, ordered by entity name.
    pub fn roles_of(&self, controller: &str) -> Vec<(String, Role)> {
        let mut roles: Vec<(String, Role)> = self
            .entries
            .iter()
            .filter_map(|(entity, ownership)| {
                ownership.role_of(controller).map(|role| (entity.clone(), role))
            })
            .collect();
        roles.sort();
        roles
    }
}
