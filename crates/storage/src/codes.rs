//! Code resolver — maps human-readable codes (`P001`, `101A`, `EQ001`,
//! `MED001`, `EMP001`) to opaque entity ids.
//!
//! Resolution happens once, at the tool boundary; ids are the only
//! references stored inside the core.

use ward_domain::entity::EntityKind;
use ward_domain::{Error, Result};

use crate::repo::Repositories;

#[derive(Clone)]
pub struct CodeResolver {
    repos: Repositories,
}

impl CodeResolver {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// Resolve a human code of the given kind to an entity id.
    pub async fn resolve(&self, kind: EntityKind, code: &str) -> Result<String> {
        let id = match kind {
            EntityKind::Patient => self
                .repos
                .patients
                .get_by_code(code)
                .await?
                .map(|p| p.id),
            EntityKind::Bed => self
                .repos
                .beds
                .get_by_number(code)
                .await?
                .map(|b| b.id),
            EntityKind::Staff => self.repos.staff.get_by_code(code).await?.map(|s| s.id),
            EntityKind::Equipment => self
                .repos
                .equipment
                .get_by_code(code)
                .await?
                .map(|e| e.id),
            EntityKind::Supply => self
                .repos
                .supplies
                .get_by_code(code)
                .await?
                .map(|s| s.id),
        };
        id.ok_or_else(|| Error::NotFound(format!("no {kind:?} with code {code}")))
    }

    /// Accept either an id or a human code and return the id.
    ///
    /// An exact id match wins; otherwise the value is treated as a code.
    pub async fn resolve_ref(&self, kind: EntityKind, id_or_code: &str) -> Result<String> {
        let exists = match kind {
            EntityKind::Patient => self.repos.patients.get(id_or_code).await?.is_some(),
            EntityKind::Bed => self.repos.beds.get(id_or_code).await?.is_some(),
            EntityKind::Staff => self.repos.staff.get(id_or_code).await?.is_some(),
            EntityKind::Equipment => self.repos.equipment.get(id_or_code).await?.is_some(),
            EntityKind::Supply => self.repos.supplies.get(id_or_code).await?.is_some(),
        };
        if exists {
            return Ok(id_or_code.to_owned());
        }
        self.resolve(kind, id_or_code).await
    }
}
