use anyhow::{Context, Result};
use tracing::debug;

use super::sanitizer::NameSanitizer;
use super::types::{RunStatistics, Unit};
use super::TARGET_UNIT;
use crate::db::Database;

/// Outcome of a resolution attempt: the matched or created unit, and the
/// parent the caller should assign to it. The parent can differ from the
/// hint that was passed in, e.g. when the record collapses onto the hint
/// itself.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub unit: Option<Unit>,
    pub parent: Option<Unit>,
}

impl Resolution {
    fn none() -> Self {
        Resolution {
            unit: None,
            parent: None,
        }
    }
}

/// Matches a raw source name onto the unit tree, creating a unit when no
/// match exists.
pub struct UnitResolver<'a> {
    db: &'a Database,
    sanitizer: &'a NameSanitizer,
}

impl<'a> UnitResolver<'a> {
    pub fn new(db: &'a Database, sanitizer: &'a NameSanitizer) -> Self {
        UnitResolver { db, sanitizer }
    }

    pub async fn resolve(
        &self,
        raw_name: &str,
        parent_hint: Option<&Unit>,
        stats: &mut RunStatistics,
    ) -> Result<Resolution> {
        let name = self.sanitizer.sanitize(raw_name);
        if name.is_empty() {
            debug!(
                target: TARGET_UNIT,
                "No usable name in {:?}; skipping", raw_name
            );
            return Ok(Resolution::none());
        }

        match parent_hint {
            Some(hint) => self.resolve_with_hint(&name, hint, stats).await,
            None => self.resolve_without_hint(&name, stats).await,
        }
    }

    async fn resolve_with_hint(
        &self,
        name: &str,
        hint: &Unit,
        stats: &mut RunStatistics,
    ) -> Result<Resolution> {
        // If the record shares its name with the hinted parent, the record
        // *is* the parent; never create a redundant child.
        if name.to_lowercase() == hint.name.to_lowercase() {
            let parent = match hint.parent_unit_id {
                Some(parent_id) => self
                    .db
                    .get_unit(parent_id)
                    .await
                    .context("Failed to load the hint's parent unit")?,
                None => None,
            };
            return Ok(Resolution {
                unit: Some(hint.clone()),
                parent,
            });
        }

        if let Some(unit) = self.db.find_unit_by_name_and_parent(name, hint.id).await? {
            return Ok(Resolution {
                unit: Some(unit),
                parent: Some(hint.clone()),
            });
        }

        // Department/organization relationships are wildly inconsistent
        // across the source systems. Accept a name match whose parent sits
        // anywhere in the hint's ancestor chain.
        let mut candidates = self.db.unit_ancestors(hint).await?;

        // If the name does not look like a school and the hint maps to a
        // college, schools already resolved under that college are candidate
        // parents too. Schools that have not been resolved yet cannot help.
        if self.db.unit_is_college(hint.id).await? && !name.to_lowercase().contains("school of") {
            candidates.extend(self.db.school_children(hint.id).await?);
        }

        if !candidates.is_empty() {
            let candidate_ids: Vec<i64> = candidates.iter().map(|unit| unit.id).collect();
            let mut matches = self.db.find_units_among_parents(name, &candidate_ids).await?;
            if matches.len() > 1 {
                // Several units with this name sit under candidate parents;
                // no deterministic tiebreak exists, so skip rather than
                // guess.
                debug!(
                    target: TARGET_UNIT,
                    "Ambiguous unit match for {:?}; skipping", name
                );
                stats.data_skipped += 1;
                return Ok(Resolution::none());
            }
            if let Some(unit) = matches.pop() {
                return Ok(Resolution {
                    unit: Some(unit),
                    parent: Some(hint.clone()),
                });
            }
        }

        let unit = self.db.add_unit(name, Some(hint.id)).await?;
        debug!(
            target: TARGET_UNIT,
            "Created unit {:?} under {:?}", unit.name, hint.name
        );
        stats.units_created.insert(unit.id);
        Ok(Resolution {
            unit: Some(unit),
            parent: Some(hint.clone()),
        })
    }

    async fn resolve_without_hint(
        &self,
        name: &str,
        stats: &mut RunStatistics,
    ) -> Result<Resolution> {
        // Prefer a unique existing unit already filed under some college
        let mut matches = self.db.find_units_with_college_parent(name).await?;
        if matches.len() == 1 {
            if let Some(unit) = matches.pop() {
                return Ok(Resolution {
                    unit: Some(unit),
                    parent: None,
                });
            }
        }

        // This is probably an organization or a college; get or create a
        // parentless unit.
        if let Some(unit) = self.db.find_orphan_unit(name).await? {
            return Ok(Resolution {
                unit: Some(unit),
                parent: None,
            });
        }

        let unit = self.db.add_unit(name, None).await?;
        debug!(target: TARGET_UNIT, "Created orphan unit {:?}", unit.name);
        stats.units_created.insert(unit.id);
        Ok(Resolution {
            unit: Some(unit),
            parent: None,
        })
    }
}
