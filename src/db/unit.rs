use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashSet;
use tracing::warn;

use super::core::Database;
use crate::unit::types::Unit;
use crate::TARGET_DB;

fn unit_from_row(row: &SqliteRow) -> Unit {
    Unit {
        id: row.get("id"),
        name: row.get("name"),
        parent_unit_id: row.get("parent_unit_id"),
    }
}

impl Database {
    /// Add a new unit to the database
    pub async fn add_unit(
        &self,
        name: &str,
        parent_unit_id: Option<i64>,
    ) -> Result<Unit, sqlx::Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO units (name, parent_unit_id, created_at)
            VALUES (?1, ?2, ?3)
            RETURNING id, name, parent_unit_id
            "#,
        )
        .bind(name)
        .bind(parent_unit_id)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(self.pool())
        .await?;

        Ok(unit_from_row(&row))
    }

    pub async fn get_unit(&self, unit_id: i64) -> Result<Option<Unit>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE id = ?1
            "#,
        )
        .bind(unit_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(unit_from_row))
    }

    /// Exact match on both name and parent; at most one row is expected.
    pub async fn find_unit_by_name_and_parent(
        &self,
        name: &str,
        parent_unit_id: i64,
    ) -> Result<Option<Unit>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE name = ?1 AND parent_unit_id = ?2
            "#,
        )
        .bind(name)
        .bind(parent_unit_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(unit_from_row))
    }

    /// Name matches whose parent falls inside a candidate set. More than one
    /// row is an ambiguous match; the caller decides how to recover.
    pub async fn find_units_among_parents(
        &self,
        name: &str,
        parent_ids: &[i64],
    ) -> Result<Vec<Unit>, sqlx::Error> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = parent_ids
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE name = ? AND parent_unit_id IN ({})
            ORDER BY id
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql).bind(name);
        for parent_id in parent_ids {
            query = query.bind(parent_id);
        }
        let rows = query.fetch_all(self.pool()).await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    /// Match against parentless units only.
    pub async fn find_orphan_unit(&self, name: &str) -> Result<Option<Unit>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE name = ?1 AND parent_unit_id IS NULL
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(unit_from_row))
    }

    /// Name matches whose own parent is linked to a college.
    pub async fn find_units_with_college_parent(
        &self,
        name: &str,
    ) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT u.id, u.name, u.parent_unit_id
            FROM units u
            JOIN colleges c ON c.unit_id = u.parent_unit_id
            WHERE u.name = ?1
            ORDER BY u.id
            "#,
        )
        .bind(name)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    /// Walk parent links from nearest to furthest ancestor. A unit already
    /// seen is never revisited, so a corrupted parent chain truncates the
    /// traversal instead of looping forever.
    pub async fn unit_ancestors(&self, unit: &Unit) -> Result<Vec<Unit>, sqlx::Error> {
        let mut ancestors = Vec::new();
        let mut visited: HashSet<i64> = HashSet::from([unit.id]);
        let mut current = unit.parent_unit_id;

        while let Some(parent_id) = current {
            if !visited.insert(parent_id) {
                warn!(
                    target: TARGET_DB,
                    "Cyclic parent chain detected at unit {}; truncating traversal", parent_id
                );
                break;
            }
            match self.get_unit(parent_id).await? {
                Some(parent) => {
                    current = parent.parent_unit_id;
                    ancestors.push(parent);
                }
                None => break,
            }
        }

        Ok(ancestors)
    }

    /// The college-linked unit at or above the given unit, if any.
    pub async fn related_college_unit(&self, unit: &Unit) -> Result<Option<Unit>, sqlx::Error> {
        if self.unit_is_college(unit.id).await? {
            return Ok(Some(unit.clone()));
        }
        for ancestor in self.unit_ancestors(unit).await? {
            if self.unit_is_college(ancestor.id).await? {
                return Ok(Some(ancestor));
            }
        }
        Ok(None)
    }

    pub async fn unit_is_college(&self, unit_id: i64) -> Result<bool, sqlx::Error> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM colleges WHERE unit_id = ?1)")
                .bind(unit_id)
                .fetch_one(self.pool())
                .await?;
        Ok(exists)
    }

    /// All units currently linked to a college, in college insertion order.
    pub async fn college_units(&self) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.parent_unit_id
            FROM units u
            JOIN colleges c ON c.unit_id = u.id
            ORDER BY c.id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    /// Children of a unit whose names look like schools.
    pub async fn school_children(&self, parent_unit_id: i64) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE parent_unit_id = ?1 AND name LIKE '%school of%'
            ORDER BY id
            "#,
        )
        .bind(parent_unit_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    pub async fn child_units(&self, unit_id: i64) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE parent_unit_id = ?1
            ORDER BY id
            "#,
        )
        .bind(unit_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    pub async fn set_unit_parent(
        &self,
        unit_id: i64,
        parent_unit_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE units SET parent_unit_id = ?2 WHERE id = ?1")
            .bind(unit_id)
            .bind(parent_unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Move all children of one unit under another.
    pub async fn reassign_child_units(
        &self,
        from_unit_id: i64,
        to_unit_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE units SET parent_unit_id = ?2 WHERE parent_unit_id = ?1")
            .bind(from_unit_id)
            .bind(to_unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn delete_unit(&self, unit_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM units WHERE id = ?1")
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Wipe the unit tree. References on the source rows are cleared
    /// explicitly so a rebuild never inherits dangling ids.
    pub async fn delete_all_units(&self) -> Result<u64, sqlx::Error> {
        sqlx::query("UPDATE colleges SET unit_id = NULL")
            .execute(self.pool())
            .await?;
        sqlx::query("UPDATE program_departments SET unit_id = NULL")
            .execute(self.pool())
            .await?;
        sqlx::query("UPDATE teledata_organizations SET unit_id = NULL")
            .execute(self.pool())
            .await?;
        sqlx::query("UPDATE teledata_departments SET unit_id = NULL")
            .execute(self.pool())
            .await?;
        let result = sqlx::query("DELETE FROM units")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn unit_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM units")
            .fetch_one(self.pool())
            .await
    }

    /// Names shared by exactly two units; the only duplicate shape the
    /// consolidation pass knows how to merge.
    pub async fn duplicate_unit_names(&self) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT name
            FROM units
            GROUP BY name
            HAVING COUNT(*) = 2
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool())
        .await
    }

    pub async fn units_named(&self, name: &str) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, parent_unit_id
            FROM units
            WHERE name = ?1
            ORDER BY id
            "#,
        )
        .bind(name)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }

    /// Units with no parent, no children and no external entity referencing
    /// them; candidates for end-of-run garbage collection.
    pub async fn empty_orphan_units(&self) -> Result<Vec<Unit>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.parent_unit_id
            FROM units u
            WHERE u.parent_unit_id IS NULL
              AND NOT EXISTS (SELECT 1 FROM units c WHERE c.parent_unit_id = u.id)
              AND NOT EXISTS (SELECT 1 FROM colleges WHERE unit_id = u.id)
              AND NOT EXISTS (SELECT 1 FROM program_departments WHERE unit_id = u.id)
              AND NOT EXISTS (SELECT 1 FROM teledata_organizations WHERE unit_id = u.id)
              AND NOT EXISTS (SELECT 1 FROM teledata_departments WHERE unit_id = u.id)
            ORDER BY u.id
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(unit_from_row).collect())
    }
}
