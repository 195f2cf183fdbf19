use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use tracing::warn;

use super::core::Database;
use crate::unit::types::{
    College, ProgramDepartment, SeedData, SourceCounts, TeledataDepartment, TeledataOrganization,
    Unit,
};
use crate::TARGET_DB;

fn college_from_row(row: &SqliteRow) -> College {
    College {
        id: row.get("id"),
        name: row.get("name"),
        unit_id: row.get("unit_id"),
    }
}

fn program_department_from_row(row: &SqliteRow) -> ProgramDepartment {
    ProgramDepartment {
        id: row.get("id"),
        name: row.get("name"),
        unit_id: row.get("unit_id"),
    }
}

fn teledata_organization_from_row(row: &SqliteRow) -> TeledataOrganization {
    TeledataOrganization {
        id: row.get("id"),
        name: row.get("name"),
        secondary_comment: row.get("secondary_comment"),
        url: row.get("url"),
        unit_id: row.get("unit_id"),
    }
}

fn teledata_department_from_row(row: &SqliteRow) -> TeledataDepartment {
    TeledataDepartment {
        id: row.get("id"),
        name: row.get("name"),
        organization_id: row.get("organization_id"),
        unit_id: row.get("unit_id"),
    }
}

impl Database {
    pub async fn add_college(&self, name: &str) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar("INSERT INTO colleges (name) VALUES (?1) RETURNING id")
            .bind(name)
            .fetch_one(self.pool())
            .await?;
        Ok(id)
    }

    pub async fn add_program_department(&self, name: &str) -> Result<i64, sqlx::Error> {
        let id =
            sqlx::query_scalar("INSERT INTO program_departments (name) VALUES (?1) RETURNING id")
                .bind(name)
                .fetch_one(self.pool())
                .await?;
        Ok(id)
    }

    pub async fn link_department_college(
        &self,
        department_id: i64,
        college_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO program_department_colleges (department_id, college_id)
            VALUES (?1, ?2)
            ON CONFLICT (department_id, college_id) DO NOTHING
            "#,
        )
        .bind(department_id)
        .bind(college_id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn add_teledata_organization(
        &self,
        name: &str,
        secondary_comment: Option<&str>,
        url: Option<&str>,
    ) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO teledata_organizations (name, secondary_comment, url)
            VALUES (?1, ?2, ?3)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(secondary_comment)
        .bind(url)
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    pub async fn add_teledata_department(
        &self,
        name: &str,
        organization_id: i64,
    ) -> Result<i64, sqlx::Error> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO teledata_departments (name, organization_id)
            VALUES (?1, ?2)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(organization_id)
        .fetch_one(self.pool())
        .await?;
        Ok(id)
    }

    /// Replace all source rows with the contents of a seed document.
    pub async fn replace_sources(&self, seed: &SeedData) -> Result<SourceCounts, sqlx::Error> {
        self.clear_sources().await?;

        let mut counts = SourceCounts::default();

        let mut college_ids: HashMap<String, i64> = HashMap::new();
        for college in &seed.colleges {
            let id = self.add_college(&college.name).await?;
            college_ids.insert(college.name.clone(), id);
            counts.colleges += 1;
        }

        for dept in &seed.program_departments {
            let department_id = self.add_program_department(&dept.name).await?;
            counts.program_departments += 1;
            for college_name in &dept.colleges {
                match college_ids.get(college_name) {
                    Some(college_id) => {
                        self.link_department_college(department_id, *college_id)
                            .await?;
                    }
                    None => warn!(
                        target: TARGET_DB,
                        "Department {:?} references unknown college {:?}", dept.name, college_name
                    ),
                }
            }
        }

        let mut organization_ids: HashMap<String, i64> = HashMap::new();
        for org in &seed.teledata_organizations {
            let id = self
                .add_teledata_organization(
                    &org.name,
                    org.secondary_comment.as_deref(),
                    org.url.as_deref(),
                )
                .await?;
            organization_ids.insert(org.name.clone(), id);
            counts.teledata_organizations += 1;
        }

        for dept in &seed.teledata_departments {
            match organization_ids.get(&dept.organization) {
                Some(organization_id) => {
                    self.add_teledata_department(&dept.name, *organization_id)
                        .await?;
                    counts.teledata_departments += 1;
                }
                None => warn!(
                    target: TARGET_DB,
                    "Teledata department {:?} references unknown organization {:?}; skipping",
                    dept.name,
                    dept.organization
                ),
            }
        }

        Ok(counts)
    }

    pub(crate) async fn clear_sources(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            DELETE FROM program_department_colleges;
            DELETE FROM teledata_departments;
            DELETE FROM teledata_organizations;
            DELETE FROM program_departments;
            DELETE FROM colleges;
            "#,
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn colleges(&self) -> Result<Vec<College>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, unit_id FROM colleges ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(college_from_row).collect())
    }

    pub async fn program_departments(&self) -> Result<Vec<ProgramDepartment>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, unit_id FROM program_departments ORDER BY id")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(program_department_from_row).collect())
    }

    /// Teledata organizations, ordered so that names containing "college"
    /// come first. College-like organizations must resolve before dependent
    /// sub-units try to use them as a parent hint.
    pub async fn teledata_organizations_college_first(
        &self,
    ) -> Result<Vec<TeledataOrganization>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, secondary_comment, url, unit_id
            FROM teledata_organizations
            ORDER BY INSTR(LOWER(name), 'college') DESC, id
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(teledata_organization_from_row).collect())
    }

    pub async fn teledata_organization(
        &self,
        organization_id: i64,
    ) -> Result<Option<TeledataOrganization>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, name, secondary_comment, url, unit_id
            FROM teledata_organizations
            WHERE id = ?1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.as_ref().map(teledata_organization_from_row))
    }

    /// Teledata organizations already linked to the given unit.
    pub async fn teledata_organizations_for_unit(
        &self,
        unit_id: i64,
    ) -> Result<Vec<TeledataOrganization>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, secondary_comment, url, unit_id
            FROM teledata_organizations
            WHERE unit_id = ?1
            ORDER BY id
            "#,
        )
        .bind(unit_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(teledata_organization_from_row).collect())
    }

    pub async fn teledata_departments(&self) -> Result<Vec<TeledataDepartment>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, organization_id, unit_id
            FROM teledata_departments
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows.iter().map(teledata_department_from_row).collect())
    }

    /// Ids of the colleges a program department relates to via its programs.
    pub async fn department_college_ids(
        &self,
        department_id: i64,
    ) -> Result<Vec<i64>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT college_id
            FROM program_department_colleges
            WHERE department_id = ?1
            ORDER BY college_id
            "#,
        )
        .bind(department_id)
        .fetch_all(self.pool())
        .await
    }

    /// The unit a college resolved to, if any.
    pub async fn college_unit(&self, college_id: i64) -> Result<Option<Unit>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.name, u.parent_unit_id
            FROM units u
            JOIN colleges c ON c.unit_id = u.id
            WHERE c.id = ?1
            "#,
        )
        .bind(college_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|row| Unit {
            id: row.get("id"),
            name: row.get("name"),
            parent_unit_id: row.get("parent_unit_id"),
        }))
    }

    pub async fn set_college_unit(
        &self,
        college_id: i64,
        unit_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE colleges SET unit_id = ?2 WHERE id = ?1")
            .bind(college_id)
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_program_department_unit(
        &self,
        department_id: i64,
        unit_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE program_departments SET unit_id = ?2 WHERE id = ?1")
            .bind(department_id)
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_teledata_organization_unit(
        &self,
        organization_id: i64,
        unit_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE teledata_organizations SET unit_id = ?2 WHERE id = ?1")
            .bind(organization_id)
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_teledata_department_unit(
        &self,
        department_id: i64,
        unit_id: Option<i64>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE teledata_departments SET unit_id = ?2 WHERE id = ?1")
            .bind(department_id)
            .bind(unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_college_sanitized_name(
        &self,
        college_id: i64,
        sanitized_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE colleges SET sanitized_name = ?2 WHERE id = ?1")
            .bind(college_id)
            .bind(sanitized_name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_program_department_sanitized_name(
        &self,
        department_id: i64,
        sanitized_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE program_departments SET sanitized_name = ?2 WHERE id = ?1")
            .bind(department_id)
            .bind(sanitized_name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_teledata_organization_sanitized_name(
        &self,
        organization_id: i64,
        sanitized_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE teledata_organizations SET sanitized_name = ?2 WHERE id = ?1")
            .bind(organization_id)
            .bind(sanitized_name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn set_teledata_department_sanitized_name(
        &self,
        department_id: i64,
        sanitized_name: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE teledata_departments SET sanitized_name = ?2 WHERE id = ?1")
            .bind(department_id)
            .bind(sanitized_name)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Repoint external references from one unit to another during duplicate
    /// consolidation. Colleges are deliberately left out: the orphan side of
    /// a consolidatable pair never carries a college link.
    pub async fn reassign_unit_references(
        &self,
        from_unit_id: i64,
        to_unit_id: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE teledata_organizations SET unit_id = ?2 WHERE unit_id = ?1")
            .bind(from_unit_id)
            .bind(to_unit_id)
            .execute(self.pool())
            .await?;
        sqlx::query("UPDATE teledata_departments SET unit_id = ?2 WHERE unit_id = ?1")
            .bind(from_unit_id)
            .bind(to_unit_id)
            .execute(self.pool())
            .await?;
        sqlx::query("UPDATE program_departments SET unit_id = ?2 WHERE unit_id = ?1")
            .bind(from_unit_id)
            .bind(to_unit_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn mapped_college_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM colleges WHERE unit_id IS NOT NULL")
            .fetch_one(self.pool())
            .await
    }

    pub async fn mapped_program_department_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM program_departments WHERE unit_id IS NOT NULL")
            .fetch_one(self.pool())
            .await
    }

    pub async fn mapped_teledata_organization_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM teledata_organizations WHERE unit_id IS NOT NULL")
            .fetch_one(self.pool())
            .await
    }

    pub async fn mapped_teledata_department_count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM teledata_departments WHERE unit_id IS NOT NULL")
            .fetch_one(self.pool())
            .await
    }

    /// Program departments whose unit also carries mapped teledata.
    pub async fn program_departments_with_mapped_teledata_count(
        &self,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT pd.id)
            FROM program_departments pd
            JOIN units u ON pd.unit_id = u.id
            WHERE EXISTS (SELECT 1 FROM teledata_departments td WHERE td.unit_id = u.id)
               OR EXISTS (SELECT 1 FROM teledata_organizations torg WHERE torg.unit_id = u.id)
            "#,
        )
        .fetch_one(self.pool())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::types::{
        SeedCollege, SeedProgramDepartment, SeedTeledataDepartment, SeedTeledataOrganization,
    };

    fn seed() -> SeedData {
        SeedData {
            colleges: vec![SeedCollege {
                name: "COLLEGE OF SCIENCES".to_string(),
            }],
            program_departments: vec![SeedProgramDepartment {
                name: "Physics".to_string(),
                colleges: vec!["COLLEGE OF SCIENCES".to_string()],
            }],
            teledata_organizations: vec![
                SeedTeledataOrganization {
                    name: "Parking Services".to_string(),
                    secondary_comment: None,
                    url: None,
                },
                SeedTeledataOrganization {
                    name: "College of Sciences".to_string(),
                    secondary_comment: None,
                    url: Some("https://sciences.ucf.edu".to_string()),
                },
            ],
            teledata_departments: vec![SeedTeledataDepartment {
                name: "Main Office".to_string(),
                organization: "College of Sciences".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_replace_sources() {
        let db = Database::in_memory().await.unwrap();

        let counts = db.replace_sources(&seed()).await.unwrap();
        assert_eq!(counts.colleges, 1);
        assert_eq!(counts.program_departments, 1);
        assert_eq!(counts.teledata_organizations, 2);
        assert_eq!(counts.teledata_departments, 1);

        let depts = db.program_departments().await.unwrap();
        let college_ids = db.department_college_ids(depts[0].id).await.unwrap();
        assert_eq!(college_ids.len(), 1);

        // A second import replaces, not appends
        let counts = db.replace_sources(&seed()).await.unwrap();
        assert_eq!(counts.teledata_organizations, 2);
        assert_eq!(db.teledata_departments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_references_skipped() {
        let db = Database::in_memory().await.unwrap();

        let mut data = seed();
        data.teledata_departments.push(SeedTeledataDepartment {
            name: "Orphan Desk".to_string(),
            organization: "No Such Org".to_string(),
        });
        data.program_departments[0]
            .colleges
            .push("No Such College".to_string());

        let counts = db.replace_sources(&data).await.unwrap();
        assert_eq!(counts.teledata_departments, 1);
        let depts = db.program_departments().await.unwrap();
        assert_eq!(db.department_college_ids(depts[0].id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_college_first_ordering() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&seed()).await.unwrap();

        let orgs = db.teledata_organizations_college_first().await.unwrap();
        assert_eq!(orgs[0].name, "College of Sciences");
        assert_eq!(orgs[1].name, "Parking Services");
    }
}
