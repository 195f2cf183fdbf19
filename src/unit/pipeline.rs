use anyhow::Result;
use tracing::{debug, info};

use super::inference::CollegeUnitInferencer;
use super::resolver::{Resolution, UnitResolver};
use super::rules::SanitizerRules;
use super::sanitizer::NameSanitizer;
use super::types::{RunStatistics, SourceCounts, Unit};
use crate::db::Database;
use crate::TARGET_PIPELINE;

/// Orchestrates a full reconciliation run.
///
/// Phase order matters: teledata and program departments can only map
/// properly once colleges are mapped, because later phases use the earlier
/// units as parent hints. Each run rebuilds the unit tree from scratch —
/// the mapping logic is not consistent against partially-populated state.
pub struct ReconciliationPipeline<'a> {
    db: &'a Database,
    sanitizer: NameSanitizer,
}

impl<'a> ReconciliationPipeline<'a> {
    pub fn new(db: &'a Database, rules: SanitizerRules) -> Self {
        ReconciliationPipeline {
            db,
            sanitizer: NameSanitizer::new(rules),
        }
    }

    pub async fn run(&self) -> Result<RunStatistics> {
        let mut stats = RunStatistics::default();

        let removed = self.db.delete_all_units().await?;
        if removed > 0 {
            info!(
                target: TARGET_PIPELINE,
                "Removed {} existing units before rebuild", removed
            );
        }

        let resolver = UnitResolver::new(self.db, &self.sanitizer);
        let inferencer = CollegeUnitInferencer::new(self.db, &self.sanitizer);

        self.map_colleges(&resolver, &mut stats).await?;
        self.map_teledata_organizations(&resolver, &inferencer, &mut stats)
            .await?;
        self.map_program_departments(&resolver, &mut stats).await?;
        self.map_teledata_departments(&resolver, &mut stats).await?;

        self.consolidate_duplicate_units(&mut stats).await?;
        self.cleanup_empty_units(&mut stats).await?;

        self.collect_mapping_stats(&mut stats).await?;

        info!(
            target: TARGET_PIPELINE,
            "Run complete: {} units created, {} consolidated, {} cleaned up, {} records skipped",
            stats.units_created.len(),
            stats.units_consolidated,
            stats.units_cleaned,
            stats.data_skipped
        );

        Ok(stats)
    }

    /// Map each college onto a unit.
    async fn map_colleges(
        &self,
        resolver: &UnitResolver<'_>,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let colleges = self.db.colleges().await?;
        info!(target: TARGET_PIPELINE, "Mapping {} colleges", colleges.len());

        for college in colleges {
            stats.colleges_processed += 1;
            let resolution = resolver.resolve(&college.name, None, stats).await?;
            self.db
                .set_college_unit(college.id, resolution.unit.as_ref().map(|unit| unit.id))
                .await?;
        }
        Ok(())
    }

    /// Map each teledata organization onto a unit, nesting it under an
    /// inferred college where the organization's metadata allows.
    async fn map_teledata_organizations(
        &self,
        resolver: &UnitResolver<'_>,
        inferencer: &CollegeUnitInferencer<'_>,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let organizations = self.db.teledata_organizations_college_first().await?;
        info!(
            target: TARGET_PIPELINE,
            "Mapping {} teledata organizations", organizations.len()
        );

        for organization in organizations {
            stats.teledata_orgs_processed += 1;

            let hint = inferencer.infer_college_unit(&organization).await?;
            let resolution = resolver
                .resolve(&organization.name, hint.as_ref(), stats)
                .await?;

            self.db
                .set_teledata_organization_unit(
                    organization.id,
                    resolution.unit.as_ref().map(|unit| unit.id),
                )
                .await?;
            self.apply_parent(&resolution).await?;
        }
        Ok(())
    }

    /// Map each program department onto a unit, using the department's
    /// unique related college as the parent hint.
    async fn map_program_departments(
        &self,
        resolver: &UnitResolver<'_>,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let departments = self.db.program_departments().await?;
        info!(
            target: TARGET_PIPELINE,
            "Mapping {} program departments", departments.len()
        );

        for department in departments {
            stats.program_depts_processed += 1;

            let college_ids = self.db.department_college_ids(department.id).await?;
            let hint = if college_ids.len() == 1 {
                self.db.college_unit(college_ids[0]).await?
            } else {
                // Zero or several related colleges: no usable hint
                None
            };

            let resolution = resolver
                .resolve(&department.name, hint.as_ref(), stats)
                .await?;

            self.db
                .set_program_department_unit(
                    department.id,
                    resolution.unit.as_ref().map(|unit| unit.id),
                )
                .await?;
            self.apply_parent(&resolution).await?;
        }
        Ok(())
    }

    /// Map each teledata department onto a unit under its organization's
    /// unit. Departments named "Main"/"Main Office" are redundant noise and
    /// collapse directly into their parent organization.
    async fn map_teledata_departments(
        &self,
        resolver: &UnitResolver<'_>,
        stats: &mut RunStatistics,
    ) -> Result<()> {
        let departments = self.db.teledata_departments().await?;
        info!(
            target: TARGET_PIPELINE,
            "Mapping {} teledata departments", departments.len()
        );

        for department in departments {
            stats.teledata_depts_processed += 1;

            let organization_unit = match self
                .db
                .teledata_organization(department.organization_id)
                .await?
                .and_then(|organization| organization.unit_id)
            {
                Some(unit_id) => self.db.get_unit(unit_id).await?,
                None => None,
            };

            let resolution = if department.name == "Main" || department.name == "Main Office" {
                match &organization_unit {
                    Some(unit) => {
                        let parent = match unit.parent_unit_id {
                            Some(parent_id) => self.db.get_unit(parent_id).await?,
                            None => None,
                        };
                        Resolution {
                            unit: Some(unit.clone()),
                            parent,
                        }
                    }
                    None => Resolution::default(),
                }
            } else {
                resolver
                    .resolve(&department.name, organization_unit.as_ref(), stats)
                    .await?
            };

            self.db
                .set_teledata_department_unit(
                    department.id,
                    resolution.unit.as_ref().map(|unit| unit.id),
                )
                .await?;
            self.apply_parent(&resolution).await?;
        }
        Ok(())
    }

    async fn apply_parent(&self, resolution: &Resolution) -> Result<()> {
        if let Some(unit) = &resolution.unit {
            self.db
                .set_unit_parent(unit.id, resolution.parent.as_ref().map(|parent| parent.id))
                .await?;
        }
        Ok(())
    }

    /// Merge name duplicates where the data shape permits a safe merge:
    /// exactly two units share the name, one has a parent and the other has
    /// neither a parent nor a college link. Anything else is ambiguous and
    /// left alone. Only exactly-two-way duplicates are considered.
    async fn consolidate_duplicate_units(&self, stats: &mut RunStatistics) -> Result<()> {
        let duplicate_names = self.db.duplicate_unit_names().await?;
        info!(
            target: TARGET_PIPELINE,
            "Consolidating {} duplicated unit names", duplicate_names.len()
        );

        for name in duplicate_names {
            let units = self.db.units_named(&name).await?;

            let parented: Vec<&Unit> = units
                .iter()
                .filter(|unit| unit.parent_unit_id.is_some())
                .collect();
            let mut orphans: Vec<&Unit> = Vec::new();
            for unit in units.iter().filter(|unit| unit.parent_unit_id.is_none()) {
                // Higher-level organizations can contain a college; an
                // orphan carrying a college link is not safe to merge away.
                if !self.db.unit_is_college(unit.id).await? {
                    orphans.push(unit);
                }
            }

            if parented.len() != 1 || orphans.len() != 1 {
                debug!(
                    target: TARGET_PIPELINE,
                    "Cannot safely consolidate {:?}; skipping", name
                );
                continue;
            }
            let keeper = parented[0];
            let orphan = orphans[0];

            // The parented unit is the preferred one; hand it everything
            // the orphan holds, then drop the orphan.
            self.db.reassign_child_units(orphan.id, keeper.id).await?;
            self.db
                .reassign_unit_references(orphan.id, keeper.id)
                .await?;
            stats.units_created.remove(&orphan.id);
            self.db.delete_unit(orphan.id).await?;
            stats.units_consolidated += 1;
        }
        Ok(())
    }

    /// Garbage-collect units that ended the run with no parent, no children
    /// and no external entity referencing them.
    async fn cleanup_empty_units(&self, stats: &mut RunStatistics) -> Result<()> {
        for unit in self.db.empty_orphan_units().await? {
            debug!(target: TARGET_PIPELINE, "Removing empty unit {:?}", unit.name);
            self.db.delete_unit(unit.id).await?;
            stats.units_created.remove(&unit.id);
            stats.units_cleaned += 1;
        }
        Ok(())
    }

    async fn collect_mapping_stats(&self, stats: &mut RunStatistics) -> Result<()> {
        stats.mapped_colleges = self.db.mapped_college_count().await?;
        stats.mapped_teledata_orgs = self.db.mapped_teledata_organization_count().await?;
        stats.mapped_program_depts = self.db.mapped_program_department_count().await?;
        stats.mapped_teledata_depts = self.db.mapped_teledata_department_count().await?;
        stats.program_depts_with_teledata = self
            .db
            .program_departments_with_mapped_teledata_count()
            .await?;

        let mut with_college = 0;
        for department in self.db.program_departments().await? {
            let unit = match department.unit_id {
                Some(unit_id) => self.db.get_unit(unit_id).await?,
                None => None,
            };
            if let Some(unit) = unit {
                if self.db.related_college_unit(&unit).await?.is_some() {
                    with_college += 1;
                }
            }
        }
        stats.program_depts_with_college = with_college;

        Ok(())
    }
}

/// Write a sanitized form of every source record's name back onto the
/// record, for operators comparing raw and canonical names across systems.
pub async fn sanitize_source_names(
    db: &Database,
    sanitizer: &NameSanitizer,
) -> Result<SourceCounts> {
    let mut counts = SourceCounts::default();

    for college in db.colleges().await? {
        let sanitized = sanitizer.sanitize(&college.name);
        db.set_college_sanitized_name(college.id, &sanitized).await?;
        counts.colleges += 1;
    }
    for department in db.program_departments().await? {
        let sanitized = sanitizer.sanitize(&department.name);
        db.set_program_department_sanitized_name(department.id, &sanitized)
            .await?;
        counts.program_departments += 1;
    }
    for organization in db.teledata_organizations_college_first().await? {
        let sanitized = sanitizer.sanitize(&organization.name);
        db.set_teledata_organization_sanitized_name(organization.id, &sanitized)
            .await?;
        counts.teledata_organizations += 1;
    }
    for department in db.teledata_departments().await? {
        let sanitized = sanitizer.sanitize(&department.name);
        db.set_teledata_department_sanitized_name(department.id, &sanitized)
            .await?;
        counts.teledata_departments += 1;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::types::{
        SeedCollege, SeedData, SeedProgramDepartment, SeedTeledataDepartment,
        SeedTeledataOrganization,
    };

    fn college(name: &str) -> SeedCollege {
        SeedCollege {
            name: name.to_string(),
        }
    }

    fn program_department(name: &str, colleges: &[&str]) -> SeedProgramDepartment {
        SeedProgramDepartment {
            name: name.to_string(),
            colleges: colleges.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn teledata_organization(name: &str) -> SeedTeledataOrganization {
        SeedTeledataOrganization {
            name: name.to_string(),
            secondary_comment: None,
            url: None,
        }
    }

    fn teledata_department(name: &str, organization: &str) -> SeedTeledataDepartment {
        SeedTeledataDepartment {
            name: name.to_string(),
            organization: organization.to_string(),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_college_and_department() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&SeedData {
            colleges: vec![college("COLLEGE OF ENGINEERING")],
            program_departments: vec![program_department(
                "Civil, Environ, & Constr Engr",
                &["COLLEGE OF ENGINEERING"],
            )],
            teledata_organizations: vec![],
            teledata_departments: vec![],
        })
        .await
        .unwrap();

        let pipeline = ReconciliationPipeline::new(&db, SanitizerRules::default());
        let stats = pipeline.run().await.unwrap();

        let colleges = db.colleges().await.unwrap();
        let college_unit = db
            .get_unit(colleges[0].unit_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(college_unit.name, "College of Engineering");
        assert_eq!(college_unit.parent_unit_id, None);

        let departments = db.program_departments().await.unwrap();
        let department_unit = db
            .get_unit(departments[0].unit_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            department_unit.name,
            "Civil, Environmental, and Construction Engineering"
        );
        assert_eq!(department_unit.parent_unit_id, Some(college_unit.id));

        assert_eq!(stats.colleges_processed, 1);
        assert_eq!(stats.program_depts_processed, 1);
        assert_eq!(stats.units_created.len(), 2);
        assert_eq!(stats.data_skipped, 0);
        assert_eq!(stats.mapped_colleges, 1);
        assert_eq!(stats.mapped_program_depts, 1);
        assert_eq!(stats.program_depts_with_college, 1);

        // Cleanup completeness: nothing empty survives a run
        assert!(db.empty_orphan_units().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_main_office_collapses_into_organization() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&SeedData {
            colleges: vec![],
            program_departments: vec![],
            teledata_organizations: vec![teledata_organization("Parking Services")],
            teledata_departments: vec![
                teledata_department("Main Office", "Parking Services"),
                teledata_department("Citations", "Parking Services"),
            ],
        })
        .await
        .unwrap();

        let pipeline = ReconciliationPipeline::new(&db, SanitizerRules::default());
        let stats = pipeline.run().await.unwrap();

        let organizations = db.teledata_organizations_college_first().await.unwrap();
        let departments = db.teledata_departments().await.unwrap();

        let organization_unit_id = organizations[0].unit_id.unwrap();
        let main_office = departments.iter().find(|d| d.name == "Main Office").unwrap();
        let citations = departments.iter().find(|d| d.name == "Citations").unwrap();

        // "Main Office" reuses the organization's unit rather than becoming
        // its own child unit
        assert_eq!(main_office.unit_id, Some(organization_unit_id));

        let citations_unit = db
            .get_unit(citations.unit_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(citations_unit.parent_unit_id, Some(organization_unit_id));

        assert_eq!(stats.units_created.len(), 2);
        assert!(db.empty_orphan_units().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_consolidation() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&SeedData {
            colleges: vec![],
            program_departments: vec![],
            teledata_organizations: vec![
                teledata_organization("Student Accessibility Services"),
                teledata_organization("Student Development and Enrollment Services"),
            ],
            teledata_departments: vec![teledata_department(
                "Student Accessibility Services",
                "Student Development and Enrollment Services",
            )],
        })
        .await
        .unwrap();

        let pipeline = ReconciliationPipeline::new(&db, SanitizerRules::default());
        let stats = pipeline.run().await.unwrap();

        // The orphan duplicate was merged into the parented one
        let survivors = db
            .units_named("Student Accessibility Services")
            .await
            .unwrap();
        assert_eq!(survivors.len(), 1);
        assert!(survivors[0].parent_unit_id.is_some());
        assert_eq!(stats.units_consolidated, 1);

        // The organization that pointed at the orphan now points at the
        // surviving unit
        let organizations = db.teledata_organizations_college_first().await.unwrap();
        let accessibility = organizations
            .iter()
            .find(|o| o.name == "Student Accessibility Services")
            .unwrap();
        assert_eq!(accessibility.unit_id, Some(survivors[0].id));

        assert_eq!(stats.units_created.len(), 2);
        assert!(db.empty_orphan_units().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_consolidation_requires_exactly_one_safe_orphan() {
        let db = Database::in_memory().await.unwrap();

        let parent_a = db.add_unit("College of Sciences", None).await.unwrap();
        let parent_b = db.add_unit("College of Medicine", None).await.unwrap();
        let a = db.add_unit("Advising", Some(parent_a.id)).await.unwrap();
        let b = db.add_unit("Advising", Some(parent_b.id)).await.unwrap();

        let pipeline = ReconciliationPipeline::new(&db, SanitizerRules::default());
        let mut stats = RunStatistics::default();
        pipeline.consolidate_duplicate_units(&mut stats).await.unwrap();

        // Both duplicates have parents: ambiguous, nothing merged
        assert_eq!(stats.units_consolidated, 0);
        assert!(db.get_unit(a.id).await.unwrap().is_some());
        assert!(db.get_unit(b.id).await.unwrap().is_some());

        // An orphan carrying a college link is not merged away either
        let honors_orphan = db.add_unit("Burnett Honors College", None).await.unwrap();
        let college_id = db.add_college("BURNETT HONORS COLLEGE").await.unwrap();
        db.set_college_unit(college_id, Some(honors_orphan.id))
            .await
            .unwrap();
        db.add_unit("Burnett Honors College", Some(parent_a.id))
            .await
            .unwrap();

        pipeline.consolidate_duplicate_units(&mut stats).await.unwrap();
        assert_eq!(stats.units_consolidated, 0);
        assert!(db.get_unit(honors_orphan.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&SeedData {
            colleges: vec![college("COLLEGE OF SCIENCES")],
            program_departments: vec![
                program_department("Physics Dept", &["COLLEGE OF SCIENCES"]),
                program_department("Chemistry Dept", &["COLLEGE OF SCIENCES"]),
            ],
            teledata_organizations: vec![teledata_organization("College of Sciences")],
            teledata_departments: vec![teledata_department(
                "Physics",
                "College of Sciences",
            )],
        })
        .await
        .unwrap();

        let pipeline = ReconciliationPipeline::new(&db, SanitizerRules::default());

        let first = pipeline.run().await.unwrap();
        let mut first_names: Vec<String> = Vec::new();
        for unit in db.units_named("College of Sciences").await.unwrap() {
            first_names.push(unit.name);
        }
        let first_count = db.unit_count().await.unwrap();

        let second = pipeline.run().await.unwrap();
        let second_count = db.unit_count().await.unwrap();

        assert_eq!(first_count, second_count);
        assert_eq!(first.units_created.len(), second.units_created.len());
        assert_eq!(first.data_skipped, second.data_skipped);
        assert_eq!(
            db.units_named("College of Sciences").await.unwrap().len(),
            first_names.len()
        );
    }

    #[tokio::test]
    async fn test_sanitize_source_names() {
        let db = Database::in_memory().await.unwrap();
        db.replace_sources(&SeedData {
            colleges: vec![college("COLLEGE OF ENGINEERING")],
            program_departments: vec![program_department(
                "Civil, Environ, & Constr Engr",
                &["COLLEGE OF ENGINEERING"],
            )],
            teledata_organizations: vec![teledata_organization("Parking Services")],
            teledata_departments: vec![teledata_department("Main Office", "Parking Services")],
        })
        .await
        .unwrap();

        let sanitizer = NameSanitizer::default();
        let counts = sanitize_source_names(&db, &sanitizer).await.unwrap();

        assert_eq!(counts.colleges, 1);
        assert_eq!(counts.program_departments, 1);
        assert_eq!(counts.teledata_organizations, 1);
        assert_eq!(counts.teledata_departments, 1);

        let colleges = db.colleges().await.unwrap();
        let sanitized: Option<String> =
            sqlx::query_scalar("SELECT sanitized_name FROM colleges WHERE id = ?1")
                .bind(colleges[0].id)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(sanitized.as_deref(), Some("College of Engineering"));
    }
}
