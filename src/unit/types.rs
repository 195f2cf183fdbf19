use prettytable::{Cell, Row, Table};
use serde::Deserialize;
use std::collections::HashSet;

/// A canonical organizational node. Units form a tree via `parent_unit_id`;
/// college/department-ness is carried by the source rows pointing at a unit,
/// not by the unit itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: i64,
    pub name: String,
    pub parent_unit_id: Option<i64>,
}

/// A college from the academic-program catalog.
#[derive(Debug, Clone)]
pub struct College {
    pub id: i64,
    pub name: String,
    pub unit_id: Option<i64>,
}

/// A department from the academic-program catalog.
#[derive(Debug, Clone)]
pub struct ProgramDepartment {
    pub id: i64,
    pub name: String,
    pub unit_id: Option<i64>,
}

/// An organization from the Teledata phone directory.
#[derive(Debug, Clone)]
pub struct TeledataOrganization {
    pub id: i64,
    pub name: String,
    pub secondary_comment: Option<String>,
    pub url: Option<String>,
    pub unit_id: Option<i64>,
}

/// A department from the Teledata phone directory, always owned by an
/// organization.
#[derive(Debug, Clone)]
pub struct TeledataDepartment {
    pub id: i64,
    pub name: String,
    pub organization_id: i64,
    pub unit_id: Option<i64>,
}

/// Statistics accumulated over a single reconciliation run and returned by
/// the pipeline, rather than kept as ambient mutable state.
#[derive(Debug, Clone, Default)]
pub struct RunStatistics {
    pub colleges_processed: i64,
    pub teledata_orgs_processed: i64,
    pub program_depts_processed: i64,
    pub teledata_depts_processed: i64,

    /// Records skipped because no unambiguous unit match existed.
    pub data_skipped: i64,

    /// Ids of units created during this run. Consolidation and cleanup
    /// remove the units they delete, so at the end of a run this holds the
    /// surviving creations.
    pub units_created: HashSet<i64>,
    pub units_consolidated: i64,
    pub units_cleaned: i64,

    pub mapped_colleges: i64,
    pub mapped_teledata_orgs: i64,
    pub mapped_program_depts: i64,
    pub mapped_teledata_depts: i64,
    pub program_depts_with_teledata: i64,
    pub program_depts_with_college: i64,
}

impl RunStatistics {
    /// Print the operator-facing summary report.
    pub fn print_report(&self) {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            Cell::new("Colleges from Programs processed"),
            Cell::new(&self.colleges_processed.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Organizations from Teledata processed"),
            Cell::new(&self.teledata_orgs_processed.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Departments from Programs processed"),
            Cell::new(&self.program_depts_processed.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Departments from Teledata processed"),
            Cell::new(&self.teledata_depts_processed.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Department data skipped"),
            Cell::new(&self.data_skipped.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Units created"),
            Cell::new(&self.units_created.len().to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Units consolidated"),
            Cell::new(&self.units_consolidated.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Units cleaned up"),
            Cell::new(&self.units_cleaned.to_string()),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Colleges mapped to a Unit with teledata"),
            Cell::new(&ratio(self.mapped_colleges, self.colleges_processed)),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Organizations in Teledata with mapped Units"),
            Cell::new(&ratio(self.mapped_teledata_orgs, self.teledata_orgs_processed)),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Program Departments with mapped Units"),
            Cell::new(&ratio(self.mapped_program_depts, self.program_depts_processed)),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Departments in Teledata with mapped Units"),
            Cell::new(&ratio(self.mapped_teledata_depts, self.teledata_depts_processed)),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Program Departments mapped to a Unit with mapped Teledata"),
            Cell::new(&ratio(self.program_depts_with_teledata, self.program_depts_processed)),
        ]));
        table.add_row(Row::new(vec![
            Cell::new("Program Departments mapped to a Unit with a mapped College"),
            Cell::new(&ratio(self.program_depts_with_college, self.program_depts_processed)),
        ]));
        table.printstd();
    }
}

fn ratio(count: i64, total: i64) -> String {
    if total == 0 {
        return format!("{}/{} (0%)", count, total);
    }
    let percent = ((count as f64 / total as f64) * 100.0).round() as i64;
    format!("{}/{} ({}%)", count, total, percent)
}

/// Per-source row counts reported by the `sanitize` and `import` commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceCounts {
    pub colleges: i64,
    pub program_departments: i64,
    pub teledata_organizations: i64,
    pub teledata_departments: i64,
}

/// Seed document loaded by the `import` command.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub colleges: Vec<SeedCollege>,
    #[serde(default)]
    pub program_departments: Vec<SeedProgramDepartment>,
    #[serde(default)]
    pub teledata_organizations: Vec<SeedTeledataOrganization>,
    #[serde(default)]
    pub teledata_departments: Vec<SeedTeledataDepartment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedCollege {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProgramDepartment {
    pub name: String,
    /// Names of the colleges this department relates to via its programs.
    #[serde(default)]
    pub colleges: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTeledataOrganization {
    pub name: String,
    #[serde(default)]
    pub secondary_comment: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTeledataDepartment {
    pub name: String,
    /// Name of the owning Teledata organization.
    pub organization: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_formatting() {
        assert_eq!(ratio(3, 4), "3/4 (75%)");
        assert_eq!(ratio(0, 0), "0/0 (0%)");
        assert_eq!(ratio(1, 3), "1/3 (33%)");
    }

    #[test]
    fn test_seed_data_parsing() {
        let json = r#"{
            "colleges": [{"name": "COLLEGE OF SCIENCES"}],
            "program_departments": [
                {"name": "Physics", "colleges": ["COLLEGE OF SCIENCES"]}
            ],
            "teledata_organizations": [
                {"name": "College of Sciences", "url": "https://sciences.ucf.edu"}
            ],
            "teledata_departments": [
                {"name": "Main Office", "organization": "College of Sciences"}
            ]
        }"#;

        let seed: SeedData = serde_json::from_str(json).unwrap();
        assert_eq!(seed.colleges.len(), 1);
        assert_eq!(seed.program_departments[0].colleges.len(), 1);
        assert_eq!(
            seed.teledata_organizations[0].url.as_deref(),
            Some("https://sciences.ucf.edu")
        );
        assert!(seed.teledata_organizations[0].secondary_comment.is_none());
        assert_eq!(seed.teledata_departments[0].organization, "College of Sciences");
    }
}
