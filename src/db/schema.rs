use super::core::Database;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            -- Canonical organizational nodes produced by reconciliation
            CREATE TABLE IF NOT EXISTS units (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent_unit_id INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (parent_unit_id) REFERENCES units (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_units_name ON units (name);
            CREATE INDEX IF NOT EXISTS idx_units_parent_unit_id ON units (parent_unit_id);

            -- Colleges from the academic-program catalog
            CREATE TABLE IF NOT EXISTS colleges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                sanitized_name TEXT,
                unit_id INTEGER,
                FOREIGN KEY (unit_id) REFERENCES units (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_colleges_unit_id ON colleges (unit_id);

            -- Departments from the academic-program catalog
            CREATE TABLE IF NOT EXISTS program_departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                sanitized_name TEXT,
                unit_id INTEGER,
                FOREIGN KEY (unit_id) REFERENCES units (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_program_departments_unit_id ON program_departments (unit_id);

            -- A department can relate to several Colleges via its programs
            CREATE TABLE IF NOT EXISTS program_department_colleges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                department_id INTEGER NOT NULL,
                college_id INTEGER NOT NULL,
                UNIQUE (department_id, college_id),
                FOREIGN KEY (department_id) REFERENCES program_departments (id) ON DELETE CASCADE,
                FOREIGN KEY (college_id) REFERENCES colleges (id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_pdc_department_id ON program_department_colleges (department_id);
            CREATE INDEX IF NOT EXISTS idx_pdc_college_id ON program_department_colleges (college_id);

            -- Organizations from the Teledata phone directory
            CREATE TABLE IF NOT EXISTS teledata_organizations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                secondary_comment TEXT,
                url TEXT,
                sanitized_name TEXT,
                unit_id INTEGER,
                FOREIGN KEY (unit_id) REFERENCES units (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_teledata_organizations_unit_id ON teledata_organizations (unit_id);

            -- Departments from the Teledata phone directory
            CREATE TABLE IF NOT EXISTS teledata_departments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                organization_id INTEGER NOT NULL,
                sanitized_name TEXT,
                unit_id INTEGER,
                FOREIGN KEY (organization_id) REFERENCES teledata_organizations (id) ON DELETE CASCADE,
                FOREIGN KEY (unit_id) REFERENCES units (id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_teledata_departments_organization_id ON teledata_departments (organization_id);
            CREATE INDEX IF NOT EXISTS idx_teledata_departments_unit_id ON teledata_departments (unit_id);
            "#,
        )
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
