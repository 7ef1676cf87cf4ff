//! Test catalog database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{ReferenceRange, TestDefinition, TestPanel};

const TEST_COLUMNS: &str = "code, name, category, subcategory, unit, price, active, display_order, \
     male_min, male_max, male_range_text, female_min, female_max, female_range_text";

impl Database {
    // =========================================================================
    // Test definitions
    // =========================================================================

    /// Insert or update a test definition.
    pub fn upsert_test_definition(&self, test: &TestDefinition) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO test_definitions (
                code, name, category, subcategory, unit, price, active, display_order,
                male_min, male_max, male_range_text,
                female_min, female_max, female_range_text, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, datetime('now'))
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                subcategory = excluded.subcategory,
                unit = excluded.unit,
                price = excluded.price,
                active = excluded.active,
                display_order = excluded.display_order,
                male_min = excluded.male_min,
                male_max = excluded.male_max,
                male_range_text = excluded.male_range_text,
                female_min = excluded.female_min,
                female_max = excluded.female_max,
                female_range_text = excluded.female_range_text,
                updated_at = datetime('now')
            "#,
            params![
                test.code,
                test.name,
                test.category,
                test.subcategory,
                test.unit,
                test.price,
                test.active,
                test.display_order,
                test.male_range.min,
                test.male_range.max,
                test.male_range.text,
                test.female_range.min,
                test.female_range.max,
                test.female_range.text,
            ],
        )?;
        Ok(())
    }

    /// Get a test definition by code.
    pub fn get_test_definition(&self, code: &str) -> DbResult<Option<TestDefinition>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM test_definitions WHERE code = ?", TEST_COLUMNS),
                [code],
                test_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List test definitions in display order.
    pub fn list_test_definitions(&self, active_only: bool) -> DbResult<Vec<TestDefinition>> {
        let sql = format!(
            "SELECT {} FROM test_definitions {} ORDER BY display_order, name",
            TEST_COLUMNS,
            if active_only { "WHERE active = 1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], test_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Search active test definitions by name or code.
    pub fn search_tests(&self, query: &str, limit: usize) -> DbResult<Vec<TestDefinition>> {
        let pattern = format!("%{}%", query.trim());
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {}
            FROM test_definitions
            WHERE active = 1 AND (name LIKE ?1 OR code LIKE ?1)
            ORDER BY display_order, name
            LIMIT ?2
            "#,
            TEST_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], test_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Deactivate a test definition (soft delete).
    pub fn deactivate_test_definition(&self, code: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE test_definitions SET active = 0, updated_at = datetime('now') WHERE code = ?",
            [code],
        )?;
        Ok(rows_affected > 0)
    }

    // =========================================================================
    // Panels
    // =========================================================================

    /// Insert or update a panel together with its member list.
    pub fn upsert_panel(&self, panel: &TestPanel) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO test_panels (code, name, category, price, active, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price = excluded.price,
                active = excluded.active,
                updated_at = datetime('now')
            "#,
            params![
                panel.code,
                panel.name,
                panel.category,
                panel.price,
                panel.active
            ],
        )?;
        self.set_panel_tests(&panel.code, &panel.test_codes)
    }

    /// Replace the ordered member tests of a panel.
    pub fn set_panel_tests(&self, panel_code: &str, test_codes: &[String]) -> DbResult<()> {
        for code in test_codes {
            if self.get_test_definition(code)?.is_none() {
                return Err(DbError::NotFound(format!("test definition {}", code)));
            }
        }

        self.conn
            .execute("DELETE FROM panel_members WHERE panel_code = ?", [panel_code])?;
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO panel_members (panel_code, test_code, position) VALUES (?1, ?2, ?3)",
        )?;
        for (position, code) in test_codes.iter().enumerate() {
            stmt.execute(params![panel_code, code, position as i64])?;
        }
        Ok(())
    }

    /// Get a panel by code.
    pub fn get_panel(&self, code: &str) -> DbResult<Option<TestPanel>> {
        let panel = self
            .conn
            .query_row(
                "SELECT code, name, category, price, active FROM test_panels WHERE code = ?",
                [code],
                panel_row,
            )
            .optional()?;

        match panel {
            Some(mut panel) => {
                panel.test_codes = self.panel_test_codes(&panel.code)?;
                Ok(Some(panel))
            }
            None => Ok(None),
        }
    }

    /// List panels by name.
    pub fn list_panels(&self, active_only: bool) -> DbResult<Vec<TestPanel>> {
        let sql = format!(
            "SELECT code, name, category, price, active FROM test_panels {} ORDER BY name",
            if active_only { "WHERE active = 1" } else { "" }
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], panel_row)?;

        let mut panels = Vec::new();
        for row in rows {
            let mut panel = row?;
            panel.test_codes = self.panel_test_codes(&panel.code)?;
            panels.push(panel);
        }
        Ok(panels)
    }

    /// Member test definitions of a panel, in display order.
    pub fn panel_tests(&self, panel_code: &str) -> DbResult<Vec<TestDefinition>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.code, t.name, t.category, t.subcategory, t.unit, t.price, t.active,
                   t.display_order, t.male_min, t.male_max, t.male_range_text,
                   t.female_min, t.female_max, t.female_range_text
            FROM panel_members pm
            JOIN test_definitions t ON t.code = pm.test_code
            WHERE pm.panel_code = ?
            ORDER BY t.display_order, pm.position, t.name
            "#,
        )?;
        let rows = stmt.query_map([panel_code], test_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Deactivate a panel (soft delete).
    pub fn deactivate_panel(&self, code: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE test_panels SET active = 0, updated_at = datetime('now') WHERE code = ?",
            [code],
        )?;
        Ok(rows_affected > 0)
    }

    fn panel_test_codes(&self, panel_code: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT test_code FROM panel_members WHERE panel_code = ? ORDER BY position",
        )?;
        let rows = stmt.query_map([panel_code], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn test_row(row: &Row<'_>) -> rusqlite::Result<TestDefinition> {
    Ok(TestDefinition {
        code: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        subcategory: row.get(3)?,
        unit: row.get(4)?,
        price: row.get(5)?,
        active: row.get(6)?,
        display_order: row.get(7)?,
        male_range: ReferenceRange {
            min: row.get(8)?,
            max: row.get(9)?,
            text: row.get(10)?,
        },
        female_range: ReferenceRange {
            min: row.get(11)?,
            max: row.get(12)?,
            text: row.get(13)?,
        },
    })
}

fn panel_row(row: &Row<'_>) -> rusqlite::Result<TestPanel> {
    Ok(TestPanel {
        code: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        price: row.get(3)?,
        active: row.get(4)?,
        test_codes: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn make_test(code: &str, name: &str, order: u32) -> TestDefinition {
        let mut test = TestDefinition::new(code.into(), name.into(), "chemistry".into(), "mg/dL".into());
        test.display_order = order;
        test
    }

    #[test]
    fn test_upsert_and_get() {
        let db = setup_db();

        let mut test = make_test("GLU", "Glucose", 1);
        test.male_range = ReferenceRange::numeric(70.0, 110.0);
        test.female_range = ReferenceRange::descriptor("65-99");
        test.price = 4.5;
        db.upsert_test_definition(&test).unwrap();

        let retrieved = db.get_test_definition("GLU").unwrap().unwrap();
        assert_eq!(retrieved, test);
    }

    #[test]
    fn test_upsert_updates_existing() {
        let db = setup_db();

        let mut test = make_test("GLU", "Glucose", 1);
        db.upsert_test_definition(&test).unwrap();

        test.name = "Fasting glucose".into();
        test.male_range = ReferenceRange::numeric(0.0, 100.0);
        db.upsert_test_definition(&test).unwrap();

        let retrieved = db.get_test_definition("GLU").unwrap().unwrap();
        assert_eq!(retrieved.name, "Fasting glucose");
        // Zero bounds survive the round trip as present values
        assert_eq!(retrieved.male_range.min, Some(0.0));
        assert_eq!(db.list_test_definitions(false).unwrap().len(), 1);
    }

    #[test]
    fn test_list_in_display_order() {
        let db = setup_db();
        db.upsert_test_definition(&make_test("UREA", "Urea", 2)).unwrap();
        db.upsert_test_definition(&make_test("GLU", "Glucose", 1)).unwrap();
        db.upsert_test_definition(&make_test("CREA", "Creatinine", 2)).unwrap();

        let codes: Vec<String> = db
            .list_test_definitions(false)
            .unwrap()
            .into_iter()
            .map(|t| t.code)
            .collect();
        assert_eq!(codes, vec!["GLU", "CREA", "UREA"]);
    }

    #[test]
    fn test_deactivate_hides_from_search() {
        let db = setup_db();
        db.upsert_test_definition(&make_test("GLU", "Glucose", 1)).unwrap();

        assert_eq!(db.search_tests("gluc", 10).unwrap().len(), 1);
        db.deactivate_test_definition("GLU").unwrap();
        assert_eq!(db.search_tests("gluc", 10).unwrap().len(), 0);

        // Should still be retrievable directly
        let test = db.get_test_definition("GLU").unwrap().unwrap();
        assert!(!test.active);
        assert_eq!(db.list_test_definitions(true).unwrap().len(), 0);
    }

    #[test]
    fn test_panel_members_ordered() {
        let db = setup_db();
        db.upsert_test_definition(&make_test("UREA", "Urea", 3)).unwrap();
        db.upsert_test_definition(&make_test("CREA", "Creatinine", 1)).unwrap();
        db.upsert_test_definition(&make_test("K", "Potassium", 2)).unwrap();

        let mut panel = TestPanel::new("RFT".into(), "Renal function".into());
        panel.test_codes = vec!["UREA".into(), "CREA".into(), "K".into()];
        panel.price = 12.0;
        db.upsert_panel(&panel).unwrap();

        let retrieved = db.get_panel("RFT").unwrap().unwrap();
        assert_eq!(retrieved.test_codes, vec!["UREA", "CREA", "K"]);
        assert_eq!(retrieved.price, 12.0);

        let members: Vec<String> = db
            .panel_tests("RFT")
            .unwrap()
            .into_iter()
            .map(|t| t.code)
            .collect();
        assert_eq!(members, vec!["CREA", "K", "UREA"]);
    }

    #[test]
    fn test_panel_with_unknown_test_rejected() {
        let db = setup_db();
        let mut panel = TestPanel::new("RFT".into(), "Renal function".into());
        panel.test_codes = vec!["NOPE".into()];

        let result = db.upsert_panel(&panel);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_deactivate_panel() {
        let db = setup_db();
        db.upsert_panel(&TestPanel::new("CBC".into(), "Blood count".into()))
            .unwrap();

        db.deactivate_panel("CBC").unwrap();
        assert!(db.list_panels(true).unwrap().is_empty());
        assert_eq!(db.list_panels(false).unwrap().len(), 1);
    }
}
