//! Per-project live development settings

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::database::Database;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Absolute project root, as reported by the editor
    pub project_root: String,
    /// Base URL of the project's own server, if any
    pub base_url: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn root_key(project_root: &Path) -> String {
    project_root.to_string_lossy().into_owned()
}

impl Database {
    pub fn project_settings(&self, project_root: &Path) -> Result<Option<ProjectSettings>> {
        let key = root_key(project_root);
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT project_root, base_url, updated_at FROM project_settings
                     WHERE project_root = ?1",
                    [&key],
                    |row| {
                        let updated_str: String = row.get(2)?;
                        let updated_at = DateTime::parse_from_rfc3339(&updated_str)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now());

                        Ok(ProjectSettings {
                            project_root: row.get(0)?,
                            base_url: row.get(1)?,
                            updated_at,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Base URL configured for the project, `None` when unset or blank
    pub fn project_base_url(&self, project_root: &Path) -> Result<Option<String>> {
        Ok(self
            .project_settings(project_root)?
            .and_then(|settings| settings.base_url)
            .filter(|url| !url.trim().is_empty()))
    }

    /// Store (or clear, with `None`) the base URL for a project
    pub fn set_project_base_url(&self, project_root: &Path, base_url: Option<&str>) -> Result<()> {
        let key = root_key(project_root);
        let base_url = base_url.map(str::trim).filter(|url| !url.is_empty());
        let updated_at = Utc::now().to_rfc3339();

        self.transaction(|conn| {
            conn.execute(
                "DELETE FROM project_settings WHERE project_root = ?1",
                [&key],
            )?;
            conn.execute(
                "INSERT INTO project_settings (project_root, base_url, updated_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![key, base_url, updated_at],
            )?;
            Ok(())
        })?;

        tracing::info!(project_root = %key, base_url = ?base_url, "Updated project base URL");

        Ok(())
    }
}
