//! Migration definitions and on-disk discovery
//!
//! Each migration lives in its own directory under the project's
//! `migrations_path`:
//!
//! ```text
//! migrations/
//!   001_initial/
//!     migration.yml
//!     up.sql
//!     down.sql      (optional)
//! ```

use crate::checksum::forward_checksum;
use crate::error::{CoreError, CoreResult};
use crate::migration_id::MigrationId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

/// Metadata file name inside a migration directory
pub const META_FILE: &str = "migration.yml";

/// Forward operation file name
pub const UP_FILE: &str = "up.sql";

/// Reverse operation file name
pub const DOWN_FILE: &str = "down.sql";

/// Contents of `migration.yml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MigrationMeta {
    /// Unique migration identifier
    pub id: MigrationId,

    /// Predecessor identifier; `None` only for the root migration
    #[serde(default)]
    pub revises: Option<MigrationId>,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creation date (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
}

/// A single immutable unit of schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Unique identifier
    pub id: MigrationId,

    /// Predecessor identifier; `None` only for the root
    pub revises: Option<MigrationId>,

    /// Human-readable description
    pub description: Option<String>,

    /// Creation date
    pub created: Option<NaiveDate>,

    /// Forward operation
    pub up_sql: String,

    /// Reverse operation, when the migration can be undone
    pub down_sql: Option<String>,

    /// Directory the definition was loaded from (empty for in-memory definitions)
    pub path: PathBuf,
}

impl Migration {
    /// Build an in-memory migration definition
    pub fn new(
        id: MigrationId,
        revises: Option<MigrationId>,
        up_sql: impl Into<String>,
        down_sql: Option<String>,
    ) -> CoreResult<Self> {
        let migration = Self {
            id,
            revises,
            description: None,
            created: None,
            up_sql: up_sql.into(),
            down_sql: down_sql.filter(|s| !is_blank_sql(s)),
            path: PathBuf::new(),
        };
        migration.validate()?;
        Ok(migration)
    }

    /// Check the invariants every definition must hold, however it was built.
    ///
    /// The executor wraps each step in its own transaction, so neither script
    /// may open, commit or abort one itself.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidMigration {
            path: self.origin(),
            reason,
        };

        if self.revises.as_ref() == Some(&self.id) {
            return Err(invalid(format!("migration '{}' revises itself", self.id)));
        }
        let scripts = [
            (UP_FILE, Some(self.up_sql.as_str())),
            (DOWN_FILE, self.down_sql.as_deref()),
        ];
        for (file, sql) in scripts {
            if let Some(statement) = sql.and_then(find_transaction_control) {
                return Err(invalid(format!(
                    "{file} must not control transactions (found '{statement}')"
                )));
            }
        }
        Ok(())
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checksum of the forward operation as it is defined now
    pub fn checksum(&self) -> String {
        forward_checksum(&self.up_sql)
    }

    /// Whether the migration carries a reverse operation
    pub fn is_reversible(&self) -> bool {
        self.down_sql.is_some()
    }

    /// Location for error messages: the directory if known, else the id
    pub fn origin(&self) -> String {
        if self.path.as_os_str().is_empty() {
            format!("<{}>", self.id)
        } else {
            self.path.display().to_string()
        }
    }

    /// Load one migration from its directory
    pub fn load(dir: &Path) -> CoreResult<Self> {
        let invalid = |reason: String| CoreError::InvalidMigration {
            path: dir.display().to_string(),
            reason,
        };

        let mut unexpected = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })? {
            let entry = entry.map_err(|e| CoreError::IoWithPath {
                path: dir.display().to_string(),
                source: e,
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name != META_FILE && name != UP_FILE && name != DOWN_FILE {
                unexpected.push(name);
            }
        }
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(invalid(format!(
                "unexpected files: {} (expected {META_FILE}, {UP_FILE} and optionally {DOWN_FILE})",
                unexpected.join(", ")
            )));
        }

        let meta_path = dir.join(META_FILE);
        if !meta_path.is_file() {
            return Err(invalid(format!("missing {META_FILE}")));
        }
        let up_path = dir.join(UP_FILE);
        if !up_path.is_file() {
            return Err(invalid(format!("missing {UP_FILE}")));
        }

        let meta_content = read_file(&meta_path)?;
        let meta: MigrationMeta = serde_yaml::from_str(&meta_content)
            .map_err(|e| invalid(format!("{META_FILE}: {e}")))?;

        let up_sql = read_file(&up_path)?;
        if up_sql.trim().is_empty() {
            return Err(invalid(format!("{UP_FILE} is empty")));
        }

        let down_path = dir.join(DOWN_FILE);
        let down_sql = if down_path.is_file() {
            Some(read_file(&down_path)?).filter(|s| !is_blank_sql(s))
        } else {
            None
        };

        let migration = Self {
            id: meta.id,
            revises: meta.revises,
            description: meta.description,
            created: meta.created,
            up_sql,
            down_sql,
            path: dir.to_path_buf(),
        };
        migration.validate()?;
        Ok(migration)
    }
}

/// True when a script holds nothing but whitespace and `--` line comments.
pub fn is_blank_sql(sql: &str) -> bool {
    sql.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// First statement of `sql` that begins, commits or aborts a transaction.
///
/// Statements are split on `;` outside quotes, dollar-quoted strings and comments;
/// the keyword is matched case-insensitively.
pub fn find_transaction_control(sql: &str) -> Option<String> {
    split_statements(sql)
        .into_iter()
        .find(|statement| is_transaction_control(statement))
}

fn is_transaction_control(statement: &str) -> bool {
    let mut words = statement
        .split_whitespace()
        .map(|w| w.to_ascii_uppercase());
    match words.next().as_deref() {
        Some("BEGIN" | "COMMIT" | "ROLLBACK" | "END" | "ABORT") => true,
        Some("START") => words.next().as_deref() == Some("TRANSACTION"),
        _ => false,
    }
}

/// Statements of a script with comments removed, trimmed, empty ones dropped
fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                current.push(c);
                for next in chars.by_ref() {
                    current.push(next);
                    if next == c {
                        break;
                    }
                }
            }
            '$' => match dollar_quote_tag(&mut chars) {
                Some(tag) => {
                    let delimiter = format!("${tag}$");
                    current.push_str(&delimiter);
                    let start = current.len();
                    for next in chars.by_ref() {
                        current.push(next);
                        if current.len() >= start + delimiter.len() && current.ends_with(&delimiter) {
                            break;
                        }
                    }
                }
                None => current.push(c),
            },
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
                current.push(' ');
            }
            ';' => statements.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    statements.push(current);

    statements
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Tag of a `$tag$` (or `$$`) opening delimiter whose first `$` was just
/// consumed. Advances past the closing `$` only when one is found.
fn dollar_quote_tag(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut ahead = chars.clone();
    let mut tag = String::new();
    while let Some(&c) = ahead.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            tag.push(c);
            ahead.next();
        } else {
            break;
        }
    }
    // `$1` is a positional parameter, not a quote
    if tag.starts_with(|c: char| c.is_ascii_digit()) || ahead.next() != Some('$') {
        return None;
    }
    *chars = ahead;
    Some(tag)
}

fn read_file(path: &Path) -> CoreResult<String> {
    std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })
}

/// Discover every migration directory directly under `dir`.
///
/// Plain files at the top level are skipped. The result is sorted by
/// directory path so discovery is stable, but the execution order comes
/// from the graph, never from this list.
pub fn discover_migrations(dir: &Path) -> CoreResult<Vec<Migration>> {
    if !dir.is_dir() {
        return Err(CoreError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })? {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        } else {
            log::debug!("Skipping non-directory entry {}", path.display());
        }
    }
    dirs.sort();

    dirs.iter().map(|d| Migration::load(d)).collect()
}

/// Slugify a free-text description into a directory-name fragment
fn slugify(description: &str) -> String {
    let mut slug = String::new();
    for c in description.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// Create a new migration directory revising `revises`.
///
/// The directory is named `<id>_<slug>`; `up.sql` and `down.sql` are written
/// with placeholder comments. Returns the created directory.
pub fn scaffold_migration(
    migrations_dir: &Path,
    id: &MigrationId,
    description: &str,
    revises: Option<&MigrationId>,
    created: NaiveDate,
) -> CoreResult<PathBuf> {
    let slug = slugify(description);
    let dir_name = if slug.is_empty() {
        id.to_string()
    } else {
        format!("{id}_{slug}")
    };
    let dir = migrations_dir.join(dir_name);
    if dir.exists() {
        return Err(CoreError::InvalidMigration {
            path: dir.display().to_string(),
            reason: "directory already exists".to_string(),
        });
    }

    std::fs::create_dir_all(&dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })?;

    let meta = MigrationMeta {
        id: id.clone(),
        revises: revises.cloned(),
        description: Some(description.trim().to_string()).filter(|d| !d.is_empty()),
        created: Some(created),
    };
    let meta_yaml = serde_yaml::to_string(&meta).map_err(|e| CoreError::InvalidMigration {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let files = [
        (META_FILE, meta_yaml),
        (
            UP_FILE,
            format!("-- {id}: {}\n-- Forward schema change\n", description.trim()),
        ),
        (
            DOWN_FILE,
            format!(
                "-- {id}: {}\n-- Reverse schema change (leave empty if irreversible)\n",
                description.trim()
            ),
        ),
    ];
    for (name, content) in files {
        let path = dir.join(name);
        std::fs::write(&path, content).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
    }

    Ok(dir)
}

#[cfg(test)]
#[path = "migration_test.rs"]
mod tests;
