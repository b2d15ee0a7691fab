//! Strongly-typed migration identifier.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// A non-empty migration identifier (the `id` field of `migration.yml`).
    pub struct MigrationId;
}

#[cfg(test)]
#[path = "migration_id_test.rs"]
mod tests;
