//! Error types for shale-core

use thiserror::Error;

/// Structural problems in a migration set, detected while building the graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphIntegrityError {
    /// G001: Two migration definitions share an identifier
    #[error("[G001] Duplicate migration id '{id}' in {path1} and {path2}")]
    DuplicateId {
        id: String,
        path1: String,
        path2: String,
    },

    /// G002: A migration revises an identifier that does not exist
    #[error("[G002] Migration '{id}' revises unknown migration '{predecessor}'")]
    DanglingPredecessor { id: String, predecessor: String },

    /// G003: Predecessor references form a cycle
    #[error("[G003] Migration cycle detected: {cycle}")]
    Cycle { cycle: String },

    /// G004: More than one migration has no predecessor
    #[error("[G004] Multiple root migrations (revises: null): {roots}")]
    MultipleRoots { roots: String },

    /// G005: Non-empty migration set without a root
    #[error("[G005] No root migration found: every migration revises another")]
    NoRoot,

    /// G006: Two migrations revise the same predecessor
    #[error("[G006] Migration '{predecessor}' is revised by more than one migration: {successors}")]
    Branch {
        predecessor: String,
        successors: String,
    },
}

/// Core error type for Shale
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config {path}: {message}")]
    ConfigParseError { path: String, message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Project or migrations directory not found
    #[error("[E004] Directory not found: {path}")]
    DirectoryNotFound { path: String },

    /// M001: A migration directory is malformed
    #[error("[M001] Invalid migration at '{path}': {reason}")]
    InvalidMigration { path: String, reason: String },

    /// G00x: Migration graph failed validation
    #[error(transparent)]
    GraphIntegrity(#[from] GraphIntegrityError),

    /// P001: Requested target is not part of the graph
    #[error("[P001] Unknown target migration '{target}'")]
    UnknownTarget { target: String },

    /// P002: Ledger history is not on the path to the target
    #[error("[P002] Ledger is not on the path to '{target}': {reason}")]
    AlreadyAhead { target: String, reason: String },

    /// P003: Rollback asks for more steps than the ledger holds
    #[error("[P003] Cannot roll back {requested} migration(s): only {applied} applied")]
    RollbackOutOfRange { requested: usize, applied: usize },

    /// E014: IO error
    #[error("[E014] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to access '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
