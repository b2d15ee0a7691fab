//! CLI command implementations

pub(crate) mod apply;
pub(crate) mod common;
pub(crate) mod new;
pub(crate) mod plan;
pub(crate) mod rollback;
pub(crate) mod status;
pub(crate) mod unlock;
pub(crate) mod verify;
