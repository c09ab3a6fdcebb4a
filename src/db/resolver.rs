//! Database name resolution against the operator allow-list.
//!
//! The allow-list comes from `DATABASES` (comma-separated) or, when that is
//! unset, from `DATABASE_NAME`. Settings are re-read on every call so that a
//! changed environment takes effect without a restart.

use crate::config::{DatabaseSettings, SettingsSource};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("database '{database}' is not in the allow-list")]
    NotAllowed { database: String },

    #[error("no database name given and DATABASE_NAME is not set")]
    NoNameAvailable,
}

/// Compute the allow-list from a settings snapshot.
///
/// Entries are trimmed, blanks dropped, order and duplicates preserved.
pub fn allowed_databases(settings: &DatabaseSettings) -> Vec<String> {
    if let Some(list) = settings
        .databases
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    settings
        .default_database()
        .map(|name| vec![name.to_string()])
        .unwrap_or_default()
}

/// Resolve an optional requested name against a settings snapshot.
///
/// A blank request counts as no request and falls back to `DATABASE_NAME`.
/// An empty allow-list accepts any name.
pub fn resolve_database_name(
    settings: &DatabaseSettings,
    requested: Option<&str>,
) -> Result<String, ResolveError> {
    let candidate = requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| settings.default_database())
        .ok_or(ResolveError::NoNameAvailable)?;

    let allowed = allowed_databases(settings);
    if allowed.is_empty() {
        warn!(
            database = %candidate,
            "No database allow-list configured, accepting requested database"
        );
        return Ok(candidate.to_string());
    }

    if allowed.iter().any(|name| name == candidate) {
        Ok(candidate.to_string())
    } else {
        Err(ResolveError::NotAllowed {
            database: candidate.to_string(),
        })
    }
}

/// Resolver bound to a settings source.
#[derive(Clone)]
pub struct DatabaseResolver {
    settings: Arc<dyn SettingsSource>,
}

impl DatabaseResolver {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self { settings }
    }

    /// Load a fresh settings snapshot.
    pub fn settings(&self) -> DatabaseSettings {
        self.settings.load()
    }

    /// Current allow-list.
    pub fn allowed_databases(&self) -> Vec<String> {
        allowed_databases(&self.settings.load())
    }

    /// Resolve a requested database name, or the default when none is given.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String, ResolveError> {
        // One snapshot per call keeps the allow-list and default consistent
        let settings = self.settings.load();
        resolve_database_name(&settings, requested)
    }
}

impl std::fmt::Debug for DatabaseResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseResolver").finish_non_exhaustive()
    }
}
