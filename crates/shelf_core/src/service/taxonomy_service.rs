//! Taxonomy use-case service.
//!
//! # Responsibility
//! - Validate tag, category and collection names above the repository layer.
//! - Expose create, rename, merge, delete and count reconciliation.
//!
//! # Invariants
//! - Names are trimmed; blank names are rejected before storage is touched.
//! - Merging an entry into itself is a no-op.

use crate::model::taxonomy::{normalize_name, TaxonomyEntry, TaxonomyKind};
use crate::repo::taxonomy_repo::TaxonomyRepository;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

const ALL_KINDS: [TaxonomyKind; 3] = [
    TaxonomyKind::Tag,
    TaxonomyKind::Category,
    TaxonomyKind::Collection,
];

/// Errors from taxonomy service operations.
#[derive(Debug)]
pub enum TaxonomyServiceError {
    /// Name is blank after trim.
    InvalidName,
    EntryNotFound { kind: TaxonomyKind, id: String },
    /// Another entry already uses the slug of the requested name.
    DuplicateEntry { kind: TaxonomyKind, id: String },
    /// Repository-level failure.
    Repo(RepoError),
}

impl Display for TaxonomyServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::EntryNotFound { kind, id } => write!(f, "{} not found: {id}", kind.as_str()),
            Self::DuplicateEntry { kind, id } => {
                write!(f, "{} already exists: {id}", kind.as_str())
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TaxonomyServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TaxonomyServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::EntryNotFound { kind, id } => Self::EntryNotFound { kind, id },
            RepoError::DuplicateEntry { kind, id } => Self::DuplicateEntry { kind, id },
            other => Self::Repo(other),
        }
    }
}

/// Taxonomy service facade.
pub struct TaxonomyService<R: TaxonomyRepository> {
    repo: R,
}

impl<R: TaxonomyRepository> TaxonomyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one entry at the end of its kind.
    pub fn create(
        &self,
        kind: TaxonomyKind,
        name: &str,
    ) -> Result<TaxonomyEntry, TaxonomyServiceError> {
        let name = normalize(name)?;
        self.repo.create_entry(kind, &name).map_err(Into::into)
    }

    /// Lists entries of one kind in display order.
    pub fn list(&self, kind: TaxonomyKind) -> Result<Vec<TaxonomyEntry>, TaxonomyServiceError> {
        self.repo.list_entries(kind).map_err(Into::into)
    }

    pub fn get(
        &self,
        kind: TaxonomyKind,
        id: &str,
    ) -> Result<Option<TaxonomyEntry>, TaxonomyServiceError> {
        self.repo.get_entry(kind, id).map_err(Into::into)
    }

    /// Renames one entry; items referencing it follow the new name.
    pub fn rename(
        &self,
        kind: TaxonomyKind,
        id: &str,
        new_name: &str,
    ) -> Result<TaxonomyEntry, TaxonomyServiceError> {
        let new_name = normalize(new_name)?;
        self.repo
            .rename_entry(kind, id, &new_name)
            .map_err(Into::into)
    }

    /// Folds `from_id` into `into_id`.
    pub fn merge(
        &self,
        kind: TaxonomyKind,
        from_id: &str,
        into_id: &str,
    ) -> Result<TaxonomyEntry, TaxonomyServiceError> {
        self.repo
            .merge_entries(kind, from_id, into_id)
            .map_err(Into::into)
    }

    /// Deletes one entry; referencing items lose the reference.
    pub fn delete(&self, kind: TaxonomyKind, id: &str) -> Result<(), TaxonomyServiceError> {
        self.repo.delete_entry(kind, id).map_err(Into::into)
    }

    /// Recounts one kind. Returns how many counts were corrected.
    pub fn reconcile_counts(&self, kind: TaxonomyKind) -> Result<usize, TaxonomyServiceError> {
        self.repo.recalculate_counts(kind).map_err(Into::into)
    }

    /// Recounts every kind.
    pub fn reconcile_all(&self) -> Result<usize, TaxonomyServiceError> {
        let mut corrected = 0;
        for kind in ALL_KINDS {
            corrected += self.reconcile_counts(kind)?;
        }
        Ok(corrected)
    }
}

fn normalize(name: &str) -> Result<String, TaxonomyServiceError> {
    normalize_name(name).ok_or(TaxonomyServiceError::InvalidName)
}
