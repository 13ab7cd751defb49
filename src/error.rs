//! Top-level error type
//!
//! Wraps every module error so the binary has one thing to report, and sorts
//! them into the handful of failure classes callers actually act on.

use thiserror::Error;

use crate::config::ConfigError;
use crate::grid::frame::FrameError;
use crate::grid::gif::ExtractError;
use crate::grid::import::ImportError;
use crate::grid::resample::ResampleError;
use crate::state::catalog::CatalogError;
use crate::state::collection::CollectionError;
use crate::state::legacy::LegacyError;
use crate::state::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Resample(#[from] ResampleError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Legacy(#[from] LegacyError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed arguments; never worth retrying
    InvalidInput,
    /// An upload could not be turned into frames
    DecodeFailure,
    /// The store could not be reached or returned unusable data
    FetchFailure,
    /// An edit was rejected and nothing was applied
    ValidationFailure,
    /// Local and stored state may now disagree
    Inconsistency,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Resample(_) | AppError::Frame(_) | AppError::Config(_) => ErrorKind::InvalidInput,
            AppError::Extract(_) => ErrorKind::DecodeFailure,
            AppError::Import(e) => match e {
                ImportError::Io { .. } | ImportError::Resample(_) | ImportError::Frame(_) | ImportError::Empty => {
                    ErrorKind::InvalidInput
                }
                ImportError::Image { .. } | ImportError::Gif { .. } => ErrorKind::DecodeFailure,
            },
            AppError::Collection(_) => ErrorKind::ValidationFailure,
            AppError::Store(_) => ErrorKind::FetchFailure,
            AppError::Catalog(e) => match e {
                CatalogError::Store(_) | CatalogError::PartialFetch { .. } => ErrorKind::FetchFailure,
                CatalogError::ArchiveFailed { dequeued: true, .. } => ErrorKind::Inconsistency,
                CatalogError::ArchiveFailed { dequeued: false, .. } => ErrorKind::FetchFailure,
                CatalogError::Collection(_) | CatalogError::NotInCatalog(_) | CatalogError::MissingFrames { .. } => {
                    ErrorKind::ValidationFailure
                }
            },
            AppError::Legacy(e) => match e {
                LegacyError::NotLoaded(_) | LegacyError::Collection(_) => ErrorKind::ValidationFailure,
                _ => ErrorKind::InvalidInput,
            },
        }
    }
}
