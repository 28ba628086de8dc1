use rust_decimal::Decimal;
use sea_orm::error::DbErr;
use serde::Serialize;

/// Fragments that identify lock contention across the supported backends.
/// Postgres reports SQLSTATE codes, SQLite reports a busy/locked message.
const LOCK_CONFLICT_MARKERS: &[&str] = &[
    "40P01",
    "55P03",
    "40001",
    "deadlock detected",
    "lock timeout",
    "could not obtain lock",
    "could not serialize access",
    "database is locked",
    "database table is locked",
];

#[derive(Debug, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[serde(serialize_with = "serialize_db_err")] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(
        "Insufficient stock for inventory {inventory_id}: available {available}, requested {requested}"
    )]
    InsufficientStock {
        inventory_id: i32,
        available: Decimal,
        requested: Decimal,
    },

    #[error(
        "Insufficient allocation for material {material_id}: required {required}, allocated {allocated}"
    )]
    AllocationInsufficient {
        material_id: i32,
        required: Decimal,
        allocated: Decimal,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        ServiceError::db_error(err)
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl ServiceError {
    /// Normalizes a database error. Lock waits, deadlocks and busy databases
    /// become `Conflict` so callers can retry them.
    pub fn db_error(err: DbErr) -> Self {
        if is_lock_conflict(&err) {
            ServiceError::Conflict(err.to_string())
        } else {
            ServiceError::DatabaseError(err)
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        ServiceError::NotFound(format!("{} with ID {} not found", entity, id))
    }

    /// Only lock contention is worth an automatic retry by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Stable machine-readable code for API and CLI consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::AllocationInsufficient { .. } => "allocation_insufficient",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::InternalError(_) => "internal_error",
        }
    }
}

fn serialize_db_err<S: serde::Serializer>(err: &DbErr, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&err.to_string())
}

fn is_lock_conflict(err: &DbErr) -> bool {
    let message = err.to_string();
    LOCK_CONFLICT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
