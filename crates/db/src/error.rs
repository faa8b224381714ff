/// §7 "Data inconsistency" and "Claim contention" are both represented here:
/// a claim returning zero rows is not an error at all (callers see `None`),
/// so this enum only needs to cover genuine failures.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("data inconsistency: {0}")]
    Inconsistent(String),
}
