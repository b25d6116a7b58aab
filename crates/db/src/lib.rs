//! Postgres persistence for the caption engine.
//!
//! Row models and repositories follow the table layout in `migrations/`;
//! [`store::PgStore`] assembles them into the `capstudio-core` store
//! traits the engine consumes.

pub mod models;
pub mod repositories;
pub mod store;

/// Run pending migrations against the given pool.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!().run(pool).await
}
