//! Mediafiles Database Layer
//!
//! Persistence for media records. [`MediaRepository`] is the contract the
//! processing pipeline consumes; [`PgMediaRepository`] backs it with
//! PostgreSQL and [`InMemoryMediaRepository`] keeps everything in process.

pub mod db;
pub mod error;
pub mod repository;

pub use db::media::PgMediaRepository;
pub use db::memory::InMemoryMediaRepository;
pub use db::pool::setup_database;
pub use error::{RepositoryError, RepositoryResult};
pub use repository::MediaRepository;
