//! Runtime adapters for hosting the pool manager.

pub mod tokio_spawner;

pub use tokio_spawner::{Spawn, TokioSpawner};
