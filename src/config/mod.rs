//! Configuration models for the pool manager.

pub mod manager;

pub use manager::ManagerConfig;
