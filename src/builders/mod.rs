pub mod manager_builder;

pub use manager_builder::PoolManagerBuilder;
