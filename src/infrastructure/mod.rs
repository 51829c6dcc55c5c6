// Infrastructure layer - External dependencies and adapters
pub mod artifact_store;
pub mod config;
pub mod memory_dashboard_repository;
pub mod memory_data_source;
pub mod renderer;
pub mod rest_data_source;
