// ABOUTME: dbt transformation step
// ABOUTME: Reads the project manifest and runs the dbt CLI once sync data has landed

pub mod manifest;
pub mod runner;

pub use manifest::{Manifest, Model};
pub use runner::DbtRunner;
