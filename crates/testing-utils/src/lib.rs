//! Shared testing utilities: mock ports and entity builders.

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
