// See <https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html>

pub mod eviction;
pub mod failures;
pub mod runtimes;
pub mod utils;

pub use utils::*;
