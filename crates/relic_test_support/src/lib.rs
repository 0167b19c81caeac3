mod fake_driver;
mod fixtures;

pub use fake_driver::{FakeDriver, FakeDriverStats, FakeOutcome};
pub use fixtures::{blog_registry, users_table};
