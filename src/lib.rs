// Library exports for the CLI, integration tests and reusable components

pub mod api;
pub mod config;
pub mod encryption;
pub mod export;
pub mod generator;
pub mod models;
pub mod qr_image;
pub mod query;
pub mod serial;
pub mod session;
pub mod upload;

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
