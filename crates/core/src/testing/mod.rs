//! Test doubles shared by unit and integration tests.

mod mock_backend;

pub use mock_backend::{MockBackend, RecordedRequest};
