// The clients defined here are reqwest clients that talk to external services.
pub mod hauk;

pub use hauk::{HaukClient, HaukClientError};
