// Use cases layer: application workflows for the share client.

pub mod end_message;
pub mod sharing;

#[cfg(test)]
pub(crate) mod test_support;

pub use end_message::EndMessageSlot;
pub use sharing::{SharingDeps, SharingManager, SharingTuning, parse_server_url};
