pub mod clients;
pub mod location;
pub mod notifications;
pub mod protocol;
pub mod settings;
