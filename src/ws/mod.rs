pub mod attacher;
pub mod connection;
pub mod reaper;
pub mod registry;
