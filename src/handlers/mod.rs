pub mod relay;
pub mod status;

pub use status::*;
