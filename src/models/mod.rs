pub mod connection;
pub mod room;
pub mod status;

pub use connection::*;
pub use room::*;
pub use status::*;
