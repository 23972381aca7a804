pub use base_server::*;

mod base_server;
/// Response types shared by agent specific routes
pub mod utils;
