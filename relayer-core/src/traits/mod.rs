pub use encode::*;
pub use token_bridge::*;

mod encode;
mod token_bridge;
