pub mod config;
mod list;
mod rebuild;

pub use list::*;
pub use rebuild::*;
