pub mod config;
pub mod path;
pub mod step;
pub mod tree;

pub use config::*;
pub use path::*;
pub use step::*;
pub use tree::*;
