pub mod args;
pub mod settings;

pub use args::*;
pub use settings::*;
