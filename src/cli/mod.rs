pub mod args;

pub use args::{CacheAction, Cli, Commands, ConfigAction, WindowArgs};
