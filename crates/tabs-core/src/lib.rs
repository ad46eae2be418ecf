pub mod actions;
pub mod config;
pub mod persistence;
pub mod reducer;
pub mod state;

pub use actions::*;
pub use persistence::*;
pub use reducer::*;
pub use state::*;
