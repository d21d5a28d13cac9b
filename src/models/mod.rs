pub mod action;
pub mod config;
pub mod context;
pub mod dependency;
pub mod operations;
pub mod package;
pub mod repository;
pub mod spec;
pub mod target;
pub mod version_range;

pub use action::*;
pub use config::*;
pub use context::*;
pub use dependency::*;
pub use operations::*;
pub use package::*;
pub use repository::*;
pub use spec::*;
pub use target::*;
pub use version_range::*;
