pub mod application;
pub mod entities;
pub mod errors;
pub mod models;
pub mod paths;
pub mod ports;
pub mod repositories;
pub mod resolution;
pub mod services;

pub use application::{NuGetPackageManager, SourceSelection};
pub use entities::*;
pub use errors::*;
pub use models::*;
pub use ports::*;
