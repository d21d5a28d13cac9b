pub mod package;
pub mod transaction;

pub use package::*;
pub use transaction::*;
