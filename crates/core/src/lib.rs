pub mod codes;
pub mod models;
pub mod traits;

pub use codes::*;
pub use models::*;
pub use traits::*;
