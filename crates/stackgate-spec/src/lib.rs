pub mod builtin;
pub mod error;
pub mod load;

pub use builtin::*;
pub use error::*;
pub use load::*;
