pub mod ids;
pub mod model;
pub mod phase;
pub mod result;
pub mod util;

pub use ids::*;
pub use model::*;
pub use phase::*;
pub use result::*;
pub use util::*;
