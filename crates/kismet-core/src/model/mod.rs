mod filters;
mod record;
mod segment;

pub use filters::*;
pub use record::*;
pub use segment::*;
