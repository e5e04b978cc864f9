pub mod attrs;
pub mod excerpt;
pub mod marker;
pub mod tree;

pub use attrs::flatten_attributes;
pub use excerpt::excerpt;
pub use marker::BlockMarker;
