pub mod inspect;
pub mod merge;
pub mod render;

pub use inspect::{inspect, InspectArgs};
pub use merge::{merge, MergeArgs};
pub use render::{render, RenderArgs};
