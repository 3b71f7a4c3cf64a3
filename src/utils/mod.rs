pub mod bits;
pub mod handle;
pub mod per_frame;

pub use bits::BitRanges;
pub use handle::{Handle, Pool};
pub use per_frame::PerFrame;
