pub mod buffer;
pub mod interp;
pub mod pool;

pub use buffer::{NetUpdate, STALE_AFTER_MS, UpdateBuffer};
pub use interp::{Interp, angle_diff, angle_lerp, clamp_angle, lerp, unlerp};
pub use pool::ValuePool;
