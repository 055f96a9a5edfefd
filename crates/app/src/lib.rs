pub mod decoder;
pub mod emitter;
pub mod interim;
pub mod pipeline;
pub mod record;
pub mod shared;
pub mod sink;

pub use voxstream_foundation::Settings;
