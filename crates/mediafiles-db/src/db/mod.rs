pub mod media;
pub mod memory;
pub mod pool;
