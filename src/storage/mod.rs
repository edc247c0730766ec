pub mod engine;
pub mod fingerprint;
pub mod local;
pub mod memory;
pub mod object;
pub mod record;

pub use engine::*;
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use object::*;
