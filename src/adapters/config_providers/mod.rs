pub mod file;
pub mod memory;

pub use file::FileConfigSource;
pub use memory::StaticConfigSource;
