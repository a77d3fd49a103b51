//! Test-only fixtures: an in-memory VFS and a deterministic fake transformer,
//! shared across this crate's unit tests and its `tests/` integration suite.

mod fake_transformer;
mod memory_vfs;

pub use fake_transformer::FakeTransformer;
pub use memory_vfs::MemoryVfs;
