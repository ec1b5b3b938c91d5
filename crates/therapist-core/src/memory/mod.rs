//! Foreign process memory access.
//!
//! Everything in this module treats addresses as plain integers in the
//! *foreign* address space. Nothing here ever dereferences them locally.

mod buffer;
mod pe;
mod process;
mod reader;

#[cfg(test)]
pub mod mock;

pub use buffer::ByteBuffer;
pub use pe::detect_build_id;
pub use process::*;
pub use reader::{ReadMemory, Width, WriteMemory};

#[cfg(test)]
pub use mock::{MockMemory, MockMemoryBuilder};

/// An address inside the foreign process.
pub type Address = u64;
