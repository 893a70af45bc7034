//! vfs-dircache shared library.

/// Cache tunables.
pub mod config;
/// Directory-children cache over a persistent file record store.
pub mod fs;
/// Global structural modification counter.
pub mod modcount;
/// Name interning and the child-name comparator.
pub mod names;
pub mod sync;
