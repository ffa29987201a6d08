//! On-disk page formats and file access.

pub mod block;
pub mod file;
pub mod header;
pub mod heap;
pub mod node;
