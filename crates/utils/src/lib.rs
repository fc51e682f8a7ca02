// utils crate

pub mod archive;

pub use archive::{pack, pack_entry, unpack, ArchiveError};
