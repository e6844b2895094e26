//! Magnet URI parsing and merging.
//!
//! A magnet descriptor always carries a non-empty `urn:btih:` hash. Parsing
//! rejects URIs with no hash or with more than one distinct hash, and merging
//! rejects inputs whose hashes disagree.

mod codec;
mod name;
mod types;

pub use codec::{info_hash_of, merge, parse, MergedMagnet};
pub use name::clean_display_name;
pub use types::*;
