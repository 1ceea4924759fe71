//! # Shared Types Crate
//!
//! Types shared between the chain-side store and the swing-store export
//! subsystem.
//!
//! ## Contents
//!
//! - `entities` - `KVEntry`, a key with an optional value
//! - `reader` - the `KVEntryReader` streaming contract and its in-memory,
//!   iterator-backed and hooking implementations
//! - `jsonl` - the line-delimited JSON reader and encoder used for "export
//!   data" files
//! - `errors` - `KVEntryError`

pub mod entities;
pub mod errors;
pub mod jsonl;
pub mod reader;

pub use entities::KVEntry;
pub use errors::KVEntryError;
pub use jsonl::{encode_kv_entry_reader_to_jsonl, JsonlKVEntryReader};
pub use reader::{
    KVEntryReader, KVEntrySequenceReader, KVEntryVecReader, KVHookReader, KVIteratorReader,
    OrderedIterator,
};
