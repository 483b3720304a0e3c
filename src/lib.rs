//! In-memory tabular store: constraint-checked columns, a primary-key row
//! store with secondary indexes, JSON snapshots and a textual grid renderer.
//!
//! Everything is synchronous and single-threaded. A [`table::table::Table`]
//! has no internal locking; callers sharing one instance across threads must
//! serialize all mutating calls themselves. The only I/O is one-shot
//! snapshot save/load in [`store`], which has no partial-write recovery: a
//! crash mid-save can leave a corrupt snapshot file.

pub mod render;
pub mod store;
pub mod table;
pub mod value;
