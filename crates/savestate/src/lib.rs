//! A Python-dict-like persistent mapping, backed by [`savestate_core`]'s
//! log-structured storage engine.
//!
//! ```no_run
//! use savestate::SaveState;
//!
//! # fn main() -> savestate_core::SaveStateResult<()> {
//! let mut store: SaveState<String, i64> = SaveState::open(
//!     std::path::Path::new("counters"),
//!     "c",
//!     true,
//! )?;
//! store.set(&"visits".to_string(), &1)?;
//! assert_eq!(store.get(&"visits".to_string())?, 1);
//! # Ok(())
//! # }
//! ```

mod codec;
mod store;

pub use codec::{Bincode, ByteCodec, Identity};
pub use store::{DbmStore, SaveState};

pub use savestate_core::{Config, OpenMode, SaveStateError, SaveStateResult};
