//! Tunable knobs for the engine, split out from `Engine::open` itself so
//! callers can build one up without juggling a long parameter list.

use crate::error::{SaveStateError, SaveStateResult};
use crate::io::DEFAULT_FLUSH_THRESHOLD;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bytes of buffered writes before an implicit flush to the OS.
    pub write_buffer_bytes: usize,
    /// Bound on how far past a corruption point salvage scans before giving
    /// up and truncating. `None` scans to the end of the file.
    pub salvage_scan_limit_bytes: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            write_buffer_bytes: DEFAULT_FLUSH_THRESHOLD,
            salvage_scan_limit_bytes: None,
        }
    }
}

impl Config {
    pub fn validate(&self) -> SaveStateResult<()> {
        if self.write_buffer_bytes == 0 {
            return Err(SaveStateError::InvalidArgument {
                message: "write_buffer_bytes must be at least 1".into(),
            });
        }
        if let Some(limit) = self.salvage_scan_limit_bytes {
            if limit == 0 {
                return Err(SaveStateError::InvalidArgument {
                    message: "salvage_scan_limit_bytes must be at least 1 if set".into(),
                });
            }
        }
        Ok(())
    }
}
