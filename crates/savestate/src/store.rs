//! `SaveState<K, V, C>` — a Python-dict-like persistent mapping layered
//! directly over [`savestate_core::Engine`].
//!
//! The engine owns bytes; this type owns the serialization step that turns
//! `K`/`V` into the byte strings the engine actually stores, plus the
//! collection-shaped surface (`get`/`set`/`delete`/`iter`/...) that makes
//! a store usable like any other Rust mapping.

use std::marker::PhantomData;
use std::path::Path;

use tracing::debug;

use savestate_core::{Config, Engine, OpenMode, SaveStateResult};

use crate::codec::{Bincode, ByteCodec, Identity};

/// A persistent mapping from `K` to `V`, backed by a single log-structured
/// file. `C` controls how keys and values are turned into bytes; it
/// defaults to [`Bincode`], which works for any `Serialize`/`Deserialize`
/// pair. Use [`DbmStore`] for the faster, byte-only "dbm mode".
pub struct SaveState<K, V, C = Bincode> {
    engine: Engine,
    codec: C,
    _marker: PhantomData<(K, V)>,
}

/// The degenerate case where keys and values are raw bytes with no framing.
pub type DbmStore = SaveState<Vec<u8>, Vec<u8>, Identity>;

impl<K, V, C> SaveState<K, V, C>
where
    C: ByteCodec<K> + ByteCodec<V>,
{
    /// Open a store at `path` using a dbm-style mode string (`"r"`, `"w"`,
    /// `"c"`, or `"n"`) and the given codec.
    pub fn open_with_codec(path: &Path, mode: &str, verify_checksum: bool, codec: C) -> SaveStateResult<Self> {
        let parsed_mode = OpenMode::parse(mode)?;
        let engine = Engine::open(path, parsed_mode, verify_checksum)?;
        debug!(path = %path.display(), mode, "opened typed mapping");
        Ok(Self {
            engine,
            codec,
            _marker: PhantomData,
        })
    }

    pub fn open_with_codec_and_config(
        path: &Path,
        mode: &str,
        verify_checksum: bool,
        codec: C,
        config: Config,
    ) -> SaveStateResult<Self> {
        let mode = OpenMode::parse(mode)?;
        let engine = Engine::open_with_config(path, mode, verify_checksum, config)?;
        Ok(Self {
            engine,
            codec,
            _marker: PhantomData,
        })
    }

    pub fn get(&mut self, key: &K) -> SaveStateResult<V> {
        let key_bytes = self.codec.encode(key)?;
        let value_bytes = self.engine.get(&key_bytes)?;
        self.codec.decode(&value_bytes)
    }

    pub fn set(&mut self, key: &K, value: &V) -> SaveStateResult<()> {
        let key_bytes = self.codec.encode(key)?;
        let value_bytes = self.codec.encode(value)?;
        self.engine.put(&key_bytes, &value_bytes)
    }

    pub fn delete(&mut self, key: &K) -> SaveStateResult<()> {
        let key_bytes = self.codec.encode(key)?;
        self.engine.delete(&key_bytes)
    }

    pub fn contains(&self, key: &K) -> SaveStateResult<bool> {
        let key_bytes = self.codec.encode(key)?;
        self.engine.contains(&key_bytes)
    }

    pub fn len(&self) -> SaveStateResult<usize> {
        self.engine.len()
    }

    pub fn is_empty(&self) -> SaveStateResult<bool> {
        self.engine.is_empty()
    }

    /// Keys in first-insertion order; overwriting a key never moves it.
    pub fn keys(&self) -> SaveStateResult<Vec<K>> {
        self.engine.keys().iter().map(|k| self.codec.decode(k)).collect()
    }

    pub fn keys_rev(&self) -> SaveStateResult<Vec<K>> {
        self.engine
            .keys_rev()
            .iter()
            .map(|k| self.codec.decode(k))
            .collect()
    }

    /// Values in first-insertion order. Each value is fetched from disk at
    /// call time; the full value set is never cached in memory at once.
    pub fn values(&mut self) -> SaveStateResult<Vec<V>> {
        let key_bytes = self.engine.keys();
        let value_bytes = self.engine.values_for(&key_bytes)?;
        value_bytes.iter().map(|v| self.codec.decode(v)).collect()
    }

    pub fn values_rev(&mut self) -> SaveStateResult<Vec<V>> {
        let key_bytes = self.engine.keys_rev();
        let value_bytes = self.engine.values_for(&key_bytes)?;
        value_bytes.iter().map(|v| self.codec.decode(v)).collect()
    }

    pub fn items(&mut self) -> SaveStateResult<Vec<(K, V)>> {
        let key_bytes = self.engine.keys();
        let pairs = self.engine.items_for(&key_bytes)?;
        pairs
            .into_iter()
            .map(|(k, v)| Ok((self.codec.decode(&k)?, self.codec.decode(&v)?)))
            .collect()
    }

    pub fn items_rev(&mut self) -> SaveStateResult<Vec<(K, V)>> {
        let key_bytes = self.engine.keys_rev();
        let pairs = self.engine.items_for(&key_bytes)?;
        pairs
            .into_iter()
            .map(|(k, v)| Ok((self.codec.decode(&k)?, self.codec.decode(&v)?)))
            .collect()
    }

    /// Remove `key` and return its value. Falls back to `default` (without
    /// failing) if the key is absent; fails with `NotFound` if no default
    /// is given.
    pub fn pop(&mut self, key: &K, default: Option<V>) -> SaveStateResult<V> {
        let key_bytes = self.codec.encode(key)?;
        let default_bytes = default.as_ref().map(|v| self.codec.encode(v)).transpose()?;
        let value_bytes = self.engine.pop(&key_bytes, default_bytes)?;
        self.codec.decode(&value_bytes)
    }

    /// Remove and return the most-recently-inserted pair (LIFO).
    pub fn popitem(&mut self) -> SaveStateResult<(K, V)> {
        let (key_bytes, value_bytes) = self.engine.popitem()?;
        Ok((self.codec.decode(&key_bytes)?, self.codec.decode(&value_bytes)?))
    }

    pub fn setdefault(&mut self, key: &K, default: &V) -> SaveStateResult<V> {
        let key_bytes = self.codec.encode(key)?;
        let default_bytes = self.codec.encode(default)?;
        let value_bytes = self.engine.setdefault(&key_bytes, &default_bytes)?;
        self.codec.decode(&value_bytes)
    }

    pub fn update(&mut self, pairs: &[(K, V)]) -> SaveStateResult<()> {
        let encoded = pairs
            .iter()
            .map(|(k, v)| Ok((self.codec.encode(k)?, self.codec.encode(v)?)))
            .collect::<SaveStateResult<Vec<_>>>()?;
        self.engine.update(&encoded)
    }

    pub fn clear(&mut self) -> SaveStateResult<()> {
        self.engine.clear()
    }

    /// Write the current live contents to a new file at `new_path`,
    /// leaving this store untouched.
    pub fn copy(&mut self, new_path: &Path) -> SaveStateResult<()> {
        self.engine.copy(new_path)
    }

    pub fn sync(&mut self) -> SaveStateResult<()> {
        self.engine.sync()
    }

    pub fn compact(&mut self) -> SaveStateResult<()> {
        self.engine.compact()
    }

    pub fn close(&mut self, compact: bool) -> SaveStateResult<()> {
        self.engine.close(compact)
    }
}

impl<K, V> SaveState<K, V, Bincode>
where
    K: serde::Serialize + serde::de::DeserializeOwned,
    V: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Open a store using the default `bincode` codec.
    pub fn open(path: &Path, mode: &str, verify_checksum: bool) -> SaveStateResult<Self> {
        Self::open_with_codec(path, mode, verify_checksum, Bincode)
    }
}

impl DbmStore {
    /// Open a "dbm mode" store: raw byte strings in, raw byte strings out,
    /// with no serialization framing at all.
    pub fn open_dbm(path: &Path, mode: &str, verify_checksum: bool) -> SaveStateResult<Self> {
        Self::open_with_codec(path, mode, verify_checksum, Identity)
    }
}
