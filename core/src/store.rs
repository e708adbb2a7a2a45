use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::job::{JobId, JobKind};
use crate::selection::Selection;

/// Filesystem-backed key/value store holding client-local state between runs.
#[derive(Clone)]
pub struct FsKv {
    root: PathBuf,
}

/// Minimal key/value interface over byte keys and values.
pub trait Kv: Clone + Send + Sync + 'static {
    /// Get value bytes for `key`, if present.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    /// Set value bytes for `key`, overwriting if it exists.
    fn put(&self, key: &[u8], val: &[u8]) -> Result<()>;
    /// Delete `key`; returns `true` if a value existed.
    fn delete(&self, key: &[u8]) -> bool;
}

/// Serde helpers layered on top of any [`Kv`] implementation.
pub trait KvSerde: Kv {
    /// Deserialize type `T` stored at `key` using `bincode`.
    fn get_t<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.get(key) {
            Some(bytes) => {
                let v = bincode::deserialize::<T>(&bytes)
                    .with_context(|| "bincode deserialize")?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }
    /// Serialize `val` with `bincode` and store at `key`.
    fn put_t<T: Serialize>(&self, key: &[u8], val: &T) -> Result<()> {
        let buf = bincode::serialize(val).with_context(|| "bincode serialize")?;
        self.put(key, &buf)
    }
}
impl<T: Kv> KvSerde for T {}

/// Default KV type exported by this crate (FS-backed).
pub type DefaultKv = FsKv;

/// Open an FS-backed KV rooted at `dir` (created if missing).
pub fn open_default<P: AsRef<Path>>(dir: P) -> Result<DefaultKv> {
    let root = dir.as_ref().to_path_buf();
    fs::create_dir_all(&root)
        .with_context(|| format!("create kv dir {}", root.display()))?;
    Ok(FsKv { root })
}

/// Build a namespaced key as bytes: `"{ns}:{key}"`.
pub fn ns(ns: &str, key: &str) -> Vec<u8> {
    let mut s = String::with_capacity(ns.len() + 1 + key.len());
    s.push_str(ns);
    s.push(':');
    s.push_str(key);
    s.into_bytes()
}

/* --------------------- client state --------------------- */

#[derive(Serialize, Deserialize)]
struct StoredSelection {
    group_id: Option<i64>,
    members: Vec<i64>,
}

/// Load the persisted selection, scoped to `active_group`.
///
/// A selection made under another group is never handed back.
pub fn load_selection<K: KvSerde>(kv: &K, active_group: Option<i64>) -> Result<Selection> {
    let stored: Option<StoredSelection> = kv.get_t(&ns("selection", "current"))?;
    Ok(match stored {
        Some(s) if s.group_id == active_group => Selection::from_members(s.members),
        _ => Selection::default(),
    })
}

/// Persist `selection` as made under `group_id`.
pub fn save_selection<K: KvSerde>(kv: &K, group_id: Option<i64>, selection: &Selection) -> Result<()> {
    let stored = StoredSelection { group_id, members: selection.members().to_vec() };
    kv.put_t(&ns("selection", "current"), &stored)
}

/// Id of the job of `kind` that was tracked last, if any.
pub fn last_tracked<K: KvSerde>(kv: &K, kind: JobKind) -> Result<Option<JobId>> {
    let raw: Option<String> = kv.get_t(&ns("tracked", kind.as_str()))?;
    Ok(raw.map(JobId::from))
}

/// Remember `id` as the last tracked job of `kind`.
pub fn set_last_tracked<K: KvSerde>(kv: &K, kind: JobKind, id: &JobId) -> Result<()> {
    kv.put_t(&ns("tracked", kind.as_str()), &id.as_str().to_string())
}

/* --------------------- impl FsKv --------------------- */

impl FsKv {
    fn path_for(&self, key: &[u8]) -> PathBuf {
        // Windows-safe: map arbitrary bytes to a hex file name.
        let mut name = String::with_capacity(key.len() * 2);
        for &b in key {
            name.push(hex_digit((b >> 4) & 0xF));
            name.push(hex_digit(b & 0xF));
        }
        self.root.join(name)
    }
}

fn hex_digit(n: u8) -> char {
    match n {
        0..=9 => (b'0' + n) as char,
        10..=15 => (b'a' + (n - 10)) as char,
        _ => '?',
    }
}

impl Kv for FsKv {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let mut f = fs::File::open(&path).ok()?;
        let mut buf = Vec::new();
        if f.read_to_end(&mut buf).is_ok() { Some(buf) } else { None }
    }

    fn put(&self, key: &[u8], val: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create kv dir {}", parent.display()))?;
        }
        // write temp then rename
        let tmp = path.with_extension("tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("create {}", tmp.display()))?;
        f.write_all(val).with_context(|| format!("write {}", tmp.display()))?;
        f.sync_all().with_context(|| format!("sync {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> bool {
        fs::remove_file(self.path_for(key)).is_ok()
    }
}
