//! A hierarchical, path-indexed key/value store backed by `heed` (a safe
//! wrapper over LMDB), offering explicit read/write transactions and a
//! composable transform view — the collaborator the distilled spec leaves
//! abstract as "a key/value engine with range-scan cursors".

use crate::cfg::DirectoryConfig;
use crate::errors::DirectoryError;
use heed::types::ByteSlice;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use log::{debug, warn};
use std::sync::Arc;

/// A single stored entry: its fully-qualified path and raw byte value.
pub type Entry = (String, Vec<u8>);

/// Normalises a path to begin with a leading dot, as the spec's path
/// hygiene requires (`DirectoryConfig` stays silent on this: it is a
/// property of every path, not of the store).
fn normalise(path: &str) -> String {
    if path.is_empty() {
        ".".to_string()
    } else if path.starts_with('.') {
        path.to_string()
    } else {
        format!(".{}", path)
    }
}

/// The root directory: owns the `heed::Env` and its single named database.
pub struct Directory {
    env: Env,
    db: Database<ByteSlice, ByteSlice>,
}

impl Directory {
    /// Opens (creating if necessary) the LMDB environment described by
    /// `config`.
    pub fn open(config: &DirectoryConfig) -> Result<Directory, DirectoryError> {
        std::fs::create_dir_all(&config.map_path).map_err(heed::Error::Io)?;

        let env = EnvOpenOptions::new()
            .map_size(config.map_size)
            .max_dbs(1)
            .open(&config.map_path)?;

        let db: Database<ByteSlice, ByteSlice> = env.create_database(Some(&config.sub_database_name))?;

        debug!("opened directory at {:?}", config.map_path);

        Ok(Directory { env, db })
    }

    /// Returns a view rooted at `prefix`, with no transforms.
    pub fn enter(&self, prefix: &str) -> View {
        View {
            directory: DirectoryHandle::Root(DirectoryRef { env: &self.env, db: self.db }),
            prefix: normalise(prefix),
            read_transform: None,
            write_transform: None,
        }
    }

    /// Returns a view rooted at `prefix` with read/write transforms applied
    /// (see [`View::map`]).
    pub fn map(
        &self,
        prefix: &str,
        read_fn: impl Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
        write_fn: impl Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
    ) -> View {
        let mut view = self.enter(prefix);
        view.read_transform = Some(Arc::new(read_fn));
        view.write_transform = Some(Arc::new(write_fn));
        view
    }

    /// Runs `f` inside a read-only transaction; always aborted afterwards
    /// (read transactions never commit writes, so there is nothing to
    /// commit).
    pub fn read<T>(&self, f: impl FnOnce(&Reader) -> Result<T, DirectoryError>) -> Result<T, DirectoryError> {
        let txn = self.env.read_txn()?;
        let reader = Reader {
            txn: &txn,
            db: self.db,
            prefix: "",
            transform: None,
        };
        f(&reader)
    }

    /// Runs `f` inside a read/write transaction: commits iff `f` succeeds,
    /// otherwise aborts.
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut Writer) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut txn = self.env.write_txn()?;
        let result = {
            let mut writer = Writer {
                txn: &mut txn,
                db: self.db,
                prefix: "",
                read_transform: None,
                write_transform: None,
            };
            f(&mut writer)
        };
        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                warn!("directory write transaction aborted: {}", e);
                Err(e)
            }
        }
    }
}

#[derive(Clone, Copy)]
struct DirectoryRef<'a> {
    env: &'a Env,
    db: Database<ByteSlice, ByteSlice>,
}

enum DirectoryHandle<'a> {
    Root(DirectoryRef<'a>),
}

impl<'a> DirectoryHandle<'a> {
    fn env(&self) -> &Env {
        match self {
            DirectoryHandle::Root(r) => r.env,
        }
    }

    fn db(&self) -> Database<ByteSlice, ByteSlice> {
        match self {
            DirectoryHandle::Root(r) => r.db,
        }
    }
}

type Transform = Arc<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// A lightweight handle into a [`Directory`]: a path prefix plus optional
/// read/write transforms. Composes by concatenation; closing a view closes
/// nothing (only closing the owning `Directory` releases the engine).
pub struct View<'a> {
    directory: DirectoryHandle<'a>,
    prefix: String,
    read_transform: Option<Transform>,
    write_transform: Option<Transform>,
}

impl<'a> View<'a> {
    /// Returns a sub-view whose prefix is this view's prefix joined with
    /// `path`.
    pub fn enter(&self, path: &str) -> View<'a> {
        View {
            directory: DirectoryHandle::Root(DirectoryRef {
                env: self.directory.env(),
                db: self.directory.db(),
            }),
            prefix: join(&self.prefix, path),
            read_transform: self.read_transform.clone(),
            write_transform: self.write_transform.clone(),
        }
    }

    /// Returns a sub-view with additional read/write transforms layered on
    /// top of any this view already carries.
    pub fn map(
        &self,
        path: &str,
        read_fn: impl Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
        write_fn: impl Fn(Vec<u8>) -> Vec<u8> + Send + Sync + 'static,
    ) -> View<'a> {
        let mut view = self.enter(path);
        view.read_transform = Some(Arc::new(read_fn));
        view.write_transform = Some(Arc::new(write_fn));
        view
    }

    pub fn read<T>(&self, f: impl FnOnce(&Reader) -> Result<T, DirectoryError>) -> Result<T, DirectoryError> {
        let txn = self.directory.env().read_txn()?;
        let reader = Reader {
            txn: &txn,
            db: self.directory.db(),
            prefix: &self.prefix,
            transform: self.read_transform.clone(),
        };
        let out = f(&reader)?;
        Ok(out)
    }

    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut Writer) -> Result<T, DirectoryError>,
    ) -> Result<T, DirectoryError> {
        let mut txn = self.directory.env().write_txn()?;
        let result = {
            let mut writer = Writer {
                txn: &mut txn,
                db: self.directory.db(),
                prefix: &self.prefix,
                read_transform: self.read_transform.clone(),
                write_transform: self.write_transform.clone(),
            };
            f(&mut writer)
        };
        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => Err(e),
        }
    }
}

fn join(prefix: &str, path: &str) -> String {
    let path = normalise(path);
    if prefix.is_empty() || prefix == "." {
        path
    } else {
        format!("{}{}", prefix.trim_end_matches('.'), path)
    }
}

/// A read-only transaction handle.
pub struct Reader<'txn> {
    txn: &'txn RoTxn<'txn>,
    db: Database<ByteSlice, ByteSlice>,
    prefix: &'txn str,
    transform: Option<Transform>,
}

impl<'txn> Reader<'txn> {
    /// Returns, in lexical key order, every stored entry matched by any path
    /// in `paths`. An empty collection (or a single empty path) matches all
    /// keys. Overlapping partial paths are coalesced. If this reader came
    /// from a transform [`View`], every value passes through the read
    /// transform before being returned.
    pub fn list(&self, paths: &[&str]) -> Result<Vec<Entry>, DirectoryError> {
        let mut entries = list_impl(self.txn, self.db, self.prefix, paths)?;
        if let Some(transform) = &self.transform {
            for (_, value) in entries.iter_mut() {
                *value = transform(std::mem::take(value));
            }
        }
        Ok(entries)
    }
}

/// A read/write transaction handle.
pub struct Writer<'txn> {
    txn: &'txn mut RwTxn<'txn, 'txn>,
    db: Database<ByteSlice, ByteSlice>,
    prefix: &'txn str,
    read_transform: Option<Transform>,
    write_transform: Option<Transform>,
}

impl<'txn> Writer<'txn> {
    /// Same matching rules as [`Reader::list`]; values pass through the
    /// read transform (if any) before being returned.
    pub fn list(&self, paths: &[&str]) -> Result<Vec<Entry>, DirectoryError> {
        let mut entries = list_impl(self.txn, self.db, self.prefix, paths)?;
        if let Some(transform) = &self.read_transform {
            for (_, value) in entries.iter_mut() {
                *value = transform(std::mem::take(value));
            }
        }
        Ok(entries)
    }

    /// Inserts or replaces each entry. Every key must be fully qualified
    /// (not end with `.`); otherwise the whole call fails and nothing is
    /// written. Values pass through the write transform (if any) before
    /// being stored.
    pub fn add(&mut self, entries: &[Entry]) -> Result<(), DirectoryError> {
        for (path, _) in entries {
            let key = join(self.prefix, path);
            if key.ends_with('.') {
                return Err(DirectoryError::PathNotFullyQualified(key));
            }
        }

        for (path, value) in entries {
            let key = join(self.prefix, path);
            let value = match &self.write_transform {
                Some(transform) => transform(value.clone()),
                None => value.clone(),
            };
            self.db.put(self.txn, key.as_bytes(), &value)?;
        }

        Ok(())
    }

    /// Deletes every stored entry matched by any path in `paths`, using the
    /// same matching rules as [`Reader::list`].
    pub fn remove(&mut self, paths: &[&str]) -> Result<usize, DirectoryError> {
        let matched = list_impl(self.txn, self.db, self.prefix, paths)?;
        for (key, _) in &matched {
            self.db.delete(self.txn, key.as_bytes())?;
        }
        Ok(matched.len())
    }
}

fn list_impl(
    txn: &heed::RoTxn,
    db: Database<ByteSlice, ByteSlice>,
    prefix: &str,
    paths: &[&str],
) -> Result<Vec<Entry>, DirectoryError> {
    let qualified: Vec<String> = if paths.is_empty() || (paths.len() == 1 && paths[0].is_empty()) {
        vec![join(prefix, "")]
    } else {
        paths.iter().map(|p| join(prefix, p)).collect()
    };

    let mut out = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for path in &qualified {
        if path.ends_with('.') || path == "." {
            for item in db.prefix_iter(txn, path.as_bytes())? {
                let (k, v) = item?;
                let key = String::from_utf8_lossy(k).into_owned();
                if seen.insert(key.clone()) {
                    out.push((key, v.to_vec()));
                }
            }
        } else if let Some(v) = db.get(txn, path.as_bytes())? {
            if seen.insert(path.clone()) {
                out.push((path.clone(), v.to_vec()));
            }
        }
    }

    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> (tempfile::TempDir, DirectoryConfig) {
        let dir = tempdir().unwrap();
        let config = DirectoryConfig {
            map_path: dir.path().to_path_buf(),
            map_size: 10 * 1024 * 1024,
            sub_database_name: "test".to_string(),
        };
        (dir, config)
    }

    #[test]
    fn add_rejects_partial_paths() {
        let (_dir, config) = test_config();
        let directory = Directory::open(&config).unwrap();

        let result = directory.write(|w| w.add(&[(".t.".to_string(), b"x".to_vec())]));
        assert!(matches!(result, Err(DirectoryError::PathNotFullyQualified(_))));
    }

    #[test]
    fn list_matches_prefix_and_exact_paths() {
        let (_dir, config) = test_config();
        let directory = Directory::open(&config).unwrap();

        directory
            .write(|w| {
                w.add(&[
                    (".t.a".to_string(), b"1".to_vec()),
                    (".t.b".to_string(), b"2".to_vec()),
                    (".t.a.x".to_string(), b"3".to_vec()),
                ])
            })
            .unwrap();

        let exact = directory.read(|r| r.list(&[".t.a"])).unwrap();
        assert_eq!(exact, vec![(".t.a".to_string(), b"1".to_vec())]);

        let prefix = directory.read(|r| r.list(&[".t."])).unwrap();
        assert_eq!(
            prefix.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![".t.a", ".t.a.x", ".t.b"]
        );
    }

    #[test]
    fn remove_deletes_matched_entries() {
        let (_dir, config) = test_config();
        let directory = Directory::open(&config).unwrap();

        directory
            .write(|w| w.add(&[(".t.a".to_string(), b"1".to_vec())]))
            .unwrap();

        let removed = directory.write(|w| w.remove(&[".t.a"])).unwrap();
        assert_eq!(removed, 1);

        let remaining = directory.read(|r| r.list(&[".t."])).unwrap();
        assert!(remaining.is_empty());
    }
}
