use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{error, info, warn};

/// The local key/value map with a durable JSON snapshot. A dumb container:
/// ownership of keys is the engine's concern, the store persists whatever
/// it is handed. Every mutation rewrites the snapshot through a temp
/// sibling and an atomic rename, so a crash leaves either the old or the
/// new file, never a torn one.
#[derive(Debug)]
pub struct Store {
    map: HashMap<String, String>,
    path: PathBuf,
}

impl Store {
    /// Loads the snapshot at `path`. A missing or corrupt file resets the
    /// store to empty and writes a fresh snapshot in its place; a valid
    /// snapshot is never rewritten on load.
    pub fn open(path: PathBuf) -> Store {
        let mut replace_snapshot = false;
        let map = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<HashMap<String, String>>(&bytes) {
                Ok(map) => {
                    info!("Loaded {} keys from {}", map.len(), path.display());
                    map
                }
                Err(e) => {
                    warn!(
                        "Snapshot {} is corrupt ({}), starting empty",
                        path.display(),
                        e
                    );
                    replace_snapshot = true;
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Creating new data store at {}", path.display());
                replace_snapshot = true;
                HashMap::new()
            }
            Err(e) => {
                warn!("Cannot read {} ({}), starting empty", path.display(), e);
                HashMap::new()
            }
        };

        let store = Store { map, path };
        if replace_snapshot {
            store.snapshot();
        }
        store
    }

    pub fn put(&mut self, key: String, value: String) {
        self.map.insert(key, value);
        self.snapshot();
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Removes `key`, returning its value. Only a successful removal
    /// touches the snapshot.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.map.remove(key);
        if removed.is_some() {
            self.snapshot();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists the current map. Failures keep the previous snapshot and
    /// the in-memory state intact.
    fn snapshot(&self) {
        if let Err(e) = self.write_snapshot() {
            error!("Failed to snapshot {}: {}", self.path.display(), e);
            let tmp = self.tmp_path();
            if tmp.exists() {
                let _ = fs::remove_file(tmp);
            }
        }
    }

    fn write_snapshot(&self) -> io::Result<()> {
        let tmp = self.tmp_path();
        let bytes = serde_json::to_vec_pretty(&self.map)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
