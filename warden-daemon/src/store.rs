//! JSON config file persistence for the managed proxy
//!
//! Every operation reloads the file from disk and writes it straight back, so
//! the daemon never holds a long-lived copy of the document. Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so readers never observe a partial file.
//!
//! Read-modify-write cycles issued through one `ConfigStore` are serialized
//! by an internal lock. Edits made to the file by other programs between our
//! load and save are still overwritten (last save wins).

mod schema;

pub use schema::{OutboundEntry, ServiceEntry, default_minecraft_options};

use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid, chown};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{StoreError, StoreResult};
use crate::path::{self, ConfigPath, PathError};

/// Indentation used when writing the config file
const INDENT: &[u8] = b"    ";

pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole document.
    pub fn load(&self) -> StoreResult<Value> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::from_io(&self.path, e))?;
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the whole document on disk.
    pub fn save(&self, document: &Value) -> StoreResult<()> {
        let bytes = render(document)?;
        self.write_atomic(&bytes)?;
        debug!("Saved config to {:?}", self.path);
        Ok(())
    }

    /// Replace the whole document, serialized against other writers in this process.
    pub fn replace(&self, document: &Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        self.save(document)?;
        info!("Replaced config {:?}", self.path);
        Ok(())
    }

    pub fn get_value(&self, path: &ConfigPath) -> StoreResult<Value> {
        let document = self.load()?;
        Ok(path::resolve(&document, path)?.clone())
    }

    /// Set one value and persist. Nothing is written when the path does not resolve.
    pub fn set_value(&self, path: &ConfigPath, value: Value) -> StoreResult<()> {
        self.update(|document| {
            path::assign(document, path, value)?;
            Ok(())
        })?;
        info!("Updated config value at {}", path);
        Ok(())
    }

    /// Append a service entry to `Services`, creating the array when absent.
    pub fn add_service(&self, service: ServiceEntry) -> StoreResult<()> {
        let name = service.name.clone();
        let entry = serde_json::to_value(service).map_err(StoreError::Serialize)?;
        self.add_entry("Services", "Service", &name, entry)?;
        info!("Added service {}", name);
        Ok(())
    }

    pub fn remove_service(&self, name: &str) -> StoreResult<()> {
        self.remove_entry("Services", "Service", name)?;
        info!("Removed service {}", name);
        Ok(())
    }

    /// Append an outbound entry to `Outbounds`, filling stock defaults.
    pub fn add_outbound(&self, outbound: OutboundEntry) -> StoreResult<()> {
        let name = outbound.name.clone();
        let entry =
            serde_json::to_value(outbound.with_defaults()).map_err(StoreError::Serialize)?;
        self.add_entry("Outbounds", "Outbound", &name, entry)?;
        info!("Added outbound {}", name);
        Ok(())
    }

    pub fn remove_outbound(&self, name: &str) -> StoreResult<()> {
        self.remove_entry("Outbounds", "Outbound", name)?;
        info!("Removed outbound {}", name);
        Ok(())
    }

    /// Load, mutate and save under the store lock. The closure's error aborts the save.
    fn update<F>(&self, mutate: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Value) -> StoreResult<()>,
    {
        let _guard = self.write_lock.lock();
        let mut document = self.load()?;
        mutate(&mut document)?;
        self.save(&document)
    }

    fn add_entry(
        &self,
        section: &'static str,
        kind: &'static str,
        name: &str,
        entry: Value,
    ) -> StoreResult<()> {
        self.update(|document| {
            let Value::Object(root) = document else {
                return Err(PathError::InvalidTarget {
                    path: section.to_string(),
                }
                .into());
            };
            let Value::Array(entries) = root
                .entry(section)
                .or_insert_with(|| Value::Array(Vec::new()))
            else {
                return Err(PathError::InvalidTarget {
                    path: section.to_string(),
                }
                .into());
            };

            if entries.iter().any(|e| entry_name(e) == Some(name)) {
                return Err(StoreError::DuplicateEntry {
                    kind,
                    name: name.to_string(),
                });
            }
            entries.push(entry);
            Ok(())
        })
    }

    fn remove_entry(&self, section: &'static str, kind: &'static str, name: &str) -> StoreResult<()> {
        self.update(|document| {
            let Some(Value::Array(entries)) = document.get_mut(section) else {
                return Err(StoreError::SectionMissing(section));
            };

            let before = entries.len();
            entries.retain(|e| entry_name(e) != Some(name));
            if entries.len() == before {
                return Err(StoreError::EntryNotFound {
                    kind,
                    name: name.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Write via a temp file next to the real target, keeping the old file's
    /// mode and owner. A symlinked config path stays a symlink.
    fn write_atomic(&self, content: &[u8]) -> StoreResult<()> {
        let target = match std::fs::canonicalize(&self.path) {
            Ok(real) => real,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.path.clone(),
            Err(e) => return Err(StoreError::from_io(&self.path, e)),
        };
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| StoreError::from_io(parent, e))?;

        if let Ok(meta) = std::fs::metadata(&target) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| StoreError::from_io(&target, e))?;
            if let Err(e) = chown(
                tmp.path(),
                Some(Uid::from_raw(meta.uid())),
                Some(Gid::from_raw(meta.gid())),
            ) {
                debug!("Could not keep owner of {:?}: {}", target, e);
            }
        }

        tmp.write_all(content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::from_io(tmp.path(), e))?;

        tmp.persist(&target)
            .map_err(|e| StoreError::from_io(&target, e.error))?;
        Ok(())
    }
}

fn entry_name(entry: &Value) -> Option<&str> {
    entry.get("Name").and_then(Value::as_str)
}

/// Pretty-print with four-space indentation. Non-ASCII text is written as-is.
pub fn render(document: &Value) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document
        .serialize(&mut serializer)
        .map_err(StoreError::Serialize)?;
    Ok(buf)
}
