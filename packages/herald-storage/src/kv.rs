//! Small key-value maps for auxiliary state kept outside Postgres.
//!
//! Writers are expected to be a single process. The file backend rewrites the whole map on every
//! `put`, through a temporary file and a rename so readers never observe a torn file.

use std::{
	collections::BTreeMap,
	fs,
	path::{Path, PathBuf},
	sync::Mutex,
};

use serde::{Serialize, de::DeserializeOwned};

use crate::{Error, Result};

pub trait KeyValueStore<V>
where
	Self: Send + Sync,
{
	fn get(&self, key: &str) -> Result<Option<V>>;

	fn put(&self, key: &str, value: V) -> Result<()>;

	/// All entries, ordered by key.
	fn list(&self) -> Result<Vec<(String, V)>>;
}

pub struct JsonFileStore<V> {
	path: PathBuf,
	entries: Mutex<BTreeMap<String, V>>,
}
impl<V> JsonFileStore<V>
where
	V: Serialize + DeserializeOwned + Clone,
{
	/// Loads the map from `path`. A missing file is an empty map.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
		let path = path.into();
		let entries = match fs::read(&path) {
			Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
			Ok(raw) => serde_json::from_slice(&raw)
				.map_err(|err| Error::Decode { path: path.clone(), source: err })?,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
			Err(err) => return Err(Error::Io { path, source: err }),
		};

		Ok(Self { path, entries: Mutex::new(entries) })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist(&self, entries: &BTreeMap<String, V>) -> Result<()> {
		let raw = serde_json::to_vec_pretty(entries)?;
		let tmp = self.path.with_extension("tmp");

		if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
			fs::create_dir_all(parent)
				.map_err(|err| Error::Io { path: parent.to_path_buf(), source: err })?;
		}

		fs::write(&tmp, raw).map_err(|err| Error::Io { path: tmp.clone(), source: err })?;
		fs::rename(&tmp, &self.path)
			.map_err(|err| Error::Io { path: self.path.clone(), source: err })?;

		Ok(())
	}
}
impl<V> KeyValueStore<V> for JsonFileStore<V>
where
	V: Serialize + DeserializeOwned + Clone + Send,
{
	fn get(&self, key: &str) -> Result<Option<V>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		Ok(entries.get(key).cloned())
	}

	fn put(&self, key: &str, value: V) -> Result<()> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let previous = entries.insert(key.to_string(), value);

		if let Err(err) = self.persist(&entries) {
			match previous {
				Some(previous) => entries.insert(key.to_string(), previous),
				None => entries.remove(key),
			};

			return Err(err);
		}

		Ok(())
	}

	fn list(&self) -> Result<Vec<(String, V)>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		Ok(entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
	}
}

pub struct MemoryStore<V> {
	entries: Mutex<BTreeMap<String, V>>,
}
impl<V> MemoryStore<V> {
	pub fn new() -> Self {
		Self { entries: Mutex::new(BTreeMap::new()) }
	}
}
impl<V> Default for MemoryStore<V> {
	fn default() -> Self {
		Self::new()
	}
}
impl<V> KeyValueStore<V> for MemoryStore<V>
where
	V: Clone + Send,
{
	fn get(&self, key: &str) -> Result<Option<V>> {
		Ok(self.entries.lock().unwrap_or_else(|err| err.into_inner()).get(key).cloned())
	}

	fn put(&self, key: &str, value: V) -> Result<()> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).insert(key.to_string(), value);

		Ok(())
	}

	fn list(&self) -> Result<Vec<(String, V)>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		Ok(entries.iter().map(|(key, value)| (key.clone(), value.clone())).collect())
	}
}
