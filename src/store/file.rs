//! File-backed [`AuthTokenStorage`] that snapshots tokens to JSON after each mutation.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::AuthToken,
	store::{AuthTokenStorage, StoreError, StoreFuture},
};

type Snapshot = BTreeMap<String, AuthToken>;

/// Persists tokens to a JSON file, replacing it atomically on every write.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<Snapshot>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		ensure_parent_exists(&path)?;

		let snapshot = load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn persist_locked(&self, contents: &Snapshot) -> Result<(), StoreError> {
		ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(contents).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize token snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| backend("create", &tmp_path, e))?;

			file.write_all(&serialized).map_err(|e| backend("write", &tmp_path, e))?;
			file.sync_all().map_err(|e| backend("sync", &tmp_path, e))?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| backend("replace", &self.path, e))
	}

	fn mutate(&self, apply: impl FnOnce(&mut Snapshot)) -> Result<(), StoreError> {
		let mut guard = self.inner.write();
		let mut next = guard.clone();

		apply(&mut next);
		self.persist_locked(&next)?;

		*guard = next;

		Ok(())
	}
}
impl AuthTokenStorage for FileStore {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<AuthToken>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn set<'a>(&'a self, key: &'a str, token: Option<AuthToken>) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.mutate(|snapshot| match token {
				Some(token) => {
					snapshot.insert(key.to_owned(), token);
				},
				None => {
					snapshot.remove(key);
				},
			})
		})
	}

	fn is_empty(&self) -> StoreFuture<'_, bool> {
		Box::pin(async move { Ok(self.inner.read().is_empty()) })
	}

	fn remove_all(&self) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.mutate(BTreeMap::clear) })
	}
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
	if !path.exists() {
		return Ok(Snapshot::new());
	}

	let bytes = fs::read(path).map_err(|e| backend("read", path, e))?;

	if bytes.is_empty() {
		return Ok(Snapshot::new());
	}

	serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
		message: format!("Failed to parse {}: {e}", path.display()),
	})
}

fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
	if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
		fs::create_dir_all(parent).map_err(|e| backend("create directory", parent, e))?;
	}

	Ok(())
}

fn backend(action: &str, path: &Path, err: std::io::Error) -> StoreError {
	StoreError::Backend { message: format!("Failed to {action} {}: {err}", path.display()) }
}
