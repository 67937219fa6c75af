use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;

use crate::store::{CreateError, Record, SaveError, SessionStore};
use crate::SessionKey;

/// A [`SessionStore`] that keeps everything in memory.
///
/// Clones share the same records. Nothing survives a restart, and nothing is shared between
/// processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore
{
	records: Arc<Mutex<HashMap<SessionKey, Record>>>,
}

impl MemoryStore
{
	/// Creates an empty store.
	pub fn new() -> Self
	{
		Self::default()
	}

	/// Returns a copy of the record stored under `key`, expired or not.
	pub fn get(&self, key: &SessionKey) -> Option<Record>
	{
		self.records().get(key).cloned()
	}

	/// The number of stored records, expired or not.
	pub fn len(&self) -> usize
	{
		self.records().len()
	}

	/// Whether the store holds no records.
	pub fn is_empty(&self) -> bool
	{
		self.records().is_empty()
	}

	/// Drops all expired records.
	pub fn purge_expired(&self)
	{
		let now = OffsetDateTime::now_utc();
		self.records().retain(|_, record| !record.is_expired(now));
	}

	fn records(&self) -> MutexGuard<'_, HashMap<SessionKey, Record>>
	{
		self.records.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl SessionStore for MemoryStore
{
	type Error = Infallible;

	async fn load(&mut self, key: &SessionKey) -> Result<Option<Record>, Self::Error>
	{
		let now = OffsetDateTime::now_utc();
		let mut records = self.records();

		if records.get(key).is_some_and(|record| record.is_expired(now)) {
			records.remove(key);
			return Ok(None);
		}

		Ok(records.get(key).cloned())
	}

	async fn create(&mut self, record: &Record) -> Result<(), CreateError<Self::Error>>
	{
		match self.records().entry(record.key.clone()) {
			Entry::Occupied(_) => Err(CreateError::Collision),
			Entry::Vacant(entry) => {
				entry.insert(record.clone());
				Ok(())
			},
		}
	}

	async fn save(&mut self, record: &Record) -> Result<(), SaveError<Self::Error>>
	{
		match self.records().get_mut(&record.key) {
			None => Err(SaveError::Deleted),
			Some(stored) => {
				stored.clone_from(record);
				Ok(())
			},
		}
	}

	async fn delete(&mut self, key: &SessionKey) -> Result<(), Self::Error>
	{
		self.records().remove(key);
		Ok(())
	}
}
