//! An in-process [`StatsStore`](super::StatsStore) implementation.
//!
//! Used by tests and as the backing store when no Redis connection is
//! configured — e.g. `safe_mode` dry runs. It is not a mock: it is a second,
//! real implementation of the same trait.



//		Packages

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
	collections::{BTreeMap, HashMap},
	time::{Duration, Instant},
};

use super::{StatsStore, StoreError};



//		Structs

//		Expiring
/// A stored value paired with an optional expiry instant.
#[derive(Clone, Debug)]
struct Expiring<T> {
	/// The stored value.
	value:   T,

	/// When the value should be considered expired, if a TTL was set.
	expires: Option<Instant>,
}

impl<T> Expiring<T> {
	/// Wraps a value with no expiry.
	const fn fresh(value: T) -> Self {
		Self { value, expires: None }
	}

	/// Whether the value has passed its expiry, if any.
	fn is_expired(&self) -> bool {
		self.expires.is_some_and(|at| Instant::now() >= at)
	}
}

//		MemoryStore
/// An in-memory [`StatsStore`], backed by [`parking_lot::Mutex`]-guarded
/// maps — one per OpenTSDB Redis data type this proxy uses.
#[derive(Debug, Default)]
pub struct MemoryStore {
	/// String values (`id + "_query"`).
	strings: Mutex<HashMap<String, Expiring<String>>>,

	/// List values (`id + "_stats"`).
	lists:   Mutex<HashMap<String, Expiring<Vec<String>>>>,

	/// Hash values (interval-stats buckets).
	hashes:  Mutex<HashMap<String, Expiring<HashMap<String, String>>>>,

	/// Sorted-set values (leaderboards), keyed by member with a score.
	zsets:   Mutex<HashMap<String, Expiring<BTreeMap<String, f64>>>>,
}

impl MemoryStore {
	//		new
	/// Creates an empty store.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StatsStore for MemoryStore {
	async fn ping(&self) -> Result<(), StoreError> {
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		let mut guard = self.strings.lock();
		prune(&mut guard, key);
		Ok(guard.get(key).map(|entry| entry.value.clone()))
	}

	async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError> {
		let mut guard = self.strings.lock();
		prune(&mut guard, key);
		if !guard.contains_key(key) {
			let _ = guard.insert(key.to_owned(), Expiring { value: value.to_owned(), expires: ttl.map(expiry_from) });
		}
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		let mut strings = self.strings.lock();
		prune(&mut strings, key);
		if strings.contains_key(key) {
			return Ok(true);
		}
		drop(strings);
		let mut lists = self.lists.lock();
		prune(&mut lists, key);
		if lists.contains_key(key) {
			return Ok(true);
		}
		drop(lists);
		let mut hashes = self.hashes.lock();
		prune(&mut hashes, key);
		if hashes.contains_key(key) {
			return Ok(true);
		}
		drop(hashes);
		let mut zsets = self.zsets.lock();
		prune(&mut zsets, key);
		Ok(zsets.contains_key(key))
	}

	async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut guard = self.lists.lock();
		prune(&mut guard, key);
		guard.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(Vec::new())).value.push(value.to_owned());
		Ok(())
	}

	async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
		for remaining in [
			self.strings.lock().get(key).and_then(|e| e.expires),
			self.lists.lock().get(key).and_then(|e| e.expires),
			self.hashes.lock().get(key).and_then(|e| e.expires),
			self.zsets.lock().get(key).and_then(|e| e.expires),
		] {
			if let Some(at) = remaining {
				return Ok(Some(at.saturating_duration_since(Instant::now()).as_secs()));
			}
		}
		Ok(None)
	}

	async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
		let at = expiry_from(seconds);
		if let Some(entry) = self.strings.lock().get_mut(key) {
			entry.expires = Some(at);
		}
		if let Some(entry) = self.lists.lock().get_mut(key) {
			entry.expires = Some(at);
		}
		if let Some(entry) = self.hashes.lock().get_mut(key) {
			entry.expires = Some(at);
		}
		if let Some(entry) = self.zsets.lock().get_mut(key) {
			entry.expires = Some(at);
		}
		Ok(())
	}

	async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
		let mut guard = self.hashes.lock();
		prune(&mut guard, key);
		Ok(guard.get(key).is_some_and(|entry| entry.value.contains_key(field)))
	}

	async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), StoreError> {
		let mut guard = self.hashes.lock();
		prune(&mut guard, key);
		let entry = guard.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(HashMap::new()));
		for (field, value) in fields {
			let _ = entry.value.insert(field.clone(), value.clone());
		}
		Ok(())
	}

	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
		let mut guard = self.hashes.lock();
		prune(&mut guard, key);
		Ok(guard.get(key).map(|entry| entry.value.clone()).unwrap_or_default())
	}

	async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
		let mut guard   = self.hashes.lock();
		prune(&mut guard, key);
		let entry       = guard.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(HashMap::new()));
		let current: i64 = entry.value.get(field).and_then(|v| v.parse().ok()).unwrap_or(0);
		let updated     = current.saturating_add(delta);
		let _           = entry.value.insert(field.to_owned(), updated.to_string());
		Ok(updated)
	}

	async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
		let mut guard = self.zsets.lock();
		prune(&mut guard, key);
		Ok(guard.get(key).and_then(|entry| entry.value.get(member).copied()))
	}

	async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
		let mut guard = self.zsets.lock();
		prune(&mut guard, key);
		let entry = guard.entry(key.to_owned()).or_insert_with(|| Expiring::fresh(BTreeMap::new()));
		let _     = entry.value.insert(member.to_owned(), score);
		Ok(())
	}

	async fn zrange_withscores_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
		let mut guard = self.zsets.lock();
		prune(&mut guard, key);
		let mut members: Vec<(String, f64)> = guard
			.get(key)
			.map(|entry| entry.value.iter().map(|(member, score)| (member.clone(), *score)).collect())
			.unwrap_or_default();
		members.sort_by(|a, b| b.1.total_cmp(&a.1));
		Ok(members)
	}
}



//		Functions

//		expiry_from
/// Converts a TTL in seconds into an [`Instant`].
fn expiry_from(seconds: u64) -> Instant {
	Instant::now() + Duration::from_secs(seconds)
}

//		prune
/// Removes `key` from `map` if its entry has expired.
fn prune<T>(map: &mut HashMap<String, Expiring<T>>, key: &str) {
	if map.get(key).is_some_and(Expiring::is_expired) {
		let _ = map.remove(key);
	}
}



//		Tests

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn set_is_set_once() {
		let store = MemoryStore::new();
		store.set("k", "first", None).await.expect("set should succeed");
		store.set("k", "second", None).await.expect("set should succeed");
		assert_eq!(store.get("k").await.expect("get should succeed"), Some("first".to_owned()), "set must not overwrite an existing key");
	}

	#[tokio::test]
	async fn hincrby_accumulates() {
		let store = MemoryStore::new();
		let first  = store.hincrby("h", "total_counter", 1).await.expect("should succeed");
		let second = store.hincrby("h", "total_counter", 1).await.expect("should succeed");
		assert_eq!(first, 1);
		assert_eq!(second, 2);
	}

	#[tokio::test]
	async fn zadd_and_zrange_desc() {
		let store = MemoryStore::new();
		store.zadd("z", "a", 1.0).await.expect("should succeed");
		store.zadd("z", "b", 5.0).await.expect("should succeed");
		store.zadd("z", "c", 3.0).await.expect("should succeed");
		let ranked = store.zrange_withscores_desc("z").await.expect("should succeed");
		assert_eq!(ranked, vec![("b".to_owned(), 5.0), ("c".to_owned(), 3.0), ("a".to_owned(), 1.0)]);
	}

	#[tokio::test]
	async fn rpush_creates_and_appends() {
		let store = MemoryStore::new();
		store.rpush("l", "one").await.expect("should succeed");
		store.rpush("l", "two").await.expect("should succeed");
		assert!(store.exists("l").await.expect("should succeed"));
	}

	#[tokio::test]
	async fn expire_without_existing_key_is_a_no_op() {
		let store = MemoryStore::new();
		store.expire("missing", 10).await.expect("expiring an absent key should not error");
		assert!(!store.exists("missing").await.expect("should succeed"));
	}
}
