//! The production [`StatsStore`] implementation, backed by Redis via `fred`.



//		Packages

use async_trait::async_trait;
use fred::{
	clients::Pool,
	interfaces::{HashesInterface, KeysInterface, ListInterface, SortedSetsInterface},
	prelude::ClientLike as _,
	types::{Expiration, SetOptions},
};
use std::collections::HashMap;

use super::{StatsStore, StoreError};
use crate::config::DbConfig;



//		Structs

//		RedisStore
/// A [`StatsStore`] backed by a pooled Redis connection.
#[derive(Clone, Debug)]
pub struct RedisStore {
	/// The connection pool, shared across all request-handling tasks.
	pool: Pool,
}

impl RedisStore {
	//		connect
	/// Builds the connection URL from `db.redis`, establishes a pool sized
	/// by `db.redis.pool_size`, and waits for the initial connections.
	///
	/// # Errors
	///
	/// Returns [`StoreError::Unavailable`] if the pool cannot be built or the
	/// initial connection fails.
	pub async fn connect(config: &DbConfig) -> Result<Self, StoreError> {
		let redis = &config.redis;
		let url   = match &redis.password {
			Some(password) => format!("redis://:{password}@{}:{}", redis.host, redis.port),
			None            => format!("redis://{}:{}", redis.host, redis.port),
		};
		let fred_config = fred::types::config::Config::from_url(&url)
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		let pool = Pool::new(fred_config, None, None, None, redis.pool_size.max(1))
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		pool.connect();
		pool.wait_for_connect().await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(Self { pool })
	}
}

#[async_trait]
impl StatsStore for RedisStore {
	async fn ping(&self) -> Result<(), StoreError> {
		let _: String = self.pool.ping(None).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
		self.pool.get(key).await.map_err(|e| StoreError::Unavailable(e.to_string()))
	}

	async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> Result<(), StoreError> {
		let expire = ttl.map(|secs| Expiration::EX(i64::try_from(secs).unwrap_or(i64::MAX)));
		let _: () = self.pool
			.set(key, value, expire, Some(SetOptions::NX), false)
			.await
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		let count: i64 = self.pool.exists(key).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(count > 0)
	}

	async fn rpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let _: i64 = self.pool.rpush(key, value).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
		let secs: i64 = self.pool.ttl(key).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(u64::try_from(secs).ok())
	}

	async fn expire(&self, key: &str, seconds: u64) -> Result<(), StoreError> {
		let _: bool = self.pool
			.expire(key, i64::try_from(seconds).unwrap_or(i64::MAX), None)
			.await
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn hexists(&self, key: &str, field: &str) -> Result<bool, StoreError> {
		self.pool.hexists(key, field).await.map_err(|e| StoreError::Unavailable(e.to_string()))
	}

	async fn hset(&self, key: &str, fields: &HashMap<String, String>) -> Result<(), StoreError> {
		let _: () = self.pool.hset(key, fields.clone()).await.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
		self.pool.hgetall(key).await.map_err(|e| StoreError::Unavailable(e.to_string()))
	}

	async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
		self.pool.hincrby(key, field, delta).await.map_err(|e| StoreError::Unavailable(e.to_string()))
	}

	async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
		self.pool.zscore(key, member).await.map_err(|e| StoreError::Unavailable(e.to_string()))
	}

	async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
		let _: () = self.pool
			.zadd(key, None, None, false, false, (score, member))
			.await
			.map_err(|e| StoreError::Unavailable(e.to_string()))?;
		Ok(())
	}

	async fn zrange_withscores_desc(&self, key: &str) -> Result<Vec<(String, f64)>, StoreError> {
		self.pool
			.zrange(key, 0_i64, -1_i64, None, true, None, true)
			.await
			.map_err(|e| StoreError::Unavailable(e.to_string()))
	}
}
