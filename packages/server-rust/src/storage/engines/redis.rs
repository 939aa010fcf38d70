//! Redis-backed [`CacheEngine`], enabled with the `redis` feature.
//!
//! Each trait method maps to a single Redis command (or one atomic
//! pipeline/script), so the per-key atomicity of the trait carries over.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use tracing::info;

use crate::storage::engine::{CacheEngine, CacheError};
use crate::storage::record::Bitmap;

const SET_BIT_IF_PRESENT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.call('SETBIT', KEYS[1], ARGV[1], ARGV[2])
end
return -1
";

/// Cache engine talking to a Redis server through a reconnecting
/// [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    set_bit_if_present: Script,
}

impl RedisCache {
    /// Connects to `url` (for example `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the URL is invalid or the
    /// initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        info!(url, "connected to redis");
        Ok(Self {
            conn,
            set_bit_if_present: Script::new(SET_BIT_IF_PRESENT),
        })
    }
}

fn map_err(key: &str, err: &RedisError) -> CacheError {
    if err.code() == Some("WRONGTYPE") {
        return CacheError::WrongType {
            key: key.to_string(),
        };
    }
    if err.kind() == redis::ErrorKind::TypeError {
        return CacheError::Corrupt {
            key: key.to_string(),
            reason: err.to_string(),
        };
    }
    CacheError::Unavailable(err.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
    // Redis rejects PX 0; a zero TTL is stored for one millisecond.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl CacheEngine for RedisCache {
    async fn get_text(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| map_err(key, &e))
    }

    async fn set_text(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(|e| map_err(key, &e))?;
        Ok(())
    }

    async fn get_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| map_err(key, &e))
    }

    async fn set_int_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| map_err(key, &e))?;
        Ok(reply.is_some())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        conn.incr(key, delta).await.map_err(|e| map_err(key, &e))
    }

    async fn take_int(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err(key, &e))?;
        // GETDEL has already removed the key, so a bad value is reported
        // but not restored.
        value
            .map(|v| {
                v.trim().parse().map_err(|_| CacheError::Corrupt {
                    key: key.to_string(),
                    reason: format!("not an integer: {v:?}"),
                })
            })
            .transpose()
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(|e| map_err(key, &e))
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| map_err(key, &e))?;
        Ok(removed > 0)
    }

    async fn get_bit(&self, key: &str, offset: u32) -> Result<Option<bool>, CacheError> {
        let mut conn = self.conn.clone();
        let (exists, bit): (bool, bool) = redis::pipe()
            .atomic()
            .exists(key)
            .getbit(key, offset as usize)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err(key, &e))?;
        Ok(exists.then_some(bit))
    }

    async fn set_bit(&self, key: &str, offset: u32, on: bool) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        conn.setbit(key, offset as usize, on)
            .await
            .map_err(|e| map_err(key, &e))
    }

    async fn set_bit_if_present(
        &self,
        key: &str,
        offset: u32,
        on: bool,
    ) -> Result<Option<bool>, CacheError> {
        let mut conn = self.conn.clone();
        let previous: i64 = self
            .set_bit_if_present
            .key(key)
            .arg(offset)
            .arg(i32::from(on))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_err(key, &e))?;
        Ok((previous >= 0).then_some(previous == 1))
    }

    async fn put_bitmap(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(bitmap.as_bytes());
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(|e| map_err(key, &e))?;
        Ok(())
    }

    async fn put_bitmap_if_absent(
        &self,
        key: &str,
        bitmap: &Bitmap,
        ttl: Option<Duration>,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(bitmap.as_bytes()).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| map_err(key, &e))?;
        Ok(reply.is_some())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("", &e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_rounds_up_to_one_millisecond() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(3)), 3_000);
    }
}
