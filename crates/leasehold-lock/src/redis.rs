//! Redis lease store.
//!
//! Conditional set maps to `SET key value NX PX ttl`. Compare-and-delete runs
//! as a Lua script so the ownership check and the `DEL` happen in one step on
//! the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::info;

use crate::{CompareAndDelete, LeaseStore, StoreError};

/// Deletes KEYS[1] if it holds ARGV[1]; always returns the value seen.
const COMPARE_AND_DELETE: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    redis.call('DEL', KEYS[1])
end
return current
"#;

/// Redis connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub database: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: String::new(),
            database: 0,
        }
    }
}

impl RedisConfig {
    /// Connection details for the client.
    ///
    /// The password travels as its own field, never inside a URL, so any
    /// character is allowed in it.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.database,
                password: (!self.password.is_empty()).then(|| self.password.clone()),
                ..Default::default()
            },
        }
    }
}

/// Lease store backed by a shared multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisLeaseStore {
    conn: MultiplexedConnection,
    compare_and_delete: redis::Script,
}

impl RedisLeaseStore {
    /// Connect to Redis.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.connection_info())?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(host = %config.host, port = config.port, db = config.database, "connected to Redis");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
        }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(key).await?;
        Ok(removed)
    }

    async fn delete_if_equals(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<CompareAndDelete, StoreError> {
        let mut conn = self.conn.clone();
        let current: Option<String> = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(match current {
            None => CompareAndDelete::Absent,
            Some(current) if current == expected => CompareAndDelete::Deleted,
            Some(current) => CompareAndDelete::Mismatch { current },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_connection_info() {
        let info = RedisConfig::default().connection_info();
        assert_eq!(info.addr, ConnectionAddr::Tcp("127.0.0.1".to_string(), 6379));
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.password, None);
    }

    #[test]
    fn test_password_with_url_delimiters_is_kept_verbatim() {
        let config = RedisConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            password: "p@ss/w#rd:1".to_string(),
            database: 3,
        };

        let info = config.connection_info();
        assert_eq!(
            info.addr,
            ConnectionAddr::Tcp("cache.internal".to_string(), 6380)
        );
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w#rd:1"));

        // The client accepts it without parsing a URL
        assert!(redis::Client::open(info).is_ok());
    }
}
