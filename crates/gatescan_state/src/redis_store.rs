//! Redis store backend.
//!
//! Non-blocking commands ride a shared [`ConnectionManager`]; blocking
//! commands (BRPOP, BLMOVE) each get a dedicated connection so they can never
//! stall the shared pipeline.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::store::{StateStore, StoreError};

pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    async fn blocking_conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn push(&self, queue: &str, payload: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(queue, payload).await?;
        Ok(())
    }

    async fn pop(
        &self,
        queues: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, Vec<u8>)>, StoreError> {
        let mut conn = self.blocking_conn().await?;
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(queues)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(popped)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ex: Option<Duration>,
        nx: bool,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ex {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        if nx {
            cmd.arg("NX");
        }
        // With NX the reply is nil when the key already exists.
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.del(keys).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(set, member).await?;
        Ok(())
    }

    async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.srem(set, member).await?;
        Ok(())
    }

    async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(set).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl.as_secs().max(1) as i64).await?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.blocking_conn().await?;
        let moved: Option<Vec<u8>> = redis::cmd("BLMOVE")
            .arg(src)
            .arg(dst)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(moved)
    }
}
