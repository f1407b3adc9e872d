//! Thin wrapper over the redis client.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::error::Result;
use crate::tracing::prelude::*;

#[derive(Clone)]
pub struct Bus {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl Bus {
    /// Connect and verify the server answers. Start-up treats failure as
    /// fatal; afterwards individual operations fail soft.
    pub async fn connect(addr: &str) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{addr}"))?;
        let mut conn = client.get_multiplexed_async_connection().await?;

        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        info!(addr, "connected to bus");

        Ok(Self { client, conn })
    }

    /// A connection of its own, for callers that issue blocking pops.
    pub async fn dedicated(&self) -> Result<Bus> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(Bus {
            client: self.client.clone(),
            conn,
        })
    }

    /// Set a hash field and notify watchers of the changed field name.
    pub async fn hash_set(&self, hash: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(hash, field, value).await?;
        conn.publish::<_, _, ()>(hash, field).await?;
        Ok(())
    }

    pub async fn hash_get(&self, hash: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hget(hash, field).await?)
    }

    pub async fn queue_push(&self, queue: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, value).await?;
        Ok(())
    }

    /// Blocking pop with a timeout; `None` when the queue stayed empty.
    /// Use on a [`dedicated`](Self::dedicated) connection only, since the
    /// pop parks the connection for up to `timeout_secs`.
    pub async fn queue_pop(&self, queue: &str, timeout_secs: u64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;
        Ok(popped.map(|(_, value)| value))
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    pub async fn pubsub(&self) -> Result<redis::aio::PubSub> {
        Ok(self.client.get_async_pubsub().await?)
    }
}
