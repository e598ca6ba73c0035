use anyhow::Result;
use redis::{AsyncCommands, Client};

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Current value of a window counter, zero when unset.
    pub async fn counter(&self, key: &str) -> Result<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: Option<u32> = conn.get(key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increments a window counter, arming its expiry on first use.
    pub async fn bump_counter(&self, key: &str, ttl_seconds: u64) -> Result<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let count: u32 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(key, ttl_seconds as i64).await?;
        }
        Ok(count)
    }
}
