use r2d2::Pool;
use redis::Commands;

use super::{error::BusError, redis_pool::RedisConnectionManager};

pub mod communication;
pub mod subscriber;

/// Publishing side of the message bus shared with the backend shards
///
/// Delivery is at-most-once, a failed publish is reported and never retried.
pub trait Bus: Send + Sync {
    fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;
}

/// Publishes over pooled redis connections
pub struct RedisBus {
    redis_pool: Pool<RedisConnectionManager>,
}

impl RedisBus {
    pub fn new(redis_pool: Pool<RedisConnectionManager>) -> Self {
        RedisBus { redis_pool }
    }
}

impl Bus for RedisBus {
    fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        // fetch redis connection from redis pool
        let mut conn = self.redis_pool.get()?;
        let _: () = conn.publish(channel, payload)?;
        trace!("Published to {}: {}", channel, payload);
        Ok(())
    }
}
