/*
    Connection manager adapted from the r2d2-redis crate on github
    r2d2-redis is licensed under MIT license
*/

use std::error;
use std::fmt;
use std::time::Duration;

use r2d2::Pool;
use redis::ConnectionLike;

/// Connections kept around for publishing, the bus only publishes one
/// message per accepted transfer so a handful is plenty
const POOL_SIZE: u32 = 4;

/// How long building the pool may wait for the first connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors returned while managing pooled redis connections
#[derive(Debug)]
pub enum Error {
    Other(redis::RedisError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Other(err) => write!(fmt, "{}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Other(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub struct RedisConnectionManager {
    connection_info: redis::ConnectionInfo,
}

impl RedisConnectionManager {
    /// Creates a new `RedisConnectionManager`.
    ///
    /// See `redis::Client::open` for a description of the parameter
    /// types.
    pub fn new<T: redis::IntoConnectionInfo>(
        params: T,
    ) -> Result<RedisConnectionManager, redis::RedisError> {
        Ok(RedisConnectionManager {
            connection_info: params.into_connection_info()?,
        })
    }
}

impl r2d2::ManageConnection for RedisConnectionManager {
    type Connection = redis::Connection;
    type Error = Error;

    fn connect(&self) -> Result<redis::Connection, Error> {
        let client = redis::Client::open(self.connection_info.clone()).map_err(Error::Other)?;
        client.get_connection().map_err(Error::Other)
    }

    fn is_valid(&self, conn: &mut redis::Connection) -> Result<(), Error> {
        redis::cmd("PING").query(conn).map_err(Error::Other)
    }

    fn has_broken(&self, conn: &mut redis::Connection) -> bool {
        !conn.is_open()
    }
}

/// Builds the publishing pool, failing if redis cannot be reached
pub fn connect(
    connection_info: redis::ConnectionInfo,
) -> Result<Pool<RedisConnectionManager>, Box<dyn std::error::Error>> {
    let manager = RedisConnectionManager::new(connection_info)?;
    let pool = Pool::builder()
        .max_size(POOL_SIZE)
        .connection_timeout(CONNECT_TIMEOUT)
        .build(manager)?;
    Ok(pool)
}
