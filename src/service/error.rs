use std::{
    error::Error,
    fmt::{Display, Formatter},
};

use log::Level;
use uuid::Uuid;

use super::sharding::communication::request::ParseError;

/// Failure on the message bus (publish, subscribe or pool checkout)
#[derive(Debug)]
pub enum BusError {
    Redis(redis::RedisError),
    Pool(r2d2::Error),
}

impl Display for BusError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            BusError::Redis(e) => write!(f, "redis error: {}", e),
            BusError::Pool(e) => write!(f, "redis pool error: {}", e),
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BusError::Redis(e) => Some(e),
            BusError::Pool(e) => Some(e),
        }
    }
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Redis(e)
    }
}

impl From<r2d2::Error> for BusError {
    fn from(e: r2d2::Error) -> Self {
        BusError::Pool(e)
    }
}

/// Every way a single transfer can fail to happen.
///
/// None of these are fatal to the process, the worst outcome is that one
/// handoff is not seamless (or does not happen at all).
#[derive(Debug)]
pub enum TransferError {
    Parse(ParseError),
    UnknownPlayer(Uuid),
    UnknownShard(String),
    TransferInterrupted(Uuid),
    Transport(BusError),
    ShuttingDown,
}

impl TransferError {
    /// Log level this error should be reported at
    pub fn level(&self) -> Level {
        match self {
            TransferError::Parse(_) => Level::Warn,
            TransferError::UnknownPlayer(_) => Level::Warn,
            TransferError::UnknownShard(_) => Level::Error,
            TransferError::TransferInterrupted(_) => Level::Warn,
            TransferError::Transport(_) => Level::Error,
            TransferError::ShuttingDown => Level::Debug,
        }
    }
}

impl Display for TransferError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            TransferError::Parse(e) => write!(f, "{}", e),
            TransferError::UnknownPlayer(id) => write!(f, "player {} not found on proxy", id),
            TransferError::UnknownShard(name) => write!(
                f,
                "target server '{}' is not registered on the proxy, check the server list",
                name
            ),
            TransferError::TransferInterrupted(id) => {
                write!(f, "player {} disconnected before transfer completed", id)
            }
            TransferError::Transport(e) => write!(f, "transport failure: {}", e),
            TransferError::ShuttingDown => write!(f, "coordinator is shutting down"),
        }
    }
}

impl Error for TransferError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransferError::Parse(e) => Some(e),
            TransferError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for TransferError {
    fn from(e: ParseError) -> Self {
        TransferError::Parse(e)
    }
}

impl From<BusError> for TransferError {
    fn from(e: BusError) -> Self {
        TransferError::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_severity() {
        let malformed = TransferError::from(ParseError::MalformedMessage("a|b".into()));
        assert_eq!(malformed.level(), Level::Warn);
        assert_eq!(
            TransferError::UnknownShard("ghost".into()).level(),
            Level::Error
        );
        assert_eq!(
            TransferError::TransferInterrupted(Uuid::nil()).level(),
            Level::Warn
        );
    }

    #[test]
    fn unknown_shard_names_the_server() {
        let err = TransferError::UnknownShard("ghost".into());
        assert!(err.to_string().contains("'ghost'"));
    }
}
