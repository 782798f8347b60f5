use std::{error::Error, fmt, str::FromStr};

use uuid::Uuid;

use super::{Position, FIELD_SEPARATOR};

/// Number of `|` separated fields in a transfer request
const REQUEST_FIELDS: usize = 5;

/// Request published by a backend shard asking the proxy to move a player
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub(crate) player_id: Uuid,
    pub(crate) shard: String,
    pub(crate) position: Position,
}

impl TransferRequest {
    /// Decodes `<uuid>|<shard>|<x>|<y>|<z>`
    ///
    /// Only checks the shape of the message, whether the player or the shard
    /// actually exist is up to the coordinator.
    ///
    /// Every separator counts, so a trailing `|` makes a sixth, empty field
    /// and the message is rejected. Senders that split with trailing empties
    /// dropped would accept that same text.
    pub fn parse(raw: &str) -> Result<TransferRequest, ParseError> {
        let fields: Vec<&str> = raw.split(FIELD_SEPARATOR).collect();
        if fields.len() != REQUEST_FIELDS {
            return Err(ParseError::MalformedMessage(raw.to_string()));
        }

        let player_id = Uuid::parse_str(fields[0].trim())
            .map_err(|_| ParseError::InvalidIdentifier(fields[0].to_string()))?;

        let x = parse_coordinate(fields[2])?;
        let y = parse_coordinate(fields[3])?;
        let z = parse_coordinate(fields[4])?;

        Ok(TransferRequest {
            player_id,
            shard: fields[1].to_string(),
            position: Position::new(x, y, z),
        })
    }

    #[inline]
    pub fn player_id(&self) -> &Uuid {
        &self.player_id
    }

    #[inline]
    pub fn shard(&self) -> &str {
        &self.shard
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.position
    }
}

impl FromStr for TransferRequest {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferRequest::parse(s)
    }
}

/// Finite values only, `inf` and `NaN` are rejected
fn parse_coordinate(field: &str) -> Result<f64, ParseError> {
    field
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ParseError::InvalidCoordinate(field.to_string()))
}

/// Why an inbound payload was rejected. Each variant keeps the offending text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MalformedMessage(String),
    InvalidIdentifier(String),
    InvalidCoordinate(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::MalformedMessage(raw) => {
                write!(f, "invalid transfer request format: {}", raw)
            }
            ParseError::InvalidIdentifier(id) => {
                write!(f, "invalid player uuid in transfer request: {}", id)
            }
            ParseError::InvalidCoordinate(value) => {
                write!(f, "invalid coordinate in transfer request: {}", value)
            }
        }
    }
}

impl Error for ParseError {}
