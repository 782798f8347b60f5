use std::fmt;

use uuid::Uuid;

use super::{request::TransferRequest, WireDouble, FIELD_SEPARATOR};

/// Asks the destination shard to load the area around `x`/`z` before the
/// player is moved there. Height does not matter for chunk loading.
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadCommand {
    pub(crate) player_id: Uuid,
    pub(crate) shard: String,
    pub(crate) x: f64,
    pub(crate) z: f64,
}

impl PreloadCommand {
    pub fn new(player_id: Uuid, shard: String, x: f64, z: f64) -> Self {
        PreloadCommand {
            player_id,
            shard,
            x,
            z,
        }
    }
}

impl From<&TransferRequest> for PreloadCommand {
    fn from(request: &TransferRequest) -> Self {
        PreloadCommand::new(
            request.player_id,
            request.shard.clone(),
            request.position.x,
            request.position.z,
        )
    }
}

/// Wire form: `<uuid>|<shard>|<x>|<z>`
impl fmt::Display for PreloadCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{id}{sep}{shard}{sep}{x}{sep}{z}",
            id = self.player_id.to_hyphenated(),
            shard = self.shard,
            x = WireDouble(self.x),
            z = WireDouble(self.z),
            sep = FIELD_SEPARATOR,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_height_from_request() {
        let request =
            TransferRequest::parse("11111111-1111-1111-1111-111111111111|alpha|10.0|64.0|-3.0")
                .unwrap();

        assert_eq!(
            PreloadCommand::from(&request).to_string(),
            "11111111-1111-1111-1111-111111111111|alpha|10.0|-3.0"
        );
    }

    #[test]
    fn identifier_is_lowercase_hyphenated() {
        let request =
            TransferRequest::parse("AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE|beta|1|2|3.5").unwrap();

        assert_eq!(
            PreloadCommand::from(&request).to_string(),
            "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee|beta|1.0|3.5"
        );
    }
}
