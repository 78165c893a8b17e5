//! Error types
//!
//! Deploy and room errors are recoverable and reported to a single client.
//! Their `Display` text is the message that client sees.

use thiserror::Error;

/// Why a card deployment was rejected. A rejected deploy never mutates state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    #[error("Unknown card")]
    UnknownCard(String),
    #[error("Card not in hand")]
    NotInHand(String),
    #[error("Not enough elixir")]
    NotEnoughElixir,
    #[error("Invalid deploy position")]
    InvalidPosition,
}

/// Room membership and connection-state errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("Room is full")]
    RoomFull,
    #[error("Not in a game")]
    NotInGame,
    #[error("Not in a room")]
    NotInRoom,
    #[error("Unknown player number {0}")]
    UnknownPlayer(u8),
    #[error("Room closed")]
    Closed,
    #[error(transparent)]
    Deploy(#[from] DeployError),
}

/// Configuration and card data loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
    #[error("invalid card `{card}`: {reason}")]
    InvalidCard {
        card: String,
        reason: String,
    },
    #[error("invalid deck: {0}")]
    InvalidDeck(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn card(card: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCard {
            card: card.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_messages_match_client_text() {
        assert_eq!(
            DeployError::NotEnoughElixir.to_string(),
            "Not enough elixir"
        );
        assert_eq!(
            DeployError::InvalidPosition.to_string(),
            "Invalid deploy position"
        );
        assert_eq!(
            DeployError::NotInHand("knight".into()).to_string(),
            "Card not in hand"
        );
    }

    #[test]
    fn room_error_wraps_deploy_transparently() {
        let err: RoomError = DeployError::NotEnoughElixir.into();
        assert_eq!(err.to_string(), "Not enough elixir");
        assert_eq!(RoomError::NotInGame.to_string(), "Not in a game");
    }
}
