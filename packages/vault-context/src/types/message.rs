//! Conversation messages handed to the generation source.

use serde::{Deserialize, Serialize};

use crate::types::{descriptor::StrategyDescriptor, excerpt::Substitution};

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Per-role bookkeeping carried alongside message content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageMetadata {
    #[default]
    None,

    /// Descriptors and guidance text of the source block the turn came from
    User {
        descriptors: Vec<StrategyDescriptor>,
        prompt: String,
    },

    /// Substitutions already applied to this assistant turn
    Assistant { substitutions: Vec<Substitution> },
}

/// One message of the reconstructed conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            metadata: MessageMetadata::None,
        }
    }

    pub fn user(
        content: impl Into<String>,
        descriptors: Vec<StrategyDescriptor>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: MessageMetadata::User {
                descriptors,
                prompt: prompt.into(),
            },
        }
    }

    pub fn assistant(content: impl Into<String>, substitutions: Vec<Substitution>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: MessageMetadata::Assistant { substitutions },
        }
    }
}
