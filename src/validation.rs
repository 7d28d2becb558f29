use crate::config::SearchConfig;
use crate::error::{FlockError, Result};
use crate::models::SearchOptions;

const MAX_CONVERSATION_ID_LEN: usize = 256;
const MAX_TERM_LEN: usize = 1000;

/// Validation utilities for caller input at the binary and service edge
///
/// The index and matcher themselves accept anything; these checks reject
/// obviously bad requests before they reach them.
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a requested result limit against configuration
    pub fn validate_limit(limit: usize, config: &SearchConfig) -> Result<()> {
        if limit == 0 {
            return Err(FlockError::InvalidInput(
                "Limit must be greater than 0".to_string(),
            ));
        }

        if limit > config.max_limit {
            return Err(FlockError::InvalidInput(format!(
                "Limit too large (max {})",
                config.max_limit
            )));
        }

        Ok(())
    }

    /// Validate a conversation id used for scoping
    pub fn validate_conversation_id(conversation_id: &str) -> Result<()> {
        if conversation_id.trim().is_empty() {
            return Err(FlockError::InvalidInput(
                "Conversation id cannot be empty".to_string(),
            ));
        }

        if conversation_id.len() > MAX_CONVERSATION_ID_LEN {
            return Err(FlockError::InvalidInput(format!(
                "Conversation id too long (max {MAX_CONVERSATION_ID_LEN} characters)"
            )));
        }

        if conversation_id.chars().any(char::is_control) {
            return Err(FlockError::InvalidInput(
                "Conversation id contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a search term's length; blank terms are allowed
    pub fn validate_term(term: &str) -> Result<()> {
        if term.chars().count() > MAX_TERM_LEN {
            return Err(FlockError::InvalidInput(format!(
                "Search term too long (max {MAX_TERM_LEN} characters)"
            )));
        }

        Ok(())
    }

    /// Validate complete search options
    pub fn validate_search_options(options: &SearchOptions, config: &SearchConfig) -> Result<()> {
        if let Some(limit) = options.limit {
            Self::validate_limit(limit, config)?;
        }
        if let Some(conversation_id) = &options.conversation_id {
            Self::validate_conversation_id(conversation_id)?;
        }
        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
