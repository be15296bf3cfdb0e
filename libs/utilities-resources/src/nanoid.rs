//! `utilities_nanoid`: a random id generated once and kept in state.

use crate::resource::{Applied, Keepers, Resource, ResourceResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use utilities_http::{Diagnostic, DiagnosticKind, Diagnostics};

/// URL-safe alphabet used when none is configured.
pub const DEFAULT_ID_ALPHABET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz-";
pub const DEFAULT_ID_LENGTH: i64 = 21;
pub const MAX_ALPHABET_LENGTH: usize = 255;
pub const MAX_ID_LENGTH: i64 = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NanoidConfig {
    #[serde(default)]
    pub alphabet: Option<String>,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub keepers: Option<Keepers>,
}

impl NanoidConfig {
    #[must_use]
    pub fn alphabet(&self) -> &str {
        self.alphabet.as_deref().unwrap_or(DEFAULT_ID_ALPHABET)
    }

    #[must_use]
    pub fn length(&self) -> i64 {
        self.length.unwrap_or(DEFAULT_ID_LENGTH)
    }

    /// Check the alphabet and length bounds, collecting every violation.
    ///
    /// # Errors
    /// One `InvalidConfiguration` diagnostic per out-of-range attribute.
    pub fn validate(&self) -> Result<(), Diagnostics> {
        let mut diags = Diagnostics::new();

        let alphabet_len = self.alphabet().chars().count();
        if !(1..=MAX_ALPHABET_LENGTH).contains(&alphabet_len) {
            diags.add_error(
                DiagnosticKind::InvalidConfiguration,
                "Invalid Attribute Value Length",
                format!(
                    "Attribute alphabet string length must be between 1 and {MAX_ALPHABET_LENGTH}, got: {alphabet_len}"
                ),
            );
        }

        let length = self.length();
        if !(1..=MAX_ID_LENGTH).contains(&length) {
            diags.add_error(
                DiagnosticKind::InvalidConfiguration,
                "Invalid Attribute Value",
                format!("Attribute length value must be between 1 and {MAX_ID_LENGTH}, got: {length}"),
            );
        }

        if diags.is_empty() { Ok(()) } else { Err(diags) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanoidState {
    pub id: String,
    pub alphabet: String,
    pub length: i64,
    #[serde(default)]
    pub keepers: Option<Keepers>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("alphabet must contain between 1 and {MAX_ALPHABET_LENGTH} characters, got {0}")]
    Alphabet(usize),

    #[error("length must be between 1 and {MAX_ID_LENGTH}, got {0}")]
    Length(i64),
}

impl From<IdError> for Diagnostic {
    fn from(err: IdError) -> Self {
        Diagnostic::error(
            DiagnosticKind::IdGenerationError,
            "Failed to generate id",
            format!("Failed to generate id: {err}."),
        )
    }
}

/// Generate an id of `length` characters drawn uniformly from `alphabet`.
///
/// # Errors
/// `IdError` when the alphabet or length is out of range.
pub fn generate(alphabet: &str, length: i64) -> Result<String, IdError> {
    let chars: Vec<char> = alphabet.chars().collect();
    if !(1..=MAX_ALPHABET_LENGTH).contains(&chars.len()) {
        return Err(IdError::Alphabet(chars.len()));
    }
    if !(1..=MAX_ID_LENGTH).contains(&length) {
        return Err(IdError::Length(length));
    }
    let size = usize::try_from(length).map_err(|_| IdError::Length(length))?;

    // nanoid's mask-and-reject sampling. `nanoid::format` stops on the id's
    // byte length, which an odd length over a two-byte alphabet never hits,
    // so characters are counted here instead.
    let mask = chars.len().next_power_of_two() - 1;
    let step = size * 2;
    let mut id = String::with_capacity(size);
    let mut produced = 0;
    loop {
        for byte in ::nanoid::rngs::default(step) {
            if let Some(&c) = chars.get(usize::from(byte) & mask) {
                id.push(c);
                produced += 1;
                if produced == size {
                    return Ok(id);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NanoidResource;

#[async_trait]
impl Resource for NanoidResource {
    const TYPE_NAME: &'static str = "utilities_nanoid";

    type Config = NanoidConfig;
    type State = NanoidState;

    async fn create(
        &self,
        config: NanoidConfig,
        _cancel: &CancellationToken,
    ) -> ResourceResult<NanoidState> {
        config.validate()?;

        let alphabet = config.alphabet().to_owned();
        let length = config.length();
        let id = generate(&alphabet, length).map_err(Diagnostic::from)?;
        tracing::debug!(length, "generated nanoid");

        Ok(Applied::new(NanoidState {
            id,
            alphabet,
            length,
            keepers: config.keepers,
        }))
    }

    async fn import(&self, id: &str) -> ResourceResult<NanoidState> {
        let length = i64::try_from(id.len()).unwrap_or(i64::MAX);
        if length > MAX_ID_LENGTH {
            return Err(Diagnostic::error(
                DiagnosticKind::ImportError,
                "Invalid id",
                format!("The id must be at most {MAX_ID_LENGTH} characters long."),
            )
            .into());
        }

        Ok(Applied::new(NanoidState {
            id: id.to_owned(),
            alphabet: DEFAULT_ID_ALPHABET.to_owned(),
            length,
            keepers: None,
        }))
    }
}
