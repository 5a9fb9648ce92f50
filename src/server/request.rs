//! Inbound poem request body.

use serde::Deserialize;

use crate::prompt::{AuthorProfile, PoemBrief};
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_NUM_LINES: u32 = 12;
pub const MAX_NUM_LINES: u32 = 64;
pub const DEFAULT_FRIENDLINESS: u32 = 50;

pub const MSG_RECIPIENT_REQUIRED: &str = "Naam ontvanger is verplicht";
pub const MSG_AGE_REQUIRED: &str = "Leeftijd schrijver is verplicht bij Humanize modus";
pub const MSG_AGE_NUMERIC: &str = "Leeftijd schrijver moet een getal zijn";
pub const MSG_GENDER_REQUIRED: &str = "Geslacht schrijver is verplicht bij Humanize modus";

/// Form fields arrive as strings or numbers depending on the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    fn is_blank(&self) -> bool {
        matches!(self, NumberOrText::Text(s) if s.trim().is_empty())
    }

    fn as_u32(&self) -> Option<u32> {
        let n = match self {
            NumberOrText::Number(n) => *n,
            NumberOrText::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (n.is_finite() && n >= 0.0).then(|| n.floor().min(u32::MAX as f64) as u32)
    }
}

/// JSON body of `POST /api/generate-poem`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoemRequest {
    pub recipient_name: Option<String>,
    pub recipient_facts: Option<String>,
    pub num_lines: Option<NumberOrText>,
    pub is_classic: Option<bool>,
    pub friendliness: Option<NumberOrText>,
    pub is_humanize: Option<bool>,
    pub author_age: Option<NumberOrText>,
    pub author_gender: Option<String>,
    pub poem_language: Option<String>,
}

impl PoemRequest {
    /// Language requested in a raw body, without validating anything else.
    pub fn peek_language(body: &[u8]) -> Option<String> {
        serde_json::from_slice::<PoemRequest>(body)
            .ok()?
            .poem_language
            .filter(|l| !l.trim().is_empty())
    }

    /// Validate and turn into a [`PoemBrief`]. Messages are user-facing.
    pub fn into_brief(self, default_language: &str) -> Result<PoemBrief> {
        let recipient_name = self
            .recipient_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid(MSG_RECIPIENT_REQUIRED, "recipientName"))?
            .to_string();

        let author = if self.is_humanize.unwrap_or(false) {
            let age = match &self.author_age {
                None => return Err(invalid(MSG_AGE_REQUIRED, "authorAge")),
                Some(a) if a.is_blank() => return Err(invalid(MSG_AGE_REQUIRED, "authorAge")),
                Some(a) => a
                    .as_u32()
                    .ok_or_else(|| invalid(MSG_AGE_NUMERIC, "authorAge"))?,
            };
            let gender = self
                .author_gender
                .as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .ok_or_else(|| invalid(MSG_GENDER_REQUIRED, "authorGender"))?;
            Some(AuthorProfile::new(age, gender))
        } else {
            None
        };

        let num_lines = self
            .num_lines
            .as_ref()
            .and_then(NumberOrText::as_u32)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_NUM_LINES)
            .min(MAX_NUM_LINES);

        let friendliness = self
            .friendliness
            .as_ref()
            .and_then(NumberOrText::as_u32)
            .unwrap_or(DEFAULT_FRIENDLINESS)
            .min(100);

        let language = self
            .poem_language
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| default_language.to_string());

        Ok(PoemBrief {
            recipient_name,
            recipient_facts: self.recipient_facts,
            num_lines,
            is_classic: self.is_classic.unwrap_or(true),
            friendliness,
            author,
            language,
        })
    }
}

fn invalid(message: &str, field: &str) -> Error {
    Error::validation_with_context(
        message,
        ErrorContext::new()
            .with_field_path(format!("request.{}", field))
            .with_source("poem_request"),
    )
}
