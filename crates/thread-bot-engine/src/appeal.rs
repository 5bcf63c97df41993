//! Ban appeal records, the source that supplies them, and response templates.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::ChannelId;

pub const FORMS_CREDENTIALS_INVALID_NOTICE: &str =
    ":x: Forms credentials are invalid, could not initiate appeal flow.";
pub const ACTIONED_PREFIX: &str = "Actioned";
pub const APPEAL_RESPONSE_SIGNATURE: &str = "\n\nKind regards,\nPython Discord Appeals Team.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealDetails {
    /// `username#discriminator` of the appealing user.
    pub appealer: String,
    pub uuid: String,
    pub email: String,
    pub reason: String,
    pub justification: String,
}

impl AppealDetails {
    pub fn thread_name(&self) -> String {
        format!("Ban appeal - {}", self.appealer)
    }
}

impl fmt::Display for AppealDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}\n\n**Their understanding of the ban reason:**\n> {}\n\n**Why they think they should be unbanned**:\n> {}",
            self.uuid, self.appealer, self.reason, self.justification
        )
    }
}

#[derive(Debug, Error)]
pub enum AppealFetchError {
    #[error("forms credentials rejected while fetching appeal {uuid}")]
    Forbidden { uuid: String },
    #[error("appeal response {uuid} does not exist")]
    NotFound { uuid: String },
    #[error("appeal request failed: {0}")]
    Transport(String),
    #[error("failed to decode appeal response: {0}")]
    Decode(String),
}

#[async_trait]
/// Supplies appeal details for a form response id.
pub trait AppealSource: Send + Sync {
    async fn fetch_appeal(&self, response_uuid: &str) -> Result<AppealDetails, AppealFetchError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error(":x: Could not find the response `{name}`.")]
pub struct UnknownAppealResponse {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Named response snippets, looked up case-insensitively.
pub struct AppealResponseCatalog {
    responses: BTreeMap<String, String>,
}

impl AppealResponseCatalog {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed = serde_json::from_str::<BTreeMap<String, String>>(raw)?;
        Ok(Self::from_entries(parsed))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        let responses = entries
            .into_iter()
            .map(|(name, snippet)| (name.to_lowercase(), snippet))
            .collect();
        Self { responses }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.responses.keys().map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Result<&str, UnknownAppealResponse> {
        let name = name.to_lowercase();
        match self.responses.get(&name) {
            Some(snippet) => Ok(snippet.as_str()),
            None => Err(UnknownAppealResponse { name }),
        }
    }

    /// Renders the email body for `appealer` using the named snippet.
    pub fn render(
        &self,
        response: &str,
        appealer: &str,
        extras: Option<&str>,
    ) -> Result<String, UnknownAppealResponse> {
        let snippet = self.lookup(response)?;
        Ok(render_appeal_response(appealer, snippet, extras))
    }
}

pub fn render_appeal_response(name: &str, snippet: &str, extras: Option<&str>) -> String {
    let extras = match extras.map(str::trim) {
        Some(extras) if !extras.is_empty() => format!("\n\n{extras}"),
        _ => String::new(),
    };
    format!("Hi {name},{snippet}{extras}{APPEAL_RESPONSE_SIGNATURE}")
}

/// The first message posted into an appeal thread.
///
/// Helper API for the appeal-response command layer. A command handler loads
/// the thread's first message into this type, checks it with
/// [`respondable_appeal_uuid`], and after replying edits the message to
/// [`AppealThreadDataMessage::actioned_content`] so the appeal cannot be
/// answered twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppealThreadDataMessage {
    pub authored_by_self: bool,
    pub content: String,
}

impl AppealThreadDataMessage {
    pub fn is_actioned(&self) -> bool {
        self.content.starts_with(ACTIONED_PREFIX)
    }

    /// Leading whitespace-separated token, which is the form response id.
    pub fn response_uuid(&self) -> Option<&str> {
        self.content.split_whitespace().next()
    }

    /// Replacement content marking the appeal as answered.
    pub fn actioned_content(&self) -> String {
        format!("{ACTIONED_PREFIX} {}", self.content)
    }
}

/// Returns the response id of an appeal thread that can still be answered.
///
/// `None` unless the thread sits under the appeals channel and its data
/// message was posted by the bot and is not yet actioned.
pub fn respondable_appeal_uuid<'a>(
    thread_parent: Option<ChannelId>,
    appeals_channel: ChannelId,
    data_message: Option<&'a AppealThreadDataMessage>,
) -> Option<&'a str> {
    if thread_parent != Some(appeals_channel) {
        return None;
    }
    let data_message = data_message?;
    if !data_message.authored_by_self || data_message.is_actioned() {
        return None;
    }
    data_message.response_uuid()
}
