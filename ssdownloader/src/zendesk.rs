//! Zendesk ticket comments as a source of package links and attachments.
//!
//! Comments are fetched page by page from the ticket comments endpoint.
//! Every `<a href>` in a comment's HTML body becomes a [`CommentLink`]
//! paired with the comment's plain-text body; attachments are flattened
//! with the id and creation time of the comment they belong to.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace};

use crate::sendsafely::{ApiError, ApiRequest, ApiTransport, Method, ReqwestTransport};

/// Result type for Zendesk operations.
pub type ZendeskResult<T> = Result<T, ZendeskError>;

/// Errors from the Zendesk ticket source.
#[derive(Debug, Error)]
pub enum ZendeskError {
    /// The body was not JSON, or a field had the wrong type.
    #[error("parsing ticket comments failed{}: {reason}", location_suffix(.location))]
    Parse { location: String, reason: String },

    /// A required field was absent.
    #[error("ticket comments missing field '{field}'{}", location_suffix(.location))]
    MissingField { field: String, location: String },

    /// The request could not be sent.
    #[error(transparent)]
    Transport(#[from] ApiError),

    /// Zendesk answered with a non-success status.
    #[error("zendesk request to '{url}' failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },
}

fn location_suffix(location: &str) -> String {
    if location.is_empty() {
        String::new()
    } else {
        format!(" in {}", location)
    }
}

/// A link found in a comment, with the comment's plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLink {
    pub body: String,
    pub url: String,
}

/// An attachment on a ticket comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_url: String,
    pub content_type: String,
    pub size: u64,
    pub deleted: bool,
    pub parent_comment_id: i64,
    pub parent_comment_date: DateTime<Utc>,
}

/// Links and attachments found on one page of comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentPage {
    pub links: Vec<CommentLink>,
    pub attachments: Vec<Attachment>,
    pub next_page: Option<String>,
}

/// Everything found across all pages of a ticket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketContents {
    pub links: Vec<CommentLink>,
    pub attachments: Vec<Attachment>,
}

fn anchor_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap())
}

/// Every `href` on an `<a>` tag, in document order.
///
/// Attribute values come back with character references decoded; markup
/// inside comments is not an element and yields nothing.
fn extract_hrefs(html: &str) -> Vec<String> {
    Html::parse_fragment(html)
        .select(anchor_selector())
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::to_string)
        .collect()
}

fn required<'a>(value: &'a Value, field: &str, location: &str) -> ZendeskResult<&'a Value> {
    value
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| ZendeskError::MissingField {
            field: field.to_string(),
            location: location.to_string(),
        })
}

fn required_str<'a>(value: &'a Value, field: &str, location: &str) -> ZendeskResult<&'a str> {
    required(value, field, location)?
        .as_str()
        .ok_or_else(|| wrong_type(field, "a string", location))
}

fn wrong_type(field: &str, expected: &str, location: &str) -> ZendeskError {
    ZendeskError::Parse {
        location: location.to_string(),
        reason: format!("'{}' is not {}", field, expected),
    }
}

/// Parse one page of the ticket comments response.
pub fn parse_comments(json: &str) -> ZendeskResult<CommentPage> {
    let root: Value = serde_json::from_str(json).map_err(|e| ZendeskError::Parse {
        location: String::new(),
        reason: e.to_string(),
    })?;

    let next_page = root
        .get("next_page")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let comments = required(&root, "comments", "")?
        .as_array()
        .ok_or_else(|| wrong_type("comments", "an array", ""))?;

    let mut page = CommentPage {
        next_page,
        ..Default::default()
    };

    for (i, comment) in comments.iter().enumerate() {
        let location = format!("comment {} (base index 0)", i);

        let body = required_str(comment, "plain_body", &location)?;
        let html_body = required_str(comment, "html_body", &location)?;
        for url in extract_hrefs(html_body) {
            page.links.push(CommentLink {
                body: body.to_string(),
                url,
            });
        }

        let parent_comment_id = required(comment, "id", &location)?
            .as_i64()
            .ok_or_else(|| wrong_type("id", "an integer", &location))?;
        let created_raw = required_str(comment, "created_at", &location)?;
        let parent_comment_date = DateTime::parse_from_rfc3339(created_raw)
            .map_err(|e| ZendeskError::Parse {
                location: format!("'created_at' of {}", location),
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);

        let attachments = required(comment, "attachments", &location)?
            .as_array()
            .ok_or_else(|| wrong_type("attachments", "an array", &location))?;

        for (ai, attachment) in attachments.iter().enumerate() {
            let location = format!("comment {} attachment {} (base index 0)", i, ai);
            page.attachments.push(Attachment {
                file_name: required_str(attachment, "file_name", &location)?.to_string(),
                deleted: required(attachment, "deleted", &location)?
                    .as_bool()
                    .ok_or_else(|| wrong_type("deleted", "a boolean", &location))?,
                content_url: required_str(attachment, "content_url", &location)?.to_string(),
                content_type: required_str(attachment, "content_type", &location)?.to_string(),
                size: required(attachment, "size", &location)?
                    .as_u64()
                    .ok_or_else(|| wrong_type("size", "a non-negative integer", &location))?,
                parent_comment_id,
                parent_comment_date,
            });
        }
    }

    Ok(page)
}

/// URL of the first page of a ticket's comments.
pub fn comments_url(subdomain: &str, ticket_id: &str) -> String {
    format!(
        "https://{}.zendesk.com/api/v2/tickets/{}/comments.json",
        subdomain, ticket_id
    )
}

/// Blocking Zendesk API client using token authentication.
pub struct ZendeskClient<T: ApiTransport = ReqwestTransport> {
    email: String,
    secret: String,
    subdomain: String,
    transport: T,
}

impl ZendeskClient<ReqwestTransport> {
    /// Create a client for `https://{subdomain}.zendesk.com`.
    ///
    /// `secret` is the API token, or a password entered interactively.
    pub fn new(
        email: impl Into<String>,
        secret: impl Into<String>,
        subdomain: impl Into<String>,
    ) -> ZendeskResult<Self> {
        Ok(Self::with_transport(
            email,
            secret,
            subdomain,
            ReqwestTransport::new()?,
        ))
    }
}

impl<T: ApiTransport> ZendeskClient<T> {
    /// Create a client over a specific transport.
    pub fn with_transport(
        email: impl Into<String>,
        secret: impl Into<String>,
        subdomain: impl Into<String>,
        transport: T,
    ) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
            subdomain: subdomain.into(),
            transport,
        }
    }

    fn authorization(&self) -> String {
        let credentials = format!("{}/token:{}", self.email, self.secret);
        format!("Basic {}", STANDARD.encode(credentials))
    }

    /// Fetch the raw JSON of one comments page.
    pub fn comments_page(&self, url: &str) -> ZendeskResult<String> {
        let request = ApiRequest {
            method: Method::Get,
            url: url.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), self.authorization()),
            ],
            body: None,
        };
        let response = self.transport.execute(&request)?;
        if !(200..300).contains(&response.status) {
            return Err(ZendeskError::Status {
                url: url.to_string(),
                status: response.status,
                body: response.body,
            });
        }
        trace!(url, body = %response.body, "ticket comments page");
        Ok(response.body)
    }

    /// Collect links and attachments across every page of a ticket.
    pub fn ticket_contents(&self, ticket_id: &str) -> ZendeskResult<TicketContents> {
        let mut contents = TicketContents::default();
        let mut url = comments_url(&self.subdomain, ticket_id);
        let mut pages = 0usize;

        loop {
            let page = parse_comments(&self.comments_page(&url)?)?;
            pages += 1;
            contents.links.extend(page.links);
            contents.attachments.extend(page.attachments);
            match page.next_page {
                Some(next) => url = next,
                None => break,
            }
        }

        debug!(
            ticket_id,
            pages,
            links = contents.links.len(),
            attachments = contents.attachments.len(),
            "ticket comments read"
        );
        Ok(contents)
    }
}
