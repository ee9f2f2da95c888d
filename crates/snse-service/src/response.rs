//! Wire framing of query responses.
//!
//! A framed response is `<status-line>\n<body>\r\n`. The one exception is
//! the reply to a query that does not start with `dev=`, which is a bare
//! text line unless `server.frame_missing_dev` is enabled.

use std::fmt;

use tracing::warn;

use crate::router::{Outcome, RouteError};

/// Body sent with every `404 Not Found`.
pub const NOT_FOUND_BODY: &str = "No data found\n";

/// Unframed reply to a query that does not name a device.
pub const MISSING_DEVICE_REPLY: &str = "Request must start with dev=<ip>!\n";

/// Unframed reply to a `POST` request.
pub const POST_REPLY: &str = "this is a post req\n";

/// Unframed reply to any method other than `GET` and `POST`.
pub const UNSUPPORTED_METHOD_REPLY: &str = "Only POST and GET requests are supported\n";

/// Response status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    NotFound,
    BadRequest,
}

impl Status {
    /// The status line as sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "200 OK",
            Status::NotFound => "404 Not Found",
            Status::BadRequest => "400 Invalid request",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response ready to be written to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Status line plus body.
    Framed { status: Status, body: String },
    /// Plain text sent as-is.
    Unframed(String),
}

impl Response {
    /// `200 OK` with `body`.
    pub fn ok(body: impl Into<String>) -> Self {
        Response::Framed {
            status: Status::Ok,
            body: body.into(),
        }
    }

    /// `404 Not Found` with the standard body.
    pub fn not_found() -> Self {
        Response::Framed {
            status: Status::NotFound,
            body: NOT_FOUND_BODY.to_string(),
        }
    }

    /// `400 Invalid request` with `body`.
    pub fn bad_request(body: impl Into<String>) -> Self {
        Response::Framed {
            status: Status::BadRequest,
            body: body.into(),
        }
    }

    /// Encode a successful query result.
    ///
    /// Listings and day lines are joined with `\n`; every total record ends
    /// with `\n`.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Lines(lines) => Response::ok(lines.join("\n")),
            Outcome::Totals(totals) => {
                let mut body = String::new();
                for record in totals.records() {
                    body.push_str(&record);
                    body.push('\n');
                }
                Response::ok(body)
            }
        }
    }

    /// Encode a store failure.
    ///
    /// Every store error is reported as `404 Not Found`, so a client cannot
    /// tell an unknown device from a disk error. Errors other than "nothing
    /// to report" are logged with their cause.
    pub fn from_store_error(error: &snse_store::Error) -> Self {
        if !error.is_not_found() {
            warn!("Query failed, reporting not found: {}", error);
        }
        Response::not_found()
    }

    /// Encode a routing failure.
    pub fn from_route_error(error: &RouteError, frame_missing_dev: bool) -> Self {
        match error {
            RouteError::MissingDevice if !frame_missing_dev => {
                Response::Unframed(MISSING_DEVICE_REPLY.to_string())
            }
            other => Response::bad_request(other.to_string()),
        }
    }

    /// The status, for framed responses.
    pub fn status(&self) -> Option<Status> {
        match self {
            Response::Framed { status, .. } => Some(*status),
            Response::Unframed(_) => None,
        }
    }

    /// Encode for the wire.
    pub fn encode(&self) -> String {
        match self {
            Response::Framed { status, body } => format!("{status}\n{body}\r\n"),
            Response::Unframed(text) => text.clone(),
        }
    }
}
