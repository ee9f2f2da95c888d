//! Query parsing and dispatch.
//!
//! A query is an ordered list of `key=value` pairs joined by `&`:
//!
//! ```text
//! dev=<device-id>&time=<days|months|years>[&data=<selector>]
//! ```
//!
//! Pair positions matter. Pair 0 names the device, pair 1 the granularity,
//! and an optional pair 2 turns a listing into a detail/aggregate request.
//! Parsing never fails; [`route`] decides whether the pairs make a valid
//! request.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use snse_store::{LogStore, Totals};

/// One `key=value` pair of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

/// An immutable, ordered list of query pairs scoped to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<Pair>,
}

impl Query {
    /// Parse a query string.
    ///
    /// A trailing CRLF is stripped first. Each `&`-separated part is split on
    /// its first `=`; a part without `=` becomes a key with an empty value.
    ///
    /// ```
    /// use snse_service::router::Query;
    ///
    /// let query = Query::parse("dev=10.0.0.7&time=months&data=06/2025\r\n");
    /// assert_eq!(query.len(), 3);
    /// assert_eq!(query.value("data"), Some("06/2025"));
    /// ```
    pub fn parse(text: &str) -> Self {
        let text = text.trim_end_matches(['\r', '\n']);
        let pairs = text
            .split('&')
            .map(|part| match part.split_once('=') {
                Some((key, value)) => Pair {
                    key: key.to_string(),
                    value: value.to_string(),
                },
                None => Pair {
                    key: part.to_string(),
                    value: String::new(),
                },
            })
            .collect();
        Self { pairs }
    }

    /// All pairs, in request order.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// The pair at `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Pair> {
        self.pairs.get(index)
    }

    /// Value of the first pair with `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|pair| pair.key == key)
            .map(|pair| pair.value.as_str())
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the query holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Time granularity selected by the `time` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Days,
    Months,
    Years,
}

impl FromStr for Granularity {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "days" => Ok(Granularity::Days),
            "months" => Ok(Granularity::Months),
            "years" => Ok(Granularity::Years),
            other => Err(RouteError::InvalidTime(other.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Days => write!(f, "days"),
            Granularity::Months => write!(f, "months"),
            Granularity::Years => write!(f, "years"),
        }
    }
}

/// A routed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Distinct periods of the given granularity.
    List {
        device: String,
        granularity: Granularity,
    },
    /// Raw lines of a day, or totals of a month or year.
    Detail {
        device: String,
        granularity: Granularity,
        selector: String,
    },
}

impl Request {
    /// The device the request targets.
    pub fn device(&self) -> &str {
        match self {
            Request::List { device, .. } | Request::Detail { device, .. } => device,
        }
    }
}

/// Reasons a query cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("dev key required")]
    MissingDevice,
    #[error("time key required")]
    MissingTime,
    #[error("Unknown time granularity: {0}")]
    InvalidTime(String),
    #[error("Unknown command")]
    UnknownCommand(String),
}

/// Decide what a query asks for.
///
/// ```
/// use snse_service::router::{Granularity, Query, Request, route};
///
/// let request = route(&Query::parse("dev=1.2.3.4&time=years")).unwrap();
/// assert_eq!(
///     request,
///     Request::List { device: "1.2.3.4".into(), granularity: Granularity::Years }
/// );
/// ```
pub fn route(query: &Query) -> Result<Request, RouteError> {
    let device = match query.get(0) {
        Some(pair) if pair.key == "dev" => pair.value.clone(),
        _ => return Err(RouteError::MissingDevice),
    };

    let granularity = match query.get(1) {
        Some(pair) if pair.key == "time" => pair.value.parse::<Granularity>()?,
        _ => return Err(RouteError::MissingTime),
    };

    match query.get(2) {
        None => Ok(Request::List {
            device,
            granularity,
        }),
        Some(pair) if pair.key == "data" => Ok(Request::Detail {
            device,
            granularity,
            selector: pair.value.clone(),
        }),
        Some(pair) => Err(RouteError::UnknownCommand(pair.key.clone())),
    }
}

/// Result of executing a request against the store.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    /// Listing entries or raw day lines.
    Lines(Vec<String>),
    /// Per-day or per-month totals.
    Totals(Totals),
}

/// Run a routed request against the log store.
///
/// This performs blocking file I/O.
pub fn execute(store: &LogStore, request: &Request) -> snse_store::Result<Outcome> {
    let log = store.open(request.device())?;
    let outcome = match request {
        Request::List { granularity, .. } => Outcome::Lines(match granularity {
            Granularity::Days => log.days()?,
            Granularity::Months => log.months()?,
            Granularity::Years => log.years()?,
        }),
        Request::Detail {
            granularity,
            selector,
            ..
        } => match granularity {
            Granularity::Days => Outcome::Lines(log.day_detail(selector)?),
            Granularity::Months => Outcome::Totals(log.month_total(selector)?),
            Granularity::Years => Outcome::Totals(log.year_total(selector)?),
        },
    };
    Ok(outcome)
}
