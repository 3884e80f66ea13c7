//! HTTP(S) range source
//!
//! A batch of ranges is one GET with a multi-range `Range` header. Servers
//! answer with a single `206` part, a `206 multipart/byteranges` body, or a
//! plain `200` with the whole file; all three are reduced to one payload per
//! requested range, in request order.

use super::{FetchedRange, RangeSource};
use crate::config::Config;
use crate::delta::DataRange;
use crate::error::{Error, Result};
use crate::retry::{with_retry_sync, RetryConfig};
use bytes::Bytes;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT_ENCODING, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::StatusCode;
use std::io::Write;
use std::path::PathBuf;
use url::Url;

/// Fetches target ranges from a web server
pub struct HttpSource {
    client: Client,
    url: Url,
    retry: RetryConfig,
    /// Basic authentication user and optional password
    credentials: Option<(String, Option<String>)>,
    /// Whole target, kept once the server has ignored a `Range` header
    whole_body: Option<Bytes>,
    bytes_received: u64,
    requests: usize,
}

/// A byte range the server sent back, before matching to requests
#[derive(Debug, Clone, PartialEq, Eq)]
struct ServedPart {
    range: DataRange,
    data: Bytes,
}

impl ServedPart {
    /// The whole file as a single part starting at offset zero
    fn whole(body: Bytes) -> Self {
        Self {
            range: DataRange::new(0, body.len() as u64),
            data: body,
        }
    }
}

/// How the server answered a ranged request
enum RangeReply {
    /// `206`, one part per served range
    Partial(Vec<ServedPart>),
    /// `200`, the `Range` header was ignored
    Whole(Bytes),
}

impl HttpSource {
    /// Create a source for `url` using the HTTP settings in `config`
    pub fn new(url: Url, config: &Config) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            url,
            retry: RetryConfig::from(config),
            credentials: config.http_credentials(),
            whole_body: None,
            bytes_received: 0,
            requests: 0,
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the whole resource into memory (recipes and other small documents)
    pub fn fetch_all(&mut self) -> Result<Bytes> {
        let mut attempts = 0usize;
        let body = with_retry_sync(&self.retry, || {
            attempts += 1;
            let response = self.send(None)?;
            Ok(response.bytes()?)
        })?;
        self.requests += attempts;
        self.bytes_received += body.len() as u64;
        Ok(body)
    }

    /// Send one GET, optionally with a `Range` header, and check the status
    fn send(&self, range_header: Option<&str>) -> Result<Response> {
        let mut request = self
            .client
            .get(self.url.clone())
            .header(ACCEPT_ENCODING, "identity");
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }
        if let Some(value) = range_header {
            request = request.header(RANGE, value);
        }

        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(Error::NotFound {
                path: PathBuf::from(self.url.as_str()),
            }),
            StatusCode::TOO_MANY_REQUESTS => Err(Error::network(format!(
                "{} answered {}",
                self.url, status
            ))),
            s if s.is_server_error() => Err(Error::network(format!(
                "{} answered {}",
                self.url, status
            ))),
            _ => Err(Error::malformed(format!(
                "{} answered {}",
                self.url, status
            ))),
        }
    }

    /// One ranged request, returning what the server chose to send
    fn request_parts(&self, ranges: &[DataRange]) -> Result<(RangeReply, u64)> {
        let header = range_header(ranges);
        let response = self.send(Some(&header))?;
        let status = response.status();
        let content_type = header_str(&response, CONTENT_TYPE.as_str());
        let content_range = header_str(&response, CONTENT_RANGE.as_str());
        let body = response.bytes()?;
        let received = body.len() as u64;

        if status != StatusCode::PARTIAL_CONTENT {
            return Ok((RangeReply::Whole(body), received));
        }

        let parts = match content_type.as_deref().and_then(multipart_boundary) {
            Some(boundary) => parse_multipart(&body, &boundary)?,
            None => {
                let value = content_range
                    .ok_or_else(|| Error::malformed("206 response without Content-Range"))?;
                let (range, _total) = parse_content_range(&value)?;
                if body.len() as u64 != range.len() {
                    return Err(Error::malformed(format!(
                        "Content-Range {} but {} body bytes",
                        value,
                        body.len()
                    )));
                }
                vec![ServedPart { range, data: body }]
            }
        };

        Ok((RangeReply::Partial(parts), received))
    }
}

impl RangeSource for HttpSource {
    fn fetch_ranges(&mut self, ranges: &[DataRange]) -> Result<Vec<FetchedRange>> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(body) = &self.whole_body {
            return select_ranges(ranges, &[ServedPart::whole(body.clone())]);
        }

        let mut attempts = 0usize;
        let (reply, received) = with_retry_sync(&self.retry, || {
            attempts += 1;
            self.request_parts(ranges)
        })?;
        self.requests += attempts;
        self.bytes_received += received;

        let parts = match reply {
            RangeReply::Partial(parts) => parts,
            RangeReply::Whole(body) => {
                tracing::info!(
                    url = %self.url,
                    bytes = body.len(),
                    "Server ignored Range header, serving remaining ranges from the full body"
                );
                self.whole_body = Some(body.clone());
                vec![ServedPart::whole(body)]
            }
        };

        tracing::debug!(
            url = %self.url,
            ranges = ranges.len(),
            parts = parts.len(),
            received,
            "Fetched range batch"
        );

        select_ranges(ranges, &parts)
    }

    fn fetch_whole(&mut self, mut out: &mut dyn Write) -> Result<u64> {
        let mut attempts = 0usize;
        let mut response = with_retry_sync(&self.retry, || {
            attempts += 1;
            self.send(None)
        })?;
        self.requests += attempts;

        let copied = response.copy_to(&mut out)?;
        self.bytes_received += copied;

        tracing::debug!(url = %self.url, bytes = copied, "Fetched whole file");
        Ok(copied)
    }

    fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    fn requests(&self) -> usize {
        self.requests
    }
}

fn header_str(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `bytes=a-b,c-d` for the given ranges
fn range_header(ranges: &[DataRange]) -> String {
    let specs: Vec<String> = ranges.iter().map(DataRange::header_spec).collect();
    format!("bytes={}", specs.join(","))
}

/// Cut each requested range out of whichever served part covers it
fn select_ranges(requested: &[DataRange], parts: &[ServedPart]) -> Result<Vec<FetchedRange>> {
    requested
        .iter()
        .map(|&range| {
            let part = parts
                .iter()
                .find(|p| p.range.start <= range.start && range.end <= p.range.end)
                .ok_or_else(|| {
                    Error::malformed(format!("response does not cover range {}", range))
                })?;
            let offset = (range.start - part.range.start) as usize;
            let data = part.data.slice(offset..offset + range.len() as usize);
            Ok(FetchedRange::new(range, data))
        })
        .collect()
}

/// Boundary parameter of a `multipart/byteranges` content type
fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/byteranges") {
        return None;
    }
    params.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Parse `bytes start-end/total` into a half-open range and optional total
fn parse_content_range(value: &str) -> Result<(DataRange, Option<u64>)> {
    let invalid = || Error::malformed(format!("invalid Content-Range: {}", value));

    let value = value.trim();
    let (unit, spec) = value.split_once(char::is_whitespace).ok_or_else(invalid)?;
    if !unit.eq_ignore_ascii_case("bytes") {
        return Err(invalid());
    }

    let (range_part, total_part) = spec.trim().split_once('/').ok_or_else(invalid)?;
    let total = match total_part {
        "*" => None,
        t => Some(t.parse::<u64>().map_err(|_| invalid())?),
    };

    let (start, end) = range_part.split_once('-').ok_or_else(invalid)?;
    let start: u64 = start.parse().map_err(|_| invalid())?;
    let end: u64 = end.parse().map_err(|_| invalid())?;
    if end < start || total.is_some_and(|t| end >= t) {
        return Err(invalid());
    }

    Ok((DataRange::new(start, end + 1), total))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Split a `multipart/byteranges` body into its parts.
///
/// Part data is taken by the length its `Content-Range` declares, so binary
/// content that happens to contain the boundary string is handled.
fn parse_multipart(body: &Bytes, boundary: &str) -> Result<Vec<ServedPart>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut pos = 0;

    loop {
        let at = find(&body[pos..], &delimiter)
            .ok_or_else(|| Error::malformed("multipart body missing closing boundary"))?;
        pos += at + delimiter.len();

        if body[pos..].starts_with(b"--") {
            break;
        }

        let header_len = find(&body[pos..], b"\r\n\r\n")
            .ok_or_else(|| Error::malformed("multipart part without header terminator"))?;
        let headers = std::str::from_utf8(&body[pos..pos + header_len])
            .map_err(|_| Error::malformed("multipart part headers are not UTF-8"))?;

        let content_range = headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-range")
                    .then(|| value.trim())
            })
            .ok_or_else(|| Error::malformed("multipart part without Content-Range"))?;
        let (range, _total) = parse_content_range(content_range)?;

        let data_start = pos + header_len + 4;
        let data_end = data_start
            .checked_add(range.len() as usize)
            .filter(|&end| end <= body.len())
            .ok_or_else(|| Error::malformed(format!("multipart part {} truncated", range)))?;

        parts.push(ServedPart {
            range,
            data: body.slice(data_start..data_end),
        });
        pos = data_end;
    }

    if parts.is_empty() {
        return Err(Error::malformed("multipart body has no parts"));
    }
    Ok(parts)
}
