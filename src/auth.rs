//! Credential loading from a collaborator-supplied header file
//!
//! The header file contains one `Key: Value` pair per line. The core does not
//! manage credentials itself; it fails fast with an auth error when the file
//! is absent or the authorization value does not begin with the expected
//! scheme prefix.

use crate::config::AuthConfig;
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::path::Path;

/// Load and validate request headers from the configured header file
///
/// Keys are lowercased; lines without a `: ` separator are ignored. The
/// `authorization` header must be present and begin with the configured
/// scheme prefix (e.g. `Token token=`).
///
/// # Errors
///
/// Returns [`Error::Auth`] if the file is missing, contains no valid
/// authorization header, or a header cannot be encoded.
pub fn load_headers(config: &AuthConfig) -> Result<HeaderMap> {
    let path = &config.headers_file;
    let contents = read_header_file(path)?;
    parse_headers(&contents, &config.auth_scheme)
}

fn read_header_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::Auth(format!(
            "header file not found at {}",
            path.display()
        )));
    }
    std::fs::read_to_string(path).map_err(Error::Io)
}

/// Parse `Key: Value` lines into a header map and validate the token scheme
pub(crate) fn parse_headers(contents: &str, auth_scheme: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut authorization: Option<String> = None;

    for line in contents.lines() {
        let Some((key, value)) = line.split_once(": ") else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if key == "authorization" {
            authorization = Some(value.to_string());
        }
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::Auth(format!("invalid header name '{key}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Auth(format!("invalid value for header '{key}': {e}")))?;
        headers.insert(name, value);
    }

    match authorization {
        Some(token) if token.starts_with(auth_scheme) => Ok(headers),
        Some(_) => Err(Error::Auth(format!(
            "authorization header must begin with '{auth_scheme}'"
        ))),
        None => Err(Error::Auth(
            "missing authorization header in header file".to_string(),
        )),
    }
}
