use thiserror::Error;
use url::Url;

/// Short codes that would shadow server routes.
pub const RESERVED_CODES: &[&str] = &[
    "admin", "api", "static", "assets", "favicon", "robots", "sitemap", "health",
];

const MIN_URL_LEN: usize = 10;
const MAX_URL_LEN: usize = 2048;
const MIN_CODE_LEN: usize = 2;
const MAX_CODE_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("URL is required")]
    UrlMissing,
    #[error("URL is too short")]
    UrlTooShort,
    #[error("URL is too long (max 2048 characters)")]
    UrlTooLong,
    #[error("Invalid URL format")]
    UrlMalformed,
    #[error("Only HTTP and HTTPS URLs are allowed")]
    UrlScheme,
    #[error("Invalid hostname")]
    UrlHost,
    #[error("Local URLs are not allowed")]
    UrlLocal,
    #[error("Short code is required")]
    CodeMissing,
    #[error("Short code must be at least 2 characters")]
    CodeTooShort,
    #[error("Short code must be at most 50 characters")]
    CodeTooLong,
    #[error("Short code can only contain letters, numbers, hyphens, and underscores")]
    CodeCharset,
    #[error("This short code is reserved")]
    CodeReserved,
}

/// Validate a destination URL and return its normalised form.
pub fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(ValidationError::UrlMissing);
    }

    let len = url.chars().count();
    if len < MIN_URL_LEN {
        return Err(ValidationError::UrlTooShort);
    }
    if len > MAX_URL_LEN {
        return Err(ValidationError::UrlTooLong);
    }

    let parsed = Url::parse(url).map_err(|_| ValidationError::UrlMalformed)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::UrlScheme);
    }

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.len() < 3 {
        return Err(ValidationError::UrlHost);
    }
    if host == "localhost" || host.starts_with("127.") || host.starts_with("0.") {
        return Err(ValidationError::UrlLocal);
    }

    Ok(parsed.into())
}

/// Validate a short code and return it trimmed.
pub fn validate_code(raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ValidationError::CodeMissing);
    }

    let len = code.chars().count();
    if len < MIN_CODE_LEN {
        return Err(ValidationError::CodeTooShort);
    }
    if len > MAX_CODE_LEN {
        return Err(ValidationError::CodeTooLong);
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::CodeCharset);
    }

    let lowered = code.to_ascii_lowercase();
    if RESERVED_CODES.contains(&lowered.as_str()) {
        return Err(ValidationError::CodeReserved);
    }

    Ok(code.to_owned())
}
