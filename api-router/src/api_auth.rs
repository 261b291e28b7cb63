use axum::http::HeaderMap;

/// Credential sent as a header instead of the multipart `password` field: `X-API-Key`, or
/// an `Authorization: Bearer` token.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer ").map(str::trim))
        })
        .filter(|key| !key.is_empty())
        .map(String::from)
}
