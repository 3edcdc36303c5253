//! Presigned-URL generation (§4.6).
//!
//! `meridian_sigv4` only verifies presigned URLs (it's consumed by the
//! component that authenticates inbound requests, which never needs to
//! *produce* one). This module builds the matching query string using the
//! same canonical-request construction, so a URL generated here verifies
//! successfully through [`meridian_sigv4::verify_presigned`] unchanged.

use chrono::{DateTime, Utc};
use meridian_sigv4::canonical::{build_canonical_headers, build_canonical_query_string, build_canonical_uri, build_signed_headers_string};
use meridian_sigv4::sigv4::{build_string_to_sign, compute_signature, derive_signing_key};
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// A presigned GET URL's pieces: the caller joins `path` and `query` onto
/// whatever scheme/host it serves from.
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    /// Canonical (percent-encoded) request path.
    pub path: String,
    /// Query string, including `X-Amz-Signature`.
    pub query: String,
}

/// Build a presigned `GET` URL for `path` on `host`, valid for
/// `expires_secs` starting at `now`, signed with the tenant-scoped access
/// key snapshotted on the share (§4.6: "single service name `s3` and a
/// fixed region label configured at startup").
#[must_use]
pub fn presign_get(host: &str, path: &str, access_key_id: &str, secret_access_key: &str, region: &str, expires_secs: u64, now: DateTime<Utc>) -> PresignedUrl {
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let credential_scope = format!("{date}/{region}/s3/aws4_request");
    let credential = format!("{access_key_id}/{credential_scope}");

    let query_without_signature = format!(
        "X-Amz-Algorithm={ALGORITHM}&X-Amz-Credential={}&X-Amz-Date={timestamp}&X-Amz-Expires={expires_secs}&X-Amz-SignedHeaders=host",
        percent_encoding::utf8_percent_encode(&credential, percent_encoding::NON_ALPHANUMERIC),
    );

    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(&query_without_signature);
    let canonical_headers = build_canonical_headers(&[("host", host)], &["host"]);
    let canonical_request = format!("GET\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\nhost\n{UNSIGNED_PAYLOAD}");
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    let string_to_sign = build_string_to_sign(&timestamp, &credential_scope, &canonical_hash);
    let signing_key = derive_signing_key(secret_access_key, &date, region, "s3");
    let signature = compute_signature(&signing_key, &string_to_sign);

    PresignedUrl {
        path: canonical_uri,
        query: format!("{query_without_signature}&X-Amz-Signature={signature}"),
    }
}

/// Same form as [`build_signed_headers_string`], re-exported so callers that
/// need to extend the signed-header set beyond `host` don't have to depend
/// on `meridian-sigv4` directly.
#[must_use]
pub fn signed_headers(headers: &[&str]) -> String {
    build_signed_headers_string(headers)
}

#[cfg(test)]
mod tests {
    use http::Request;
    use meridian_sigv4::credentials::StaticCredentialProvider;
    use meridian_sigv4::verify_presigned;

    use super::*;

    #[test]
    fn test_presigned_url_round_trips_through_verify_presigned() {
        let now = Utc::now();
        let presigned = presign_get("bucket.example.com", "/photos/a.jpg", "AKIDEXAMPLE", "secret", "us-east-1", 3600, now);

        let uri: http::Uri = format!("{}?{}", presigned.path, presigned.query).parse().unwrap();
        let request = Request::builder().method("GET").uri(uri).header("host", "bucket.example.com").body(()).unwrap();
        let (parts, ()) = request.into_parts();

        let provider = StaticCredentialProvider::new([("AKIDEXAMPLE".to_owned(), "secret".to_owned())]);
        let result = verify_presigned(&parts, &provider).unwrap();
        assert_eq!(result.access_key_id, "AKIDEXAMPLE");
    }

    #[test]
    fn test_presigned_url_rejects_wrong_secret() {
        let now = Utc::now();
        let presigned = presign_get("bucket.example.com", "/photos/a.jpg", "AKIDEXAMPLE", "secret", "us-east-1", 3600, now);

        let uri: http::Uri = format!("{}?{}", presigned.path, presigned.query).parse().unwrap();
        let request = Request::builder().method("GET").uri(uri).header("host", "bucket.example.com").body(()).unwrap();
        let (parts, ()) = request.into_parts();

        let provider = StaticCredentialProvider::new([("AKIDEXAMPLE".to_owned(), "wrong".to_owned())]);
        assert!(verify_presigned(&parts, &provider).is_err());
    }
}
