//! ETag computation (§4.2 "ETag semantics", §8 property 9).

use md5::{Digest, Md5};

/// Single-part ETag: lowercase hex MD5 of the full body.
#[must_use]
pub fn single_part(body: &[u8]) -> String {
    hex::encode(Md5::digest(body))
}

/// Multipart compose ETag: lowercase hex MD5 of the concatenated raw MD5
/// digests of each part, followed by `-<partCount>`.
///
/// `part_digests` must already be in part-number order.
#[must_use]
pub fn multipart(part_digests: &[[u8; 16]]) -> String {
    let mut hasher = Md5::new();
    for digest in part_digests {
        hasher.update(digest);
    }
    format!("{}-{}", hex::encode(hasher.finalize()), part_digests.len())
}

/// The raw 16-byte MD5 digest of one part, as fed into [`multipart`].
#[must_use]
pub fn part_digest(part: &[u8]) -> [u8; 16] {
    Md5::digest(part).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_part_etag_matches_s1_scenario() {
        assert_eq!(single_part(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(single_part(b"world!"), "fc3ff98e8c6a0d3087d515c0473f8677");
    }

    #[test]
    fn test_multipart_etag_appends_part_count() {
        let digests = vec![part_digest(b"part1"), part_digest(b"part2")];
        let etag = multipart(&digests);
        assert!(etag.ends_with("-2"));
        assert_eq!(etag.len(), 32 + 2);
    }
}
