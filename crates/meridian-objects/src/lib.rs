//! Bucket and object engine: versioning, retention, ACL/policy, and
//! multipart composition (§4.2, §4.3 -- spec C4, C5).
//!
//! [`bucket::BucketManager`] owns bucket lifecycle, quota, and the
//! configuration subdocuments that hang off a bucket; [`object::ObjectManager`]
//! owns version history, ETags, retention/legal hold, and listing. Neither
//! depends on the other's crate outside of `ObjectManager` calling
//! `BucketManager`'s counter primitives, since only object puts/deletes move
//! bytes.
//!
//! # Modules
//!
//! - [`model`] - bucket/object/version record types
//! - [`etag`] - single-part and multipart ETag computation
//! - [`list`] - prefix/delimiter listing fold
//! - [`bucket`] - [`bucket::BucketManager`]
//! - [`object`] - [`object::ObjectManager`]

pub mod bucket;
pub mod etag;
pub mod list;
pub mod model;
pub mod object;

pub use bucket::BucketManager;
pub use object::ObjectManager;
