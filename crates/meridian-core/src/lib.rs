//! Core types, configuration, and error taxonomy for Meridian.
//!
//! This crate provides the foundational building blocks shared across all
//! Meridian components: the identifier newtypes for tenants, users, and
//! buckets, the environment-driven [`MeridianConfig`], the request-scoped
//! [`RequestContext`], and the error taxonomy every component converges on.

mod config;
mod context;
mod error;
mod ids;

pub use config::MeridianConfig;
pub use context::{RequestContext, Role};
pub use error::{CoreError, CoreResult, RetentionMode};
pub use ids::{AccessKeyId, BucketKey, TenantId, UserId};
