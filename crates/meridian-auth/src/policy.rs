//! S3-style bucket policy documents: `Effect`/`Principal`/`Action`/
//! `Resource`/`Condition` (§4.5 step 6).
//!
//! Condition keys implemented: `aws:SourceIp` (IPv4 CIDR), `aws:CurrentTime`,
//! `s3:prefix`, matching exactly the set the spec names.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a statement allows or denies its matched requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Effect {
    Allow,
    Deny,
}

/// Who a statement applies to. `Wildcard` matches every caller, including
/// anonymous; `Id` matches one user id exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Wildcard,
    Id(String),
}

impl Principal {
    fn matches(&self, caller_user_id: Option<&str>) -> bool {
        match self {
            Principal::Wildcard => true,
            Principal::Id(id) => Some(id.as_str()) == caller_user_id,
        }
    }
}

impl Serialize for Principal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Principal::Wildcard => serializer.serialize_str("*"),
            Principal::Id(id) => serializer.serialize_str(id),
        }
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(if s == "*" { Principal::Wildcard } else { Principal::Id(s) })
    }
}

/// A condition operator to a map of condition-key to expected value(s).
/// Mirrors AWS IAM's `{"IpAddress": {"aws:SourceIp": "..."}}` shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "IpAddress", default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "DateLessThan", default, skip_serializing_if = "Option::is_none")]
    pub date_less_than: Option<DateTime<Utc>>,
    #[serde(rename = "DateGreaterThan", default, skip_serializing_if = "Option::is_none")]
    pub date_greater_than: Option<DateTime<Utc>>,
    #[serde(rename = "StringLike", default, skip_serializing_if = "Option::is_none")]
    pub s3_prefix: Option<String>,
}

/// The runtime facts a condition is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub source_ip: Option<IpAddr>,
    pub now: DateTime<Utc>,
    pub object_key: Option<&'a str>,
}

impl Condition {
    fn matches(&self, ctx: &EvalContext<'_>) -> bool {
        if let Some(cidr) = &self.ip_address {
            let Some(ip) = ctx.source_ip else { return false };
            if !ip_in_cidr(ip, cidr) {
                return false;
            }
        }
        if let Some(before) = self.date_less_than {
            if ctx.now >= before {
                return false;
            }
        }
        if let Some(after) = self.date_greater_than {
            if ctx.now <= after {
                return false;
            }
        }
        if let Some(prefix) = &self.s3_prefix {
            match ctx.object_key {
                Some(key) if key.starts_with(prefix.trim_end_matches('*')) => {}
                _ => return false,
            }
        }
        true
    }
}

fn ip_in_cidr(ip: IpAddr, cidr: &str) -> bool {
    let IpAddr::V4(ip) = ip else { return false };
    let Some((base, bits)) = cidr.split_once('/') else {
        return cidr.parse::<std::net::Ipv4Addr>().is_ok_and(|b| b == ip);
    };
    let Ok(base) = base.parse::<std::net::Ipv4Addr>() else {
        return false;
    };
    let Ok(bits) = bits.parse::<u32>() else { return false };
    let mask = if bits == 0 { 0 } else { u32::MAX << (32 - bits) };
    (u32::from(ip) & mask) == (u32::from(base) & mask)
}

/// One `Effect`/`Principal`/`Action`/`Resource`/`Condition` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub effect: Effect,
    pub principal: Principal,
    pub action: Vec<String>,
    pub resource: Vec<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl Statement {
    fn matches(&self, caller_user_id: Option<&str>, action: &str, resource: &str, ctx: &EvalContext<'_>) -> bool {
        self.principal.matches(caller_user_id)
            && self.action.iter().any(|a| a == "*" || a == action)
            && self.resource.iter().any(|r| resource_matches(r, resource))
            && self.condition.as_ref().is_none_or(|c| c.matches(ctx))
    }
}

fn resource_matches(pattern: &str, resource: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        resource.starts_with(prefix)
    } else {
        pattern == resource
    }
}

/// A bucket policy document: an ordered set of statements. Evaluation
/// returns `Deny` if any statement explicitly denies, else `Allow` if any
/// statement allows, else `None` (no opinion) -- explicit `Deny` always wins
/// over `Allow` (§4.5 step 6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    #[must_use]
    pub fn evaluate(
        &self,
        caller_user_id: Option<&str>,
        action: &str,
        resource: &str,
        ctx: &EvalContext<'_>,
    ) -> Option<Effect> {
        let mut allowed = false;
        for stmt in &self.statements {
            if stmt.matches(caller_user_id, action, resource, ctx) {
                match stmt.effect {
                    Effect::Deny => return Some(Effect::Deny),
                    Effect::Allow => allowed = true,
                }
            }
        }
        if allowed { Some(Effect::Allow) } else { None }
    }
}
