//! DNS record operations
//!
//! A records live inside the hosted zone owning the last two labels of their
//! name. Every operation resolves the zone first, then works on a single
//! record; larger zones than one page are out of scope and reported as
//! errors, never paginated through.
//!
//! The provider's wire format appends a trailing stop to every name. It is
//! stripped on every ingress path and never emitted, so all comparisons in
//! this module are stop-free.

use std::str::FromStr;

use aws_sdk_route53::types::{ChangeAction, HostedZone as SdkHostedZone, ResourceRecordSet};
use serde::Serialize;

use crate::aws::route53::Route53Api;
use crate::error::{CloudError, ErrorCode, LifecycleError, Result};

/// TTL applied to every A record this tool writes.
pub const RECORD_TTL: i64 = 300;

/// Page size used when listing records without an explicit limit.
pub const DEFAULT_MAX_ITEMS: i32 = 1000;

/// A fully qualified name split into its owning domain and the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    /// Last two labels, e.g. `example.com`.
    pub domain: String,
    /// Everything before the domain, e.g. `host.a` for `host.a.example.com`.
    pub subdomain: Option<String>,
}

/// Split `name` into domain (last two labels) and subdomain (the rest).
///
/// A trailing stop is rejected rather than normalized away: callers hold
/// stop-free names, so one arriving here is a caller bug. A missing
/// subdomain is an error unless the caller only needs a domain lookup.
pub fn parse_domain_name(name: &str, require_subdomain: bool) -> Result<DomainName> {
    if name.ends_with('.') {
        return Err(LifecycleError::error(
            ErrorCode::DomainNameInvalid,
            format!("Invalid domain name '{name}', trailing stop should be omitted"),
        ));
    }

    let tokens: Vec<&str> = name.split('.').collect();
    if tokens.len() < 2 {
        return Err(LifecycleError::error(
            ErrorCode::DomainNameInvalid,
            format!("Invalid domain name '{name}'"),
        ));
    }

    let domain = tokens[tokens.len() - 2..].join(".");
    let subdomain = if tokens.len() > 2 {
        Some(tokens[..tokens.len() - 2].join("."))
    } else {
        None
    };

    if subdomain.is_none() && require_subdomain {
        return Err(LifecycleError::error(
            ErrorCode::DomainNameInvalid,
            format!("Subdomain required but received '{name}'"),
        ));
    }

    Ok(DomainName { domain, subdomain })
}

fn strip_stop(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// Provider container for all records under one domain suffix.
///
/// Zones are resolved, never created, by this tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedZone {
    pub id: String,
    pub fqdn: String,
}

impl HostedZone {
    pub(crate) fn from_sdk(zone: &SdkHostedZone) -> Self {
        // The provider reports ids as /hostedzone/{id}.
        let id = zone
            .id()
            .strip_prefix("/hostedzone/")
            .unwrap_or(zone.id())
            .to_string();

        Self {
            id,
            fqdn: strip_stop(zone.name()).to_string(),
        }
    }
}

/// One A record as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRecord {
    pub fqdn: String,
    pub ip: String,
    pub record_type: String,
}

impl ResourceRecord {
    pub(crate) fn from_sdk(set: &ResourceRecordSet) -> std::result::Result<Self, CloudError> {
        let ip = set
            .resource_records()
            .first()
            .map(|record| record.value())
            .ok_or_else(|| CloudError::new("record set carried no resource records"))?;

        Ok(Self {
            fqdn: strip_stop(set.name()).to_string(),
            ip: ip.to_string(),
            record_type: set.r#type().as_str().to_string(),
        })
    }
}

/// One page of records, as returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    pub records: Vec<ResourceRecord>,
    pub is_truncated: bool,
}

/// Mutation applied to an A record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOperation {
    Create,
    Delete,
}

impl RecordOperation {
    pub(crate) fn as_change_action(self) -> ChangeAction {
        match self {
            Self::Create => ChangeAction::Create,
            Self::Delete => ChangeAction::Delete,
        }
    }
}

impl FromStr for RecordOperation {
    type Err = LifecycleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATE" => Ok(Self::Create),
            "DELETE" => Ok(Self::Delete),
            _ => Err(LifecycleError::error(
                ErrorCode::DnsInvalidRecordOperation,
                format!("Invalid operation on an A record operation '{s}'"),
            )),
        }
    }
}

impl std::fmt::Display for RecordOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
        })
    }
}

/// Single-record change submitted to a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    pub operation: RecordOperation,
    pub fqdn: String,
    pub ip: String,
    pub ttl: i64,
}

/// Resolve the hosted zone owning `fqdn`'s domain.
pub async fn describe_hosted_zone(r53: &impl Route53Api, fqdn: &str) -> Result<HostedZone> {
    let name = parse_domain_name(fqdn, false)?;

    let mut zones = r53.list_hosted_zones_by_name(&name.domain, 1).await?;
    if zones.len() != 1 {
        return Err(LifecycleError::error(
            ErrorCode::DomainNameInvalid,
            format!(
                "Error getting host id from route 53 for '{fqdn}': {} zones",
                zones.len()
            ),
        ));
    }

    // Zone listing starts at the requested name rather than matching it, so
    // a zone coming back at all does not mean it is the right one.
    let zone = zones.swap_remove(0);
    if zone.fqdn != name.domain {
        return Err(LifecycleError::error(
            ErrorCode::DomainNameNotFound,
            format!("Error getting host id from route 53 for '{fqdn}'"),
        ));
    }

    Ok(zone)
}

/// Apply `operation` to the A record `fqdn -> ip` in its owning zone.
pub async fn change_a_record(
    r53: &impl Route53Api,
    operation: RecordOperation,
    fqdn: &str,
    ip: &str,
) -> Result<()> {
    let zone = describe_hosted_zone(r53, fqdn).await?;

    let change = RecordChange {
        operation,
        fqdn: fqdn.to_string(),
        ip: ip.to_string(),
        ttl: RECORD_TTL,
    };

    Ok(r53.change_record_set(&zone.id, change).await?)
}

/// Create the A record `fqdn -> ip`.
pub async fn create_a_record(r53: &impl Route53Api, fqdn: &str, ip: &str) -> Result<()> {
    change_a_record(r53, RecordOperation::Create, fqdn, ip).await
}

/// Delete the A record for `fqdn`.
///
/// The record is looked up first and deleted with the address on file, so a
/// stale caller-supplied address can never be submitted.
pub async fn delete_a_record(r53: &impl Route53Api, fqdn: &str) -> Result<ResourceRecord> {
    let record = describe_a_record(r53, fqdn).await?;

    change_a_record(r53, RecordOperation::Delete, fqdn, &record.ip).await?;

    Ok(record)
}

/// List up to `max_items` A records starting at `fqdn`.
///
/// A truncated provider response means the zone holds more records than this
/// tool is prepared to reason about, and is an error.
pub async fn list_a_records(
    r53: &impl Route53Api,
    fqdn: &str,
    max_items: i32,
) -> Result<Vec<ResourceRecord>> {
    let zone = describe_hosted_zone(r53, fqdn).await?;

    let page = r53.list_record_sets(&zone.id, fqdn, max_items).await?;
    if page.is_truncated {
        return Err(LifecycleError::error(
            ErrorCode::DnsUnexpectedNumberOfRecords,
            format!("Number of records exceeded {max_items}"),
        ));
    }

    Ok(page.records)
}

/// Look up exactly the A record named `fqdn`.
pub async fn describe_a_record(r53: &impl Route53Api, fqdn: &str) -> Result<ResourceRecord> {
    let zone = describe_hosted_zone(r53, fqdn).await?;

    let mut page = r53.list_record_sets(&zone.id, fqdn, 1).await?;
    if page.records.len() != 1 {
        return Err(LifecycleError::error(
            ErrorCode::DnsUnexpectedNumberOfRecords,
            format!(
                "Expected 1 record for '{fqdn}' received {}",
                page.records.len()
            ),
        ));
    }

    // Record listing also starts at the requested name; a different name
    // coming back means the requested record does not exist.
    let record = page.records.swap_remove(0);
    if record.fqdn != fqdn {
        return Err(LifecycleError::error(
            ErrorCode::DnsRecordNotFound,
            format!("Did not find DNS Record for '{fqdn}'"),
        ));
    }

    Ok(record)
}
