//! Route 53 client for hosted-zone and record-set operations
//!
//! [`Route53Api`] mirrors [`Ec2Api`](crate::aws::ec2::Ec2Api): the DNS
//! manager is written against the trait and tested with its mock, while
//! [`Route53Client`] does the SDK calls.

use aws_sdk_route53::error::BuildError;
use aws_sdk_route53::types::{
    Change, ChangeBatch, ResourceRecord as SdkResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client;
use tracing::{debug, info};

use crate::aws::context::AwsContext;
use crate::dns::{HostedZone, RecordChange, RecordPage, ResourceRecord};
use crate::error::CloudError;

/// Route 53 operations the DNS manager depends on.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait Route53Api: Send + Sync {
    /// List hosted zones whose name sorts at or after `dns_name`, up to
    /// `max_items` of them.
    async fn list_hosted_zones_by_name(
        &self,
        dns_name: &str,
        max_items: i32,
    ) -> Result<Vec<HostedZone>, CloudError>;

    /// List A records in a zone starting at `record_name`, up to `max_items`
    /// of them.
    async fn list_record_sets(
        &self,
        zone_id: &str,
        record_name: &str,
        max_items: i32,
    ) -> Result<RecordPage, CloudError>;

    /// Apply a single record change to a zone.
    async fn change_record_set(&self, zone_id: &str, change: RecordChange)
        -> Result<(), CloudError>;
}

/// Route 53 client bound to the account's SDK config.
pub struct Route53Client {
    client: Client,
}

impl Route53Client {
    /// Create a Route 53 client from a pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.route53_client(),
        }
    }
}

fn invalid_change(err: BuildError) -> CloudError {
    CloudError::new(format!("invalid record change: {err}"))
}

impl Route53Api for Route53Client {
    async fn list_hosted_zones_by_name(
        &self,
        dns_name: &str,
        max_items: i32,
    ) -> Result<Vec<HostedZone>, CloudError> {
        debug!(dns_name = %dns_name, "listing hosted zones");

        let response = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(dns_name)
            .max_items(max_items)
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        Ok(response
            .hosted_zones()
            .iter()
            .map(HostedZone::from_sdk)
            .collect())
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        record_name: &str,
        max_items: i32,
    ) -> Result<RecordPage, CloudError> {
        debug!(zone_id = %zone_id, record_name = %record_name, "listing record sets");

        let response = self
            .client
            .list_resource_record_sets()
            .hosted_zone_id(zone_id)
            .start_record_name(record_name)
            .start_record_type(RrType::A)
            .max_items(max_items)
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        let records = response
            .resource_record_sets()
            .iter()
            .map(ResourceRecord::from_sdk)
            .collect::<Result<Vec<_>, CloudError>>()?;

        Ok(RecordPage {
            records,
            is_truncated: response.is_truncated(),
        })
    }

    async fn change_record_set(
        &self,
        zone_id: &str,
        change: RecordChange,
    ) -> Result<(), CloudError> {
        info!(
            zone_id = %zone_id,
            operation = %change.operation,
            fqdn = %change.fqdn,
            ip = %change.ip,
            "changing record set"
        );

        let record_set = ResourceRecordSet::builder()
            .name(&change.fqdn)
            .r#type(RrType::A)
            .ttl(change.ttl)
            .resource_records(
                SdkResourceRecord::builder()
                    .value(&change.ip)
                    .build()
                    .map_err(invalid_change)?,
            )
            .build()
            .map_err(invalid_change)?;
        let change = Change::builder()
            .action(change.operation.as_change_action())
            .resource_record_set(record_set)
            .build()
            .map_err(invalid_change)?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(invalid_change)?;

        self.client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        Ok(())
    }
}
