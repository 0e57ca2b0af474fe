//! Ownership tag constants and discovery filters
//!
//! Every resource this tool creates is tagged with the deployment ownership
//! tag, and every listing call filters on it, so discovery only ever sees
//! resources this deployment owns.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `Deployment` | Static ownership marker ("Sequencer") |
//! | `Name` | Operator-chosen instance name (instances only) |

use aws_sdk_ec2::types::{Filter, ResourceType, Tag as SdkTag, TagSpecification};
use serde::Serialize;

/// Tag key for deployment ownership - all managed resources have this.
pub const TAG_DEPLOYMENT: &str = "Deployment";

/// Tag value identifying this deployment.
pub const TAG_DEPLOYMENT_VALUE: &str = "Sequencer";

/// Tag key for the operator-chosen resource name.
pub const TAG_NAME: &str = "Name";

/// Key/value pair attached to a managed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// The ownership tag carried by every managed resource.
    pub fn deployment() -> Self {
        Tag::new(TAG_DEPLOYMENT, TAG_DEPLOYMENT_VALUE)
    }
}

/// Find the value of the first tag with the given key.
///
/// First match wins; a missing tag yields `None`, never an error.
pub fn find_tag<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter().find(|t| t.key == key).map(|t| t.value.as_str())
}

/// Convert provider tags, dropping entries missing a key or value.
pub fn from_sdk_tags(tags: &[SdkTag]) -> Vec<Tag> {
    tags.iter()
        .filter_map(|t| match (t.key(), t.value()) {
            (Some(key), Some(value)) => Some(Tag::new(key, value)),
            _ => None,
        })
        .collect()
}

/// Filters for instance discovery: ownership tag, non-terminal lifecycle
/// states, and an exact name when one is given.
pub fn instance_filters(instance_name: Option<&str>) -> Vec<Filter> {
    let mut filters = vec![
        Filter::builder()
            .name(format!("tag:{TAG_DEPLOYMENT}"))
            .values(TAG_DEPLOYMENT_VALUE)
            .build(),
        Filter::builder()
            .name("instance-state-name")
            .values("pending")
            .values("running")
            .build(),
    ];

    if let Some(name) = instance_name {
        filters.push(
            Filter::builder()
                .name(format!("tag:{TAG_NAME}"))
                .values(name)
                .build(),
        );
    }

    filters
}

/// Filters for key-pair discovery: ownership tag only.
pub fn key_pair_filters() -> Vec<Filter> {
    vec![Filter::builder()
        .name(format!("tag:{TAG_DEPLOYMENT}"))
        .values(TAG_DEPLOYMENT_VALUE)
        .build()]
}

/// Build an EC2 TagSpecification carrying the ownership tag plus an optional
/// Name tag.
pub fn ec2_tag_spec(resource_type: ResourceType, name: Option<&str>) -> TagSpecification {
    let mut builder = TagSpecification::builder().resource_type(resource_type).tags(
        SdkTag::builder()
            .key(TAG_DEPLOYMENT)
            .value(TAG_DEPLOYMENT_VALUE)
            .build(),
    );

    if let Some(name) = name {
        builder = builder.tags(SdkTag::builder().key(TAG_NAME).value(name).build());
    }

    builder.build()
}
