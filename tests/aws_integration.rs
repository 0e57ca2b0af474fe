//! Integration tests against real AWS
//!
//! These tests require AWS credentials and will create real resources.
//! Run with: AWS_PROFILE=<profile> cargo test --test aws_integration -- --ignored

use std::process;
use std::time::Duration;

use anyhow::Result;
use seqctl::aws::{AwsContext, Ec2Client};
use seqctl::error::LifecycleError;
use seqctl::instance::{self, InstanceKind};
use seqctl::key::{self, KeyFileStore, KeyStore};
use seqctl::wait::Barrier;

const TEST_REGION: &str = "us-east-2";
const TEST_PREFIX: &str = "seqctl-test";

/// Names are suffixed with the test process id so concurrent runs do not
/// collide on the ownership-tag + name uniqueness invariant.
fn test_name(kind: &str) -> String {
    format!("{TEST_PREFIX}-{kind}-{}", process::id())
}

async fn ec2_client() -> Ec2Client {
    let ctx = AwsContext::new(TEST_REGION).await;
    Ec2Client::from_context(&ctx)
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn key_pair_round_trip() -> Result<()> {
    let ec2 = ec2_client().await;
    let dir = tempfile::tempdir()?;
    let store = KeyFileStore::new(dir.path());
    let name = test_name("key");

    let created = key::create_key_pair(&ec2, &store, &name).await?;
    assert_eq!(created.name, name);
    assert!(store.key_file(&name).path.exists());

    // A second create must warn without touching the file.
    let err = key::create_key_pair(&ec2, &store, &name).await.unwrap_err();
    assert!(err.is_warning());

    let listed = key::list_key_pairs(&ec2).await?;
    assert!(listed.iter().any(|key| key.name == name));

    let deleted = key::delete_key_pair(&ec2, &store, &name).await?;
    assert_eq!(deleted.name, name);
    assert!(!store.key_file(&name).path.exists());

    Ok(())
}

#[tokio::test]
#[ignore = "requires AWS credentials"]
async fn missing_instance_is_a_warning() -> Result<()> {
    let ec2 = ec2_client().await;

    let err = instance::fetch_instance(&ec2, &test_name("absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Warning { .. }));

    Ok(())
}

#[tokio::test]
#[ignore = "requires AWS credentials and launches a real instance"]
async fn instance_round_trip() -> Result<()> {
    let ec2 = ec2_client().await;
    let dir = tempfile::tempdir()?;
    let store = KeyFileStore::new(dir.path());
    let name = test_name("instance");
    let key_name = test_name("instance-key");

    key::create_key_pair(&ec2, &store, &key_name).await?;

    let security_group =
        std::env::var("SEQCTL_SECURITY_GROUP").expect("SEQCTL_SECURITY_GROUP must be set");

    let result = async {
        let barrier = Barrier::UntilRunning {
            interval: Duration::from_secs(10),
            retries: 30,
        };
        let created = instance::create_instance(
            &ec2,
            InstanceKind::Standard,
            &name,
            &key_name,
            &security_group,
            &barrier,
        )
        .await?;
        assert_eq!(created.name.as_deref(), Some(name.as_str()));
        assert_eq!(created.state, "running");
        assert!(created.public_ip_address.is_some());

        let terminated = instance::terminate_instance(&ec2, &name).await?;
        assert_eq!(terminated.id, created.id);

        Ok::<_, anyhow::Error>(())
    }
    .await;

    // Cleanup must run regardless of the round trip outcome.
    let _ = key::delete_key_pair(&ec2, &store, &key_name).await;

    result
}
