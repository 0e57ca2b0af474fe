//! Key pair operations
//!
//! A key pair lives in two places at once: the provider holds the public
//! half, a local `.pem` file holds the private material. The operations here
//! keep the two sides in lockstep and refuse to clobber either one.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use aws_sdk_ec2::types::KeyPairInfo;
use serde::Serialize;

use crate::aws::ec2::Ec2Api;
use crate::aws::tags::{from_sdk_tags, Tag};
use crate::error::{CloudError, ErrorCode, LifecycleError, Result};

/// Provider error code for creating a key pair that already exists.
const PROVIDER_DUPLICATE_KEY: &str = "InvalidKeyPair.Duplicate";
/// Provider error code for looking up a key pair that does not exist.
const PROVIDER_KEY_NOT_FOUND: &str = "InvalidKeyPair.NotFound";

/// Account the key material logs in as.
const KEY_USERNAME: &str = "ec2-user";

/// Provider-side view of one owned key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Key {
    pub name: String,
    pub tags: Vec<Tag>,
}

impl Key {
    pub(crate) fn from_sdk(info: &KeyPairInfo) -> std::result::Result<Self, CloudError> {
        let name = info
            .key_name()
            .ok_or_else(|| CloudError::new("key pair record missing KeyName"))?;
        let sdk_tags = info
            .tags
            .as_deref()
            .ok_or_else(|| CloudError::new("key pair record missing Tags"))?;

        Ok(Self {
            name: name.to_string(),
            tags: from_sdk_tags(sdk_tags),
        })
    }
}

/// Local private key material for one key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyFile {
    pub path: PathBuf,
    pub username: String,
}

/// Storage for private key material.
#[cfg_attr(test, mockall::automock)]
pub trait KeyStore {
    /// Write fresh key material, refusing to overwrite an existing file.
    fn create(&self, name: &str, material: &str) -> Result<KeyFile>;

    /// Remove the key file. A file that is already gone counts as removed.
    fn delete(&self, name: &str) -> Result<KeyFile>;

    /// Where the key material for `name` lives.
    fn key_file(&self, name: &str) -> KeyFile;
}

/// Key store over a folder of `<name>.pem` files.
#[derive(Debug, Clone)]
pub struct KeyFileStore {
    folder: PathBuf,
}

impl KeyFileStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }
}

impl KeyStore for KeyFileStore {
    fn create(&self, name: &str, material: &str) -> Result<KeyFile> {
        let key_file = self.key_file(name);

        // Exclusive create: losing material silently would strand the
        // provider-side key pair.
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&key_file.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LifecycleError::error(
                    ErrorCode::KeyFileExists,
                    format!("Key file {} already exists", key_file.path.display()),
                ));
            }
            Err(err) => {
                return Err(LifecycleError::KeyFile {
                    path: key_file.path,
                    source: err,
                });
            }
        };

        if let Err(err) = file.write_all(material.as_bytes()) {
            return Err(LifecycleError::KeyFile {
                path: key_file.path,
                source: err,
            });
        }

        Ok(key_file)
    }

    fn delete(&self, name: &str) -> Result<KeyFile> {
        let key_file = self.key_file(name);

        match fs::remove_file(&key_file.path) {
            Ok(()) => Ok(key_file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(key_file),
            Err(err) => Err(LifecycleError::KeyFile {
                path: key_file.path,
                source: err,
            }),
        }
    }

    fn key_file(&self, name: &str) -> KeyFile {
        KeyFile {
            path: self.folder.join(format!("{name}.pem")),
            username: KEY_USERNAME.to_string(),
        }
    }
}

async fn describe_key_pairs(ec2: &impl Ec2Api, key_name: Option<&str>) -> Result<Vec<Key>> {
    match ec2.describe_key_pairs(key_name.map(str::to_string)).await {
        Ok(keys) => Ok(keys),
        Err(err) if err.code() == Some(PROVIDER_KEY_NOT_FOUND) => Err(LifecycleError::warning(
            ErrorCode::KeyMissing,
            err.to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

/// Create a key pair and write its material through `store`.
pub async fn create_key_pair(
    ec2: &impl Ec2Api,
    store: &impl KeyStore,
    key_name: &str,
) -> Result<Key> {
    let created = match ec2.create_key_pair(key_name).await {
        Ok(created) => created,
        Err(err) if err.code() == Some(PROVIDER_DUPLICATE_KEY) => {
            return Err(LifecycleError::warning(
                ErrorCode::KeyDuplicate,
                err.to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    store.create(&created.name, &created.material)?;

    Ok(Key {
        name: created.name,
        tags: Vec::new(),
    })
}

/// Delete a key pair on both sides, returning its last provider-side view.
///
/// The provider deletion is verified with a second lookup before the local
/// file is touched, so a failed deletion leaves the material on disk.
pub async fn delete_key_pair(
    ec2: &impl Ec2Api,
    store: &impl KeyStore,
    key_name: &str,
) -> Result<Key> {
    let mut keys = describe_key_pairs(ec2, Some(key_name)).await?;
    if keys.len() != 1 {
        return Err(LifecycleError::error(
            ErrorCode::KeyMissing,
            format!("Found not exactly one key {key_name} to delete"),
        ));
    }
    let key = keys.swap_remove(0);

    ec2.delete_key_pair(key_name).await?;

    match describe_key_pairs(ec2, Some(key_name)).await {
        Ok(remaining) => {
            if !remaining.is_empty() {
                return Err(LifecycleError::error(
                    ErrorCode::KeyDeleteFail,
                    format!("Key '{key_name}' was not deleted"),
                ));
            }
        }
        Err(err) if err.is_warning() && err.code() == Some(ErrorCode::KeyMissing) => {}
        Err(err) => return Err(err),
    }

    store.delete(key_name)?;

    Ok(key)
}

/// List every owned key pair.
pub async fn list_key_pairs(ec2: &impl Ec2Api) -> Result<Vec<Key>> {
    describe_key_pairs(ec2, None).await
}

#[cfg(test)]
mod tests {
    use aws_sdk_ec2::types::Tag as SdkTag;
    use mockall::predicate::eq;

    use super::*;
    use crate::aws::ec2::{CreatedKeyPair, MockEc2Api};
    use crate::aws::tags::{TAG_DEPLOYMENT, TAG_DEPLOYMENT_VALUE};

    fn key(name: &str) -> Key {
        Key {
            name: name.to_string(),
            tags: vec![Tag::deployment()],
        }
    }

    fn stored_file(name: &str) -> KeyFile {
        KeyFile {
            path: PathBuf::from(format!("folder/{name}.pem")),
            username: "ec2-user".to_string(),
        }
    }

    #[test]
    fn from_sdk_maps_provider_fields() {
        let info = KeyPairInfo::builder()
            .key_name("sequencer-key")
            .set_tags(Some(vec![SdkTag::builder()
                .key(TAG_DEPLOYMENT)
                .value(TAG_DEPLOYMENT_VALUE)
                .build()]))
            .build();

        let got = Key::from_sdk(&info).unwrap();
        assert_eq!(got.name, "sequencer-key");
        assert_eq!(got.tags, vec![Tag::deployment()]);
    }

    #[test]
    fn from_sdk_rejects_incomplete_records() {
        let missing_name = KeyPairInfo::builder().set_tags(Some(vec![])).build();
        assert!(Key::from_sdk(&missing_name).is_err());

        let missing_tags = KeyPairInfo::builder().key_name("sequencer-key").build();
        assert!(Key::from_sdk(&missing_tags).is_err());
    }

    #[test]
    fn file_store_places_keys_in_its_folder() {
        let store = KeyFileStore::new("folder");
        let got = store.key_file("name");

        assert_eq!(got.path, PathBuf::from("folder/name.pem"));
        assert_eq!(got.username, "ec2-user");
    }

    #[test]
    fn file_store_create_writes_material_once() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = KeyFileStore::new(dir.path());

        let got = store.create("name", "material").unwrap();
        assert_eq!(got.path, dir.path().join("name.pem"));
        assert_eq!(fs::read_to_string(&got.path).unwrap(), "material");

        let mode = fs::metadata(&got.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let err = store.create("name", "other material").unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyFileExists));
        assert!(!err.is_warning());
        assert_eq!(fs::read_to_string(&got.path).unwrap(), "material");
    }

    #[test]
    fn file_store_delete_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyFileStore::new(dir.path());

        store.create("name", "material").unwrap();
        let got = store.delete("name").unwrap();
        assert!(!got.path.exists());

        // Second delete finds nothing and still succeeds.
        store.delete("name").unwrap();
    }

    #[tokio::test]
    async fn create_key_pair_writes_material_through_the_store() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_create_key_pair()
            .with(eq("sequencer-key"))
            .times(1)
            .returning(|name| {
                Ok(CreatedKeyPair {
                    name: name.to_string(),
                    material: "PEM MATERIAL".to_string(),
                })
            });
        let mut store = MockKeyStore::new();
        store
            .expect_create()
            .withf(|name, material| name == "sequencer-key" && material == "PEM MATERIAL")
            .times(1)
            .returning(|name, _| Ok(stored_file(name)));

        let got = create_key_pair(&ec2, &store, "sequencer-key").await.unwrap();
        assert_eq!(got.name, "sequencer-key");
        assert_eq!(got.tags, Vec::new());
    }

    #[tokio::test]
    async fn create_key_pair_warns_on_duplicates() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_create_key_pair().returning(|_| {
            Err(CloudError::with_code(
                "InvalidKeyPair.Duplicate",
                "keypair already exists",
            ))
        });
        let mut store = MockKeyStore::new();
        store.expect_create().times(0);

        let err = create_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyDuplicate));
        assert!(err.is_warning());
    }

    #[tokio::test]
    async fn create_key_pair_propagates_store_failures() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_create_key_pair().returning(|name| {
            Ok(CreatedKeyPair {
                name: name.to_string(),
                material: "PEM MATERIAL".to_string(),
            })
        });
        let mut store = MockKeyStore::new();
        store.expect_create().times(1).returning(|name, _| {
            Err(LifecycleError::error(
                ErrorCode::KeyFileExists,
                format!("Key file folder/{name}.pem already exists"),
            ))
        });

        let err = create_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyFileExists));
    }

    #[tokio::test]
    async fn delete_key_pair_verifies_before_touching_the_file() {
        let mut seq = mockall::Sequence::new();
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .with(eq(Some("sequencer-key".to_string())))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![key("sequencer-key")]));
        ec2.expect_delete_key_pair()
            .with(eq("sequencer-key"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        ec2.expect_describe_key_pairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(CloudError::with_code(
                    "InvalidKeyPair.NotFound",
                    "keypair gone",
                ))
            });
        let mut store = MockKeyStore::new();
        store
            .expect_delete()
            .with(eq("sequencer-key"))
            .times(1)
            .returning(|name| Ok(stored_file(name)));

        let got = delete_key_pair(&ec2, &store, "sequencer-key").await.unwrap();
        assert_eq!(got, key("sequencer-key"));
    }

    #[tokio::test]
    async fn delete_key_pair_accepts_an_empty_second_lookup() {
        let mut seq = mockall::Sequence::new();
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![key("sequencer-key")]));
        ec2.expect_delete_key_pair()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        ec2.expect_describe_key_pairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![]));
        let mut store = MockKeyStore::new();
        store
            .expect_delete()
            .times(1)
            .returning(|name| Ok(stored_file(name)));

        delete_key_pair(&ec2, &store, "sequencer-key").await.unwrap();
    }

    #[tokio::test]
    async fn delete_key_pair_rejects_unknown_keys() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs().times(1).returning(|_| {
            Err(CloudError::with_code(
                "InvalidKeyPair.NotFound",
                "no such keypair",
            ))
        });
        ec2.expect_delete_key_pair().times(0);
        let mut store = MockKeyStore::new();
        store.expect_delete().times(0);

        let err = delete_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyMissing));
        assert!(err.is_warning());
    }

    #[tokio::test]
    async fn delete_key_pair_requires_exactly_one_match() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .times(1)
            .returning(|_| Ok(vec![]));
        ec2.expect_delete_key_pair().times(0);
        let mut store = MockKeyStore::new();
        store.expect_delete().times(0);

        let err = delete_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyMissing));
        assert!(!err.is_warning());
        assert_eq!(
            err.to_string(),
            "KEY_MISSING: Found not exactly one key sequencer-key to delete"
        );
    }

    #[tokio::test]
    async fn delete_key_pair_flags_keys_that_survive_deletion() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .times(2)
            .returning(|_| Ok(vec![key("sequencer-key")]));
        ec2.expect_delete_key_pair().times(1).returning(|_| Ok(()));
        let mut store = MockKeyStore::new();
        store.expect_delete().times(0);

        let err = delete_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::KeyDeleteFail));
        assert_eq!(
            err.to_string(),
            "KEY_DELETE_FAIL: Key 'sequencer-key' was not deleted"
        );
    }

    #[tokio::test]
    async fn delete_key_pair_propagates_second_lookup_failures() {
        let mut seq = mockall::Sequence::new();
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![key("sequencer-key")]));
        ec2.expect_delete_key_pair()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        ec2.expect_describe_key_pairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CloudError::new("describe failed")));
        let mut store = MockKeyStore::new();
        store.expect_delete().times(0);

        let err = delete_key_pair(&ec2, &store, "sequencer-key")
            .await
            .unwrap_err();
        assert_eq!(err.code(), None);
    }

    #[tokio::test]
    async fn list_key_pairs_returns_everything_owned() {
        let mut ec2 = MockEc2Api::new();
        ec2.expect_describe_key_pairs()
            .with(eq(None::<String>))
            .times(1)
            .returning(|_| Ok(vec![key("a"), key("b")]));

        let got = list_key_pairs(&ec2).await.unwrap();
        assert_eq!(got, vec![key("a"), key("b")]);
    }
}
