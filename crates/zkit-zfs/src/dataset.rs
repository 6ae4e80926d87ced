//! The dataset entity and the option types for lifecycle operations.

use serde::{Deserialize, Serialize};

use crate::error::{ZfsError, ZfsResult};
use crate::property::{self, PropertyValue};
use crate::record::{RawDatasetRecord, DMU_OST_ZVOL};

/// Kind of dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    /// A mountable filesystem.
    Filesystem,
    /// A block device volume.
    Volume,
    /// A read-only point-in-time snapshot.
    Snapshot,
}

impl DatasetType {
    /// Native type name.
    pub fn as_str(self) -> &'static str {
        match self {
            DatasetType::Filesystem => "filesystem",
            DatasetType::Volume => "volume",
            DatasetType::Snapshot => "snapshot",
        }
    }
}

/// Which dataset types a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    /// Filesystems only.
    Filesystem,
    /// Snapshots only.
    Snapshot,
    /// Volumes only.
    Volume,
    /// Every type.
    #[default]
    All,
}

impl TypeFilter {
    /// Native `type` parameter: a list naming each included type.
    pub fn type_set(self) -> &'static [&'static str] {
        match self {
            TypeFilter::Filesystem => &["filesystem"],
            TypeFilter::Snapshot => &["snapshot"],
            TypeFilter::Volume => &["volume"],
            TypeFilter::All => &["filesystem", "snapshot", "volume"],
        }
    }

    /// Whether `dataset_type` passes this filter.
    pub fn matches(self, dataset_type: DatasetType) -> bool {
        self.type_set().contains(&dataset_type.as_str())
    }
}

/// Options for [`crate::DatasetManager::destroy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestroyOptions {
    /// Destroy child datasets and snapshots first.
    pub recursive: bool,
    /// Destroy clones of this dataset's snapshots first.
    pub recursive_clones: bool,
    /// Unmount before destroying, even if busy.
    pub force_unmount: bool,
    /// Mark a snapshot for deferred destruction instead of failing while it
    /// still has clones or holds.
    pub deferred: bool,
}

/// Options for [`crate::DatasetManager::send`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    /// Send an incremental stream starting at this snapshot.
    pub from_snapshot: Option<String>,
    /// Allow blocks larger than 128 KiB in the stream.
    pub large_blocks: bool,
    /// Send embedded data blocks as-is.
    pub embedded: bool,
}

/// A dataset snapshot taken from one listing reply.
///
/// The value never changes after construction; fetch the dataset again to
/// observe later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Full dataset name, including `@snapshot` for snapshots.
    pub name: String,
    /// Kind of dataset.
    pub dataset_type: DatasetType,
    /// Snapshot this dataset was cloned from, or empty.
    pub origin: String,
    /// Bytes used by the dataset and its descendants.
    pub used: u64,
    /// Bytes available to the dataset.
    pub available: u64,
    /// Bytes written since the previous snapshot.
    pub written: u64,
    /// Bytes used before compression.
    pub logical_used: u64,
    /// Volume size in bytes; zero for other types.
    pub volsize: u64,
    /// Bytes used by the dataset itself.
    pub used_by_dataset: u64,
    /// Quota in bytes; zero means none.
    pub quota: u64,
    /// Compression algorithm; `off` when unset.
    pub compression: String,
    /// Mount path; `/<name>` when unset and empty for snapshots.
    pub mountpoint: String,
    #[serde(skip)]
    record: RawDatasetRecord,
}

impl Dataset {
    /// Interprets a raw record.
    pub fn from_record(record: RawDatasetRecord) -> Self {
        let props = &record.properties;
        let dataset_type = if record.stats.is_snapshot {
            DatasetType::Snapshot
        } else if record.stats.dataset_type == DMU_OST_ZVOL {
            DatasetType::Volume
        } else {
            DatasetType::Filesystem
        };

        let compression = if props.compression.value.is_empty() {
            "off".to_string()
        } else {
            props.compression.value.clone()
        };
        let origin = if props.origin.value.is_empty() {
            record.stats.origin.clone()
        } else {
            props.origin.value.clone()
        };
        let mountpoint = match dataset_type {
            DatasetType::Snapshot => String::new(),
            DatasetType::Filesystem | DatasetType::Volume => {
                if props.mountpoint.value.is_empty() {
                    format!("/{}", record.name)
                } else {
                    props.mountpoint.value.clone()
                }
            }
        };

        Self {
            name: record.name.clone(),
            dataset_type,
            origin,
            used: props.used.value,
            available: props.available.value,
            written: props.written.value,
            logical_used: props.logical_used.value,
            volsize: props.volsize.value,
            used_by_dataset: props.used_by_dataset.value,
            quota: props.quota.value,
            compression,
            mountpoint,
            record,
        }
    }

    /// The record this value was built from.
    pub fn record(&self) -> &RawDatasetRecord {
        &self.record
    }

    /// Whether this is a snapshot.
    pub fn is_snapshot(&self) -> bool {
        self.dataset_type == DatasetType::Snapshot
    }

    /// Looks up a property by native name, ignoring case.
    pub fn get_property(&self, name: &str) -> ZfsResult<PropertyValue> {
        property::lookup(&self.record.properties, name)
    }

    /// Changing properties is not supported by this library.
    pub fn set_property(&self, _name: &str, _value: PropertyValue) -> ZfsResult<()> {
        Err(ZfsError::NotImplemented {
            feature: "set_property",
        })
    }

    /// Names of datasets cloned from this snapshot.
    pub fn clone_names(&self) -> &[String] {
        &self.record.properties.clones.value
    }

    /// First path segment of the name.
    pub fn pool(&self) -> &str {
        pool_name(&self.name)
    }

    /// Name without any `@snapshot` or `#bookmark` suffix.
    pub fn filesystem_name(&self) -> &str {
        filesystem_name(&self.name)
    }
}

/// First path segment of a dataset name.
pub fn pool_name(name: &str) -> &str {
    let base = filesystem_name(name);
    base.split('/').next().unwrap_or(base)
}

/// Strips an `@snapshot` or `#bookmark` suffix.
pub fn filesystem_name(name: &str) -> &str {
    match name.find(['@', '#']) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Rejects an empty identifier.
pub fn require(argument: &'static str, value: &str) -> ZfsResult<()> {
    if value.is_empty() {
        return Err(ZfsError::MissingArgument { argument });
    }
    Ok(())
}

/// Basic shape check on a dataset name: non-empty path segments and at most
/// one snapshot or bookmark suffix.
pub fn validate_name(argument: &'static str, name: &str) -> ZfsResult<()> {
    require(argument, name)?;
    let invalid = |reason| ZfsError::InvalidArgument {
        argument: name.to_string(),
        reason,
    };

    if name.matches(['@', '#']).count() > 1 {
        return Err(invalid("more than one snapshot or bookmark delimiter"));
    }
    let base = filesystem_name(name);
    if base.split('/').any(str::is_empty) {
        return Err(invalid("empty path component"));
    }
    if base.len() + 1 == name.len() {
        return Err(invalid("empty snapshot or bookmark name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{PropStringWithSource, PropertySource};
    use crate::record::{ObjsetStats, DMU_OST_ZFS};

    fn record(name: &str, dmu: u64, snapshot: bool) -> RawDatasetRecord {
        RawDatasetRecord {
            name: name.to_string(),
            stats: ObjsetStats {
                dataset_type: dmu,
                is_snapshot: snapshot,
                ..ObjsetStats::default()
            },
            ..RawDatasetRecord::default()
        }
    }

    #[test]
    fn test_mountpoint_derived_from_name() {
        let ds = Dataset::from_record(record("tank/home", DMU_OST_ZFS, false));
        assert_eq!(ds.dataset_type, DatasetType::Filesystem);
        assert_eq!(ds.mountpoint, "/tank/home");
        assert_eq!(ds.compression, "off");
    }

    #[test]
    fn test_explicit_mountpoint_kept() {
        let mut rec = record("tank/home", DMU_OST_ZFS, false);
        rec.properties.mountpoint = PropStringWithSource {
            value: "/export/home".to_string(),
            source: PropertySource::Local,
        };
        rec.properties.compression.value = "zstd".to_string();
        let ds = Dataset::from_record(rec);
        assert_eq!(ds.mountpoint, "/export/home");
        assert_eq!(ds.compression, "zstd");
    }

    #[test]
    fn test_snapshot_has_no_mountpoint() {
        let mut rec = record("tank/home@monday", DMU_OST_ZFS, true);
        rec.properties.mountpoint.value = "/tank/home".to_string();
        let ds = Dataset::from_record(rec);
        assert!(ds.is_snapshot());
        assert_eq!(ds.mountpoint, "");
        assert_eq!(ds.filesystem_name(), "tank/home");
        assert_eq!(ds.pool(), "tank");
    }

    #[test]
    fn test_volume_type() {
        let mut rec = record("tank/vol", DMU_OST_ZVOL, false);
        rec.properties.volsize.value = 1 << 30;
        let ds = Dataset::from_record(rec);
        assert_eq!(ds.dataset_type, DatasetType::Volume);
        assert_eq!(ds.volsize, 1 << 30);
    }

    #[test]
    fn test_origin_prefers_property() {
        let mut rec = record("tank/clone", DMU_OST_ZFS, false);
        rec.stats.origin = "tank/stale@s".to_string();
        rec.properties.origin.value = "tank/fs@s".to_string();
        assert_eq!(Dataset::from_record(rec).origin, "tank/fs@s");

        let mut rec = record("tank/clone", DMU_OST_ZFS, false);
        rec.stats.origin = "tank/fs@s".to_string();
        assert_eq!(Dataset::from_record(rec).origin, "tank/fs@s");
    }

    #[test]
    fn test_written_read_from_written_property() {
        let mut rec = record("tank", DMU_OST_ZFS, false);
        rec.properties.available.value = 100;
        rec.properties.written.value = 7;
        let ds = Dataset::from_record(rec);
        assert_eq!(ds.available, 100);
        assert_eq!(ds.written, 7);
    }

    #[test]
    fn test_property_access() {
        let mut rec = record("tank", DMU_OST_ZFS, false);
        rec.properties.used.value = 42;
        let ds = Dataset::from_record(rec);
        assert_eq!(ds.get_property("Used").unwrap().as_u64(), Some(42));
        assert!(matches!(
            ds.get_property("bogus"),
            Err(ZfsError::UnknownProperty { .. })
        ));
        assert!(matches!(
            ds.set_property("used", PropertyValue::Uint64(1)),
            Err(ZfsError::NotImplemented { .. })
        ));
    }

    #[test]
    fn test_serde_skips_record() {
        let ds = Dataset::from_record(record("tank/a", DMU_OST_ZFS, false));
        let json = serde_json::to_value(&ds).unwrap();
        assert_eq!(json["name"], "tank/a");
        assert_eq!(json["dataset_type"], "filesystem");
        assert!(json.get("record").is_none());
    }

    #[test]
    fn test_type_filter_sets() {
        assert_eq!(TypeFilter::All.type_set().len(), 3);
        assert!(TypeFilter::Snapshot.matches(DatasetType::Snapshot));
        assert!(!TypeFilter::Volume.matches(DatasetType::Filesystem));
    }

    #[test]
    fn test_name_helpers() {
        assert_eq!(pool_name("tank/a/b@s"), "tank");
        assert_eq!(pool_name("tank"), "tank");
        assert_eq!(filesystem_name("tank/a#mark"), "tank/a");
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "tank/a@s").is_ok());
        assert!(matches!(
            validate_name("name", ""),
            Err(ZfsError::MissingArgument { argument: "name" })
        ));
        assert!(validate_name("name", "tank//a").is_err());
        assert!(validate_name("name", "tank/a@").is_err());
        assert!(validate_name("name", "tank/a@s@t").is_err());
        assert!(validate_name("name", "/tank").is_err());
    }
}
