//! Raw dataset records as returned by `zfs_list`.

use zkit_nv::{NativeValue, NvList};

use crate::error::{ZfsError, ZfsResult};
use crate::property::RawProperties;

/// Object set type: none.
pub const DMU_OST_NONE: u64 = 0;
/// Object set type: pool metadata.
pub const DMU_OST_META: u64 = 1;
/// Object set type: filesystem or snapshot.
pub const DMU_OST_ZFS: u64 = 2;
/// Object set type: volume.
pub const DMU_OST_ZVOL: u64 = 3;

const KEY_STATS: &str = "dmu_objset_stats";
const KEY_NAME: &str = "name";
const KEY_PROPERTIES: &str = "properties";

/// Object-set statistics attached to each record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjsetStats {
    /// Transaction group the dataset was created in.
    pub creation_txg: u64,
    /// Unique identifier.
    pub guid: u64,
    /// Set while a receive into the dataset is incomplete.
    pub inconsistent: bool,
    /// Whether the record describes a snapshot.
    pub is_snapshot: bool,
    /// Number of clones of a snapshot.
    pub num_clones: u64,
    /// Origin snapshot of a clone.
    pub origin: String,
    /// DMU object-set type, one of the `DMU_OST_*` constants.
    pub dataset_type: u64,
}

impl ObjsetStats {
    fn from_native(list: &NvList) -> ZfsResult<Self> {
        Ok(Self {
            creation_txg: u64_field(list, "dds_creation_txg")?,
            guid: u64_field(list, "dds_guid")?,
            inconsistent: bool_field(list, "dds_inconsistent")?,
            is_snapshot: bool_field(list, "dds_is_snapshot")?,
            num_clones: u64_field(list, "dds_num_clones")?,
            origin: string_field(list, "dds_origin")?,
            dataset_type: u64_field(list, "dds_type")?,
        })
    }

    fn to_native(&self) -> NvList {
        NvList::new()
            .with("dds_creation_txg", self.creation_txg)
            .with("dds_guid", self.guid)
            .with("dds_inconsistent", self.inconsistent)
            .with("dds_is_snapshot", self.is_snapshot)
            .with("dds_num_clones", self.num_clones)
            .with("dds_origin", self.origin.as_str())
            .with("dds_type", self.dataset_type)
    }
}

fn field_error(field: &str, expected: &str, got: &NativeValue) -> ZfsError {
    ZfsError::MalformedRecord {
        field: field.to_string(),
        reason: format!("expected {}, got {}", expected, got.type_name()),
    }
}

fn u64_field(list: &NvList, key: &str) -> ZfsResult<u64> {
    match list.get(key) {
        None => Ok(0),
        Some(NativeValue::Uint64(v)) => Ok(*v),
        Some(other) => Err(field_error(key, "uint64", other)),
    }
}

fn bool_field(list: &NvList, key: &str) -> ZfsResult<bool> {
    match list.get(key) {
        None => Ok(false),
        Some(NativeValue::Boolean(v)) => Ok(*v),
        Some(other) => Err(field_error(key, "boolean", other)),
    }
}

fn string_field(list: &NvList, key: &str) -> ZfsResult<String> {
    match list.get(key) {
        None => Ok(String::new()),
        Some(NativeValue::String(v)) => Ok(v.clone()),
        Some(other) => Err(field_error(key, "string", other)),
    }
}

/// One dataset as reported by the kernel, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDatasetRecord {
    /// Object-set statistics.
    pub stats: ObjsetStats,
    /// Full dataset name.
    pub name: String,
    /// Typed property set.
    pub properties: RawProperties,
}

impl RawDatasetRecord {
    /// Decodes one record. A record without a name is malformed; every other
    /// missing field takes its zero value.
    pub fn from_native(list: &NvList) -> ZfsResult<Self> {
        let name = string_field(list, KEY_NAME)?;
        if name.is_empty() {
            return Err(ZfsError::MalformedRecord {
                field: KEY_NAME.to_string(),
                reason: "missing dataset name".to_string(),
            });
        }

        let stats = match list.get(KEY_STATS) {
            None => ObjsetStats::default(),
            Some(NativeValue::List(stats)) => ObjsetStats::from_native(stats)?,
            Some(other) => return Err(field_error(KEY_STATS, "list", other)),
        };
        let properties = match list.get(KEY_PROPERTIES) {
            None => RawProperties::default(),
            Some(NativeValue::List(props)) => RawProperties::from_native(props, &name)?,
            Some(other) => return Err(field_error(KEY_PROPERTIES, "list", other)),
        };

        Ok(Self {
            stats,
            name,
            properties,
        })
    }

    /// Encodes the record in its native layout.
    pub fn to_native(&self) -> NvList {
        NvList::new()
            .with(KEY_STATS, self.stats.to_native())
            .with(KEY_NAME, self.name.as_str())
            .with(KEY_PROPERTIES, self.properties.to_native(&self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertySource;

    fn sample() -> RawDatasetRecord {
        let mut record = RawDatasetRecord {
            name: "tank/home".to_string(),
            stats: ObjsetStats {
                creation_txg: 12,
                guid: 0xdead_beef,
                dataset_type: DMU_OST_ZFS,
                ..ObjsetStats::default()
            },
            ..RawDatasetRecord::default()
        };
        record.properties.used.value = 1 << 20;
        record.properties.mountpoint.value = "/home".to_string();
        record.properties.mountpoint.source = PropertySource::Local;
        record
    }

    #[test]
    fn test_round_trip_through_wire() {
        let record = sample();
        let bytes = zkit_nv::encode(&record.to_native());
        let decoded = zkit_nv::decode(&bytes).unwrap();
        assert_eq!(RawDatasetRecord::from_native(&decoded).unwrap(), record);
    }

    #[test]
    fn test_missing_sections_default() {
        let list = NvList::new().with("name", "tank");
        let record = RawDatasetRecord::from_native(&list).unwrap();
        assert_eq!(record.name, "tank");
        assert_eq!(record.stats, ObjsetStats::default());
        assert_eq!(record.properties, RawProperties::default());
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let list = NvList::new().with("properties", NvList::new());
        let err = RawDatasetRecord::from_native(&list).unwrap_err();
        assert!(matches!(err, ZfsError::MalformedRecord { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_stats_type_mismatch() {
        let list = NvList::new()
            .with("name", "tank")
            .with("dmu_objset_stats", NvList::new().with("dds_is_snapshot", 1u64));
        let err = RawDatasetRecord::from_native(&list).unwrap_err();
        assert!(
            matches!(err, ZfsError::MalformedRecord { ref field, .. } if field == "dds_is_snapshot")
        );
    }
}
