//! Property-based tests for the property schema and dataset records.

use proptest::prelude::*;
use zkit_zfs::property::{PropStringWithSource, PropUint64WithSource};
use zkit_zfs::record::{DMU_OST_ZFS, DMU_OST_ZVOL};
use zkit_zfs::{
    Dataset, DatasetProperty, DatasetType, ObjsetStats, PropertySource, RawDatasetRecord,
    RawProperties,
};

fn any_dataset_name() -> impl Strategy<Value = String> {
    "p[a-z0-9]{0,7}(/[a-z0-9_]{1,8}){0,3}"
}

fn any_source() -> impl Strategy<Value = PropertySource> {
    prop_oneof![
        Just(PropertySource::Local),
        Just(PropertySource::Default),
        Just(PropertySource::Temporary),
        Just(PropertySource::Received),
        Just(PropertySource::None),
        "[a-z]{1,6}/[a-z]{1,6}".prop_map(PropertySource::Inherited),
    ]
}

prop_compose! {
    fn any_record()(
        name in any_dataset_name(),
        snapshot in proptest::option::of("[a-z0-9]{1,8}"),
        volume in any::<bool>(),
        used in any::<u64>(),
        written in any::<u64>(),
        quota in any::<u64>(),
        quota_source in any_source(),
        compression in "(|off|lz4|zstd)",
        compression_source in any_source(),
        mountpoint in "(|/[a-z]{1,8})",
        clones in proptest::collection::btree_set("[a-z]{1,6}/[a-z]{1,6}", 0..3),
        txg in any::<u64>(),
    ) -> RawDatasetRecord {
        let is_snapshot = snapshot.is_some();
        let name = match snapshot {
            Some(snap) => format!("{}@{}", name, snap),
            None => name,
        };
        let mut properties = RawProperties::default();
        properties.used.value = used;
        properties.written.value = written;
        properties.create_txg.value = txg;
        properties.quota = PropUint64WithSource { value: quota, source: quota_source };
        properties.compression = PropStringWithSource {
            value: compression,
            source: compression_source,
        };
        properties.mountpoint.value = mountpoint;
        properties.clones.value = clones.into_iter().collect();
        RawDatasetRecord {
            stats: ObjsetStats {
                creation_txg: txg,
                is_snapshot,
                dataset_type: if volume { DMU_OST_ZVOL } else { DMU_OST_ZFS },
                ..ObjsetStats::default()
            },
            name,
            properties,
        }
    }
}

proptest! {
    #[test]
    fn prop_record_round_trips_through_wire(record in any_record()) {
        let encoded = zkit_nv::encode(&record.to_native());
        let decoded = zkit_nv::decode(&encoded).unwrap();
        let reparsed = RawDatasetRecord::from_native(&decoded).unwrap();
        prop_assert_eq!(reparsed.name, record.name.clone());
        prop_assert_eq!(reparsed.stats, record.stats.clone());
        prop_assert_eq!(reparsed.properties.used, record.properties.used.clone());
        prop_assert_eq!(reparsed.properties.clones, record.properties.clones.clone());
        prop_assert_eq!(reparsed.properties.quota.value, record.properties.quota.value);
    }

    #[test]
    fn prop_source_resolution_inverts(source in any_source(), dataset in any_dataset_name()) {
        let expected = match &source {
            PropertySource::Inherited(from) if *from == dataset => PropertySource::Local,
            other => other.clone(),
        };
        match source.to_native(&dataset) {
            Some(raw) => {
                prop_assert_eq!(PropertySource::resolve(&raw, &dataset), expected);
            }
            None => {
                prop_assert_eq!(source, PropertySource::None);
            }
        }
    }

    #[test]
    fn prop_property_names_case_insensitive(
        index in 0..DatasetProperty::ALL.len(),
        upper in proptest::collection::vec(any::<bool>(), 32),
    ) {
        let prop = DatasetProperty::ALL[index];
        let mixed: String = prop
            .name()
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();
        prop_assert_eq!(DatasetProperty::from_name(&mixed), Some(prop));
    }

    #[test]
    fn prop_dataset_derivations(record in any_record()) {
        let native_mountpoint = record.properties.mountpoint.value.clone();
        let native_compression = record.properties.compression.value.clone();
        let ds = Dataset::from_record(record);

        if ds.dataset_type == DatasetType::Snapshot {
            prop_assert!(ds.mountpoint.is_empty());
        } else if native_mountpoint.is_empty() {
            prop_assert_eq!(&ds.mountpoint, &format!("/{}", ds.name));
        } else {
            prop_assert_eq!(&ds.mountpoint, &native_mountpoint);
        }

        if native_compression.is_empty() {
            prop_assert_eq!(ds.compression.as_str(), "off");
        } else {
            prop_assert_eq!(&ds.compression, &native_compression);
        }
        prop_assert_eq!(ds.get_property("WRITTEN").unwrap().as_u64(), Some(ds.written));
    }
}
