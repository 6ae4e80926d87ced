//! Dataset property schema.
//!
//! Native replies carry each property as a small list: `{value}` for
//! read-only statistics, `{value, source}` for settable properties, and a
//! nested `{value: {clone: true, ...}}` for the clone set. [`RawProperties`]
//! holds the decoded, typed form. [`DatasetProperty`] is the static name table
//! over it: lookups go through an exhaustive `match`, so adding a property
//! without wiring its accessor fails to compile.

use serde::{Deserialize, Serialize};
use zkit_nv::{NativeValue, NvList};

use crate::error::{ZfsError, ZfsResult};

/// Native source string for received values.
pub const SOURCE_RECEIVED: &str = "$recvd";
/// Native source string for temporary values.
pub const SOURCE_TEMPORARY: &str = "$tmp";

/// Which configuration layer produced a property value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "from", rename_all = "lowercase")]
pub enum PropertySource {
    /// Set directly on the dataset.
    Local,
    /// Inherited from the named ancestor.
    Inherited(String),
    /// Built-in default.
    Default,
    /// Temporary override, such as a mount option.
    Temporary,
    /// Set by a received send stream.
    Received,
    /// No provenance reported.
    #[default]
    None,
}

impl PropertySource {
    /// Resolves a native source string for the property of `dataset`.
    ///
    /// The kernel reports the name of the dataset the value came from, so a
    /// source equal to the dataset's own name is local and any other name is
    /// an ancestor. Apart from names, only the empty string and the `$`
    /// markers carry meaning; pools may be called `default` or `local`.
    pub fn resolve(raw: &str, dataset: &str) -> Self {
        match raw {
            s if s == dataset => PropertySource::Local,
            "" => PropertySource::Default,
            SOURCE_RECEIVED => PropertySource::Received,
            SOURCE_TEMPORARY => PropertySource::Temporary,
            s => PropertySource::Inherited(s.to_string()),
        }
    }

    /// Inverse of [`PropertySource::resolve`]. `None` has no native string;
    /// the `source` entry is left out instead.
    pub fn to_native(&self, dataset: &str) -> Option<String> {
        let raw = match self {
            PropertySource::Local => dataset.to_string(),
            PropertySource::Inherited(from) => from.clone(),
            PropertySource::Default => String::new(),
            PropertySource::Temporary => SOURCE_TEMPORARY.to_string(),
            PropertySource::Received => SOURCE_RECEIVED.to_string(),
            PropertySource::None => return None,
        };
        Some(raw)
    }
}

/// Wire shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyShape {
    /// `{value: uint64}`
    Uint64,
    /// `{value: uint64, source}`
    Uint64WithSource,
    /// `{value: string}`
    String,
    /// `{value: string, source}`
    StringWithSource,
    /// `{value: {name: true, ...}}`
    CloneSet,
}

/// A property value in one of the five native shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// Numeric statistic.
    Uint64(u64),
    /// Numeric setting with its provenance.
    Uint64WithSource {
        /// The setting.
        value: u64,
        /// Where the setting came from.
        source: PropertySource,
    },
    /// String statistic.
    String(String),
    /// String setting with its provenance.
    StringWithSource {
        /// The setting.
        value: String,
        /// Where the setting came from.
        source: PropertySource,
    },
    /// Names of the clones of a snapshot.
    CloneSet(Vec<String>),
}

impl PropertyValue {
    /// Wire shape of this value.
    pub fn shape(&self) -> PropertyShape {
        match self {
            PropertyValue::Uint64(_) => PropertyShape::Uint64,
            PropertyValue::Uint64WithSource { .. } => PropertyShape::Uint64WithSource,
            PropertyValue::String(_) => PropertyShape::String,
            PropertyValue::StringWithSource { .. } => PropertyShape::StringWithSource,
            PropertyValue::CloneSet(_) => PropertyShape::CloneSet,
        }
    }

    /// Provenance, for the shapes that carry it.
    pub fn source(&self) -> Option<&PropertySource> {
        match self {
            PropertyValue::Uint64WithSource { source, .. }
            | PropertyValue::StringWithSource { source, .. } => Some(source),
            PropertyValue::Uint64(_) | PropertyValue::String(_) | PropertyValue::CloneSet(_) => {
                None
            }
        }
    }

    /// The number, for the numeric shapes.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropertyValue::Uint64(v) | PropertyValue::Uint64WithSource { value: v, .. } => Some(*v),
            PropertyValue::String(_)
            | PropertyValue::StringWithSource { .. }
            | PropertyValue::CloneSet(_) => None,
        }
    }

    /// The string, for the string shapes.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) | PropertyValue::StringWithSource { value: v, .. } => Some(v),
            PropertyValue::Uint64(_)
            | PropertyValue::Uint64WithSource { .. }
            | PropertyValue::CloneSet(_) => None,
        }
    }

    /// Clone names, for a clone set.
    pub fn clones(&self) -> Option<&[String]> {
        match self {
            PropertyValue::CloneSet(v) => Some(v),
            PropertyValue::Uint64(_)
            | PropertyValue::Uint64WithSource { .. }
            | PropertyValue::String(_)
            | PropertyValue::StringWithSource { .. } => None,
        }
    }

    /// Encodes the value in its native property-list form.
    pub fn to_native(&self, dataset: &str) -> NvList {
        match self {
            PropertyValue::Uint64(v) => NvList::new().with("value", *v),
            PropertyValue::Uint64WithSource { value, source } => {
                with_source(NvList::new().with("value", *value), source, dataset)
            }
            PropertyValue::String(v) => NvList::new().with("value", v.as_str()),
            PropertyValue::StringWithSource { value, source } => {
                with_source(NvList::new().with("value", value.as_str()), source, dataset)
            }
            PropertyValue::CloneSet(names) => {
                let set: NvList = names.iter().map(|n| (n.as_str(), true)).collect();
                NvList::new().with("value", set)
            }
        }
    }

    /// Decodes a native property list of the given shape.
    pub fn from_native(
        shape: PropertyShape,
        name: &str,
        list: &NvList,
        dataset: &str,
    ) -> ZfsResult<Self> {
        let source = || -> ZfsResult<PropertySource> {
            match list.get("source") {
                None => Ok(PropertySource::None),
                Some(NativeValue::String(s)) => Ok(PropertySource::resolve(s, dataset)),
                Some(other) => Err(mismatch(name, "source", "string", other)),
            }
        };

        match shape {
            PropertyShape::Uint64 => Ok(PropertyValue::Uint64(uint64_value(name, list)?)),
            PropertyShape::Uint64WithSource => Ok(PropertyValue::Uint64WithSource {
                value: uint64_value(name, list)?,
                source: source()?,
            }),
            PropertyShape::String => Ok(PropertyValue::String(string_value(name, list)?)),
            PropertyShape::StringWithSource => Ok(PropertyValue::StringWithSource {
                value: string_value(name, list)?,
                source: source()?,
            }),
            PropertyShape::CloneSet => match list.get("value") {
                None => Ok(PropertyValue::CloneSet(Vec::new())),
                Some(NativeValue::List(set)) => Ok(PropertyValue::CloneSet(
                    set.keys().map(str::to_string).collect(),
                )),
                Some(other) => Err(mismatch(name, "value", "list", other)),
            },
        }
    }
}

fn with_source(mut list: NvList, source: &PropertySource, dataset: &str) -> NvList {
    if let Some(raw) = source.to_native(dataset) {
        list.insert("source", raw);
    }
    list
}

fn mismatch(property: &str, field: &str, expected: &str, got: &NativeValue) -> ZfsError {
    ZfsError::MalformedRecord {
        field: format!("properties.{}.{}", property, field),
        reason: format!("expected {}, got {}", expected, got.type_name()),
    }
}

fn uint64_value(name: &str, list: &NvList) -> ZfsResult<u64> {
    match list.get("value") {
        None => Ok(0),
        Some(NativeValue::Uint64(v)) => Ok(*v),
        Some(other) => Err(mismatch(name, "value", "uint64", other)),
    }
}

fn string_value(name: &str, list: &NvList) -> ZfsResult<String> {
    match list.get("value") {
        None => Ok(String::new()),
        Some(NativeValue::String(v)) => Ok(v.clone()),
        Some(other) => Err(mismatch(name, "value", "string", other)),
    }
}

/// Statistic without provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropUint64 {
    /// The statistic.
    pub value: u64,
}

/// Numeric property with provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropUint64WithSource {
    /// The setting.
    pub value: u64,
    /// Where the setting came from.
    pub source: PropertySource,
}

/// String statistic without provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropString {
    /// The statistic.
    pub value: String,
}

/// String property with provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropStringWithSource {
    /// The setting.
    pub value: String,
    /// Where the setting came from.
    pub source: PropertySource,
}

/// Names of clones created from a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropClones {
    /// Clone names, in reply order.
    pub value: Vec<String>,
}

/// Typed property set of one dataset. Properties missing from a reply keep
/// their zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawProperties {
    /// `available`: bytes available to the dataset.
    pub available: PropUint64,
    /// `clones`: clones of a snapshot.
    pub clones: PropClones,
    /// `compression`: compression algorithm.
    pub compression: PropStringWithSource,
    /// `compressratio`: achieved ratio, scaled by 100.
    pub compress_ratio: PropUint64,
    /// `createtxg`: creation transaction group.
    pub create_txg: PropUint64,
    /// `creation`: creation time in seconds since the epoch.
    pub creation: PropUint64,
    /// `defer_destroy`: 1 when a snapshot awaits deferred destruction.
    pub defer_destroy: PropUint64,
    /// `guid`: unique identifier.
    pub guid: PropUint64,
    /// `logicalreferenced`: referenced bytes before compression.
    pub logical_referenced: PropUint64,
    /// `logicalused`: used bytes before compression.
    pub logical_used: PropUint64,
    /// `mountpoint`: mount path.
    pub mountpoint: PropStringWithSource,
    /// `objsetid`: object-set number.
    pub objset_id: PropUint64,
    /// `origin`: origin snapshot of a clone.
    pub origin: PropString,
    /// `quota`: limit on space used by the dataset and descendants.
    pub quota: PropUint64WithSource,
    /// `refcompressratio`: ratio of referenced data, scaled by 100.
    pub ref_compress_ratio: PropUint64,
    /// `refquota`: limit on space referenced by the dataset.
    pub ref_quota: PropUint64WithSource,
    /// `refreservation`: space guaranteed to the dataset alone.
    pub ref_reservation: PropUint64WithSource,
    /// `referenced`: bytes reachable from the dataset.
    pub referenced: PropUint64,
    /// `reservation`: space guaranteed to the dataset and descendants.
    pub reservation: PropUint64WithSource,
    /// `type`: DMU object-set type.
    pub dmu_type: PropUint64,
    /// `unique`: bytes only this snapshot references.
    pub unique: PropUint64,
    /// `used`: bytes used by the dataset and descendants.
    pub used: PropUint64,
    /// `usedbychildren`: bytes used by descendants.
    pub used_by_children: PropUint64,
    /// `usedbydataset`: bytes used by the dataset itself.
    pub used_by_dataset: PropUint64,
    /// `usedbyrefreservation`: bytes held by `refreservation`.
    pub used_by_ref_reservation: PropUint64,
    /// `usedbysnapshots`: bytes used by snapshots.
    pub used_by_snapshots: PropUint64,
    /// `useraccounting`: 1 when per-user accounting is available.
    pub user_accounting: PropUint64,
    /// `userrefs`: user holds on a snapshot.
    pub user_refs: PropUint64,
    /// `volsize`: volume size in bytes.
    pub volsize: PropUint64,
    /// `volblocksize`: volume block size in bytes.
    pub vol_block_size: PropUint64,
    /// `written`: bytes written since the previous snapshot.
    pub written: PropUint64,
}

impl RawProperties {
    /// Decodes the `properties` list of a dataset record. Names outside the
    /// schema are ignored.
    pub fn from_native(list: &NvList, dataset: &str) -> ZfsResult<Self> {
        let mut props = RawProperties::default();
        for prop in DatasetProperty::ALL {
            let entry = match list.get(prop.name()) {
                None => continue,
                Some(NativeValue::List(entry)) => entry,
                Some(other) => return Err(mismatch(prop.name(), "entry", "list", other)),
            };
            let value = PropertyValue::from_native(prop.shape(), prop.name(), entry, dataset)?;
            prop.set(&mut props, value)?;
        }
        Ok(props)
    }

    /// Encodes every schema property in native form.
    pub fn to_native(&self, dataset: &str) -> NvList {
        DatasetProperty::ALL
            .iter()
            .map(|prop| (prop.name(), prop.get(self).to_native(dataset)))
            .collect()
    }
}

/// Every property in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetProperty {
    /// `available`
    Available,
    /// `clones`
    Clones,
    /// `compression`
    Compression,
    /// `compressratio`
    CompressRatio,
    /// `createtxg`
    CreateTxg,
    /// `creation`
    Creation,
    /// `defer_destroy`
    DeferDestroy,
    /// `guid`
    Guid,
    /// `logicalreferenced`
    LogicalReferenced,
    /// `logicalused`
    LogicalUsed,
    /// `mountpoint`
    Mountpoint,
    /// `objsetid`
    ObjsetId,
    /// `origin`
    Origin,
    /// `quota`
    Quota,
    /// `refcompressratio`
    RefCompressRatio,
    /// `refquota`
    RefQuota,
    /// `refreservation`
    RefReservation,
    /// `referenced`
    Referenced,
    /// `reservation`
    Reservation,
    /// `type`
    Type,
    /// `unique`
    Unique,
    /// `used`
    Used,
    /// `usedbychildren`
    UsedByChildren,
    /// `usedbydataset`
    UsedByDataset,
    /// `usedbyrefreservation`
    UsedByRefReservation,
    /// `usedbysnapshots`
    UsedBySnapshots,
    /// `useraccounting`
    UserAccounting,
    /// `userrefs`
    UserRefs,
    /// `volsize`
    Volsize,
    /// `volblocksize`
    VolBlockSize,
    /// `written`
    Written,
}

impl DatasetProperty {
    /// Every property in the schema.
    pub const ALL: [DatasetProperty; 31] = [
        DatasetProperty::Available,
        DatasetProperty::Clones,
        DatasetProperty::Compression,
        DatasetProperty::CompressRatio,
        DatasetProperty::CreateTxg,
        DatasetProperty::Creation,
        DatasetProperty::DeferDestroy,
        DatasetProperty::Guid,
        DatasetProperty::LogicalReferenced,
        DatasetProperty::LogicalUsed,
        DatasetProperty::Mountpoint,
        DatasetProperty::ObjsetId,
        DatasetProperty::Origin,
        DatasetProperty::Quota,
        DatasetProperty::RefCompressRatio,
        DatasetProperty::RefQuota,
        DatasetProperty::RefReservation,
        DatasetProperty::Referenced,
        DatasetProperty::Reservation,
        DatasetProperty::Type,
        DatasetProperty::Unique,
        DatasetProperty::Used,
        DatasetProperty::UsedByChildren,
        DatasetProperty::UsedByDataset,
        DatasetProperty::UsedByRefReservation,
        DatasetProperty::UsedBySnapshots,
        DatasetProperty::UserAccounting,
        DatasetProperty::UserRefs,
        DatasetProperty::Volsize,
        DatasetProperty::VolBlockSize,
        DatasetProperty::Written,
    ];

    /// Looks up a property by native name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let prop = match name.to_ascii_lowercase().as_str() {
            "available" => DatasetProperty::Available,
            "clones" => DatasetProperty::Clones,
            "compression" => DatasetProperty::Compression,
            "compressratio" => DatasetProperty::CompressRatio,
            "createtxg" => DatasetProperty::CreateTxg,
            "creation" => DatasetProperty::Creation,
            "defer_destroy" => DatasetProperty::DeferDestroy,
            "guid" => DatasetProperty::Guid,
            "logicalreferenced" => DatasetProperty::LogicalReferenced,
            "logicalused" => DatasetProperty::LogicalUsed,
            "mountpoint" => DatasetProperty::Mountpoint,
            "objsetid" => DatasetProperty::ObjsetId,
            "origin" => DatasetProperty::Origin,
            "quota" => DatasetProperty::Quota,
            "refcompressratio" => DatasetProperty::RefCompressRatio,
            "refquota" => DatasetProperty::RefQuota,
            "refreservation" => DatasetProperty::RefReservation,
            "referenced" => DatasetProperty::Referenced,
            "reservation" => DatasetProperty::Reservation,
            "type" => DatasetProperty::Type,
            "unique" => DatasetProperty::Unique,
            "used" => DatasetProperty::Used,
            "usedbychildren" => DatasetProperty::UsedByChildren,
            "usedbydataset" => DatasetProperty::UsedByDataset,
            "usedbyrefreservation" => DatasetProperty::UsedByRefReservation,
            "usedbysnapshots" => DatasetProperty::UsedBySnapshots,
            "useraccounting" => DatasetProperty::UserAccounting,
            "userrefs" => DatasetProperty::UserRefs,
            "volsize" => DatasetProperty::Volsize,
            "volblocksize" => DatasetProperty::VolBlockSize,
            "written" => DatasetProperty::Written,
            _ => return None,
        };
        Some(prop)
    }

    /// Native property name.
    pub fn name(self) -> &'static str {
        match self {
            DatasetProperty::Available => "available",
            DatasetProperty::Clones => "clones",
            DatasetProperty::Compression => "compression",
            DatasetProperty::CompressRatio => "compressratio",
            DatasetProperty::CreateTxg => "createtxg",
            DatasetProperty::Creation => "creation",
            DatasetProperty::DeferDestroy => "defer_destroy",
            DatasetProperty::Guid => "guid",
            DatasetProperty::LogicalReferenced => "logicalreferenced",
            DatasetProperty::LogicalUsed => "logicalused",
            DatasetProperty::Mountpoint => "mountpoint",
            DatasetProperty::ObjsetId => "objsetid",
            DatasetProperty::Origin => "origin",
            DatasetProperty::Quota => "quota",
            DatasetProperty::RefCompressRatio => "refcompressratio",
            DatasetProperty::RefQuota => "refquota",
            DatasetProperty::RefReservation => "refreservation",
            DatasetProperty::Referenced => "referenced",
            DatasetProperty::Reservation => "reservation",
            DatasetProperty::Type => "type",
            DatasetProperty::Unique => "unique",
            DatasetProperty::Used => "used",
            DatasetProperty::UsedByChildren => "usedbychildren",
            DatasetProperty::UsedByDataset => "usedbydataset",
            DatasetProperty::UsedByRefReservation => "usedbyrefreservation",
            DatasetProperty::UsedBySnapshots => "usedbysnapshots",
            DatasetProperty::UserAccounting => "useraccounting",
            DatasetProperty::UserRefs => "userrefs",
            DatasetProperty::Volsize => "volsize",
            DatasetProperty::VolBlockSize => "volblocksize",
            DatasetProperty::Written => "written",
        }
    }

    /// Wire shape of the property.
    pub fn shape(self) -> PropertyShape {
        match self {
            DatasetProperty::Clones => PropertyShape::CloneSet,
            DatasetProperty::Compression | DatasetProperty::Mountpoint => {
                PropertyShape::StringWithSource
            }
            DatasetProperty::Origin => PropertyShape::String,
            DatasetProperty::Quota
            | DatasetProperty::RefQuota
            | DatasetProperty::RefReservation
            | DatasetProperty::Reservation => PropertyShape::Uint64WithSource,
            DatasetProperty::Available
            | DatasetProperty::CompressRatio
            | DatasetProperty::CreateTxg
            | DatasetProperty::Creation
            | DatasetProperty::DeferDestroy
            | DatasetProperty::Guid
            | DatasetProperty::LogicalReferenced
            | DatasetProperty::LogicalUsed
            | DatasetProperty::ObjsetId
            | DatasetProperty::RefCompressRatio
            | DatasetProperty::Referenced
            | DatasetProperty::Type
            | DatasetProperty::Unique
            | DatasetProperty::Used
            | DatasetProperty::UsedByChildren
            | DatasetProperty::UsedByDataset
            | DatasetProperty::UsedByRefReservation
            | DatasetProperty::UsedBySnapshots
            | DatasetProperty::UserAccounting
            | DatasetProperty::UserRefs
            | DatasetProperty::Volsize
            | DatasetProperty::VolBlockSize
            | DatasetProperty::Written => PropertyShape::Uint64,
        }
    }

    /// Reads this property out of a typed property set.
    pub fn get(self, p: &RawProperties) -> PropertyValue {
        fn u(prop: &PropUint64) -> PropertyValue {
            PropertyValue::Uint64(prop.value)
        }
        fn us(prop: &PropUint64WithSource) -> PropertyValue {
            PropertyValue::Uint64WithSource {
                value: prop.value,
                source: prop.source.clone(),
            }
        }
        fn ss(prop: &PropStringWithSource) -> PropertyValue {
            PropertyValue::StringWithSource {
                value: prop.value.clone(),
                source: prop.source.clone(),
            }
        }

        match self {
            DatasetProperty::Available => u(&p.available),
            DatasetProperty::Clones => PropertyValue::CloneSet(p.clones.value.clone()),
            DatasetProperty::Compression => ss(&p.compression),
            DatasetProperty::CompressRatio => u(&p.compress_ratio),
            DatasetProperty::CreateTxg => u(&p.create_txg),
            DatasetProperty::Creation => u(&p.creation),
            DatasetProperty::DeferDestroy => u(&p.defer_destroy),
            DatasetProperty::Guid => u(&p.guid),
            DatasetProperty::LogicalReferenced => u(&p.logical_referenced),
            DatasetProperty::LogicalUsed => u(&p.logical_used),
            DatasetProperty::Mountpoint => ss(&p.mountpoint),
            DatasetProperty::ObjsetId => u(&p.objset_id),
            DatasetProperty::Origin => PropertyValue::String(p.origin.value.clone()),
            DatasetProperty::Quota => us(&p.quota),
            DatasetProperty::RefCompressRatio => u(&p.ref_compress_ratio),
            DatasetProperty::RefQuota => us(&p.ref_quota),
            DatasetProperty::RefReservation => us(&p.ref_reservation),
            DatasetProperty::Referenced => u(&p.referenced),
            DatasetProperty::Reservation => us(&p.reservation),
            DatasetProperty::Type => u(&p.dmu_type),
            DatasetProperty::Unique => u(&p.unique),
            DatasetProperty::Used => u(&p.used),
            DatasetProperty::UsedByChildren => u(&p.used_by_children),
            DatasetProperty::UsedByDataset => u(&p.used_by_dataset),
            DatasetProperty::UsedByRefReservation => u(&p.used_by_ref_reservation),
            DatasetProperty::UsedBySnapshots => u(&p.used_by_snapshots),
            DatasetProperty::UserAccounting => u(&p.user_accounting),
            DatasetProperty::UserRefs => u(&p.user_refs),
            DatasetProperty::Volsize => u(&p.volsize),
            DatasetProperty::VolBlockSize => u(&p.vol_block_size),
            DatasetProperty::Written => u(&p.written),
        }
    }

    /// Stores a decoded value. The value must have this property's shape.
    fn set(self, p: &mut RawProperties, value: PropertyValue) -> ZfsResult<()> {
        let name = self.name();
        match self {
            DatasetProperty::Available => p.available = uint64(name, value)?,
            DatasetProperty::Clones => p.clones = clone_set(name, value)?,
            DatasetProperty::Compression => p.compression = string_with_source(name, value)?,
            DatasetProperty::CompressRatio => p.compress_ratio = uint64(name, value)?,
            DatasetProperty::CreateTxg => p.create_txg = uint64(name, value)?,
            DatasetProperty::Creation => p.creation = uint64(name, value)?,
            DatasetProperty::DeferDestroy => p.defer_destroy = uint64(name, value)?,
            DatasetProperty::Guid => p.guid = uint64(name, value)?,
            DatasetProperty::LogicalReferenced => p.logical_referenced = uint64(name, value)?,
            DatasetProperty::LogicalUsed => p.logical_used = uint64(name, value)?,
            DatasetProperty::Mountpoint => p.mountpoint = string_with_source(name, value)?,
            DatasetProperty::ObjsetId => p.objset_id = uint64(name, value)?,
            DatasetProperty::Origin => p.origin = string(name, value)?,
            DatasetProperty::Quota => p.quota = uint64_with_source(name, value)?,
            DatasetProperty::RefCompressRatio => p.ref_compress_ratio = uint64(name, value)?,
            DatasetProperty::RefQuota => p.ref_quota = uint64_with_source(name, value)?,
            DatasetProperty::RefReservation => {
                p.ref_reservation = uint64_with_source(name, value)?
            }
            DatasetProperty::Referenced => p.referenced = uint64(name, value)?,
            DatasetProperty::Reservation => p.reservation = uint64_with_source(name, value)?,
            DatasetProperty::Type => p.dmu_type = uint64(name, value)?,
            DatasetProperty::Unique => p.unique = uint64(name, value)?,
            DatasetProperty::Used => p.used = uint64(name, value)?,
            DatasetProperty::UsedByChildren => p.used_by_children = uint64(name, value)?,
            DatasetProperty::UsedByDataset => p.used_by_dataset = uint64(name, value)?,
            DatasetProperty::UsedByRefReservation => {
                p.used_by_ref_reservation = uint64(name, value)?
            }
            DatasetProperty::UsedBySnapshots => p.used_by_snapshots = uint64(name, value)?,
            DatasetProperty::UserAccounting => p.user_accounting = uint64(name, value)?,
            DatasetProperty::UserRefs => p.user_refs = uint64(name, value)?,
            DatasetProperty::Volsize => p.volsize = uint64(name, value)?,
            DatasetProperty::VolBlockSize => p.vol_block_size = uint64(name, value)?,
            DatasetProperty::Written => p.written = uint64(name, value)?,
        }
        Ok(())
    }
}

fn wrong_shape(property: &str, expected: PropertyShape, got: &PropertyValue) -> ZfsError {
    ZfsError::MalformedRecord {
        field: format!("properties.{}", property),
        reason: format!("expected {:?} value, got {:?}", expected, got.shape()),
    }
}

fn uint64(property: &str, value: PropertyValue) -> ZfsResult<PropUint64> {
    match value {
        PropertyValue::Uint64(value) => Ok(PropUint64 { value }),
        other => Err(wrong_shape(property, PropertyShape::Uint64, &other)),
    }
}

fn uint64_with_source(property: &str, value: PropertyValue) -> ZfsResult<PropUint64WithSource> {
    match value {
        PropertyValue::Uint64WithSource { value, source } => {
            Ok(PropUint64WithSource { value, source })
        }
        other => Err(wrong_shape(property, PropertyShape::Uint64WithSource, &other)),
    }
}

fn string(property: &str, value: PropertyValue) -> ZfsResult<PropString> {
    match value {
        PropertyValue::String(value) => Ok(PropString { value }),
        other => Err(wrong_shape(property, PropertyShape::String, &other)),
    }
}

fn string_with_source(property: &str, value: PropertyValue) -> ZfsResult<PropStringWithSource> {
    match value {
        PropertyValue::StringWithSource { value, source } => {
            Ok(PropStringWithSource { value, source })
        }
        other => Err(wrong_shape(property, PropertyShape::StringWithSource, &other)),
    }
}

fn clone_set(property: &str, value: PropertyValue) -> ZfsResult<PropClones> {
    match value {
        PropertyValue::CloneSet(value) => Ok(PropClones { value }),
        other => Err(wrong_shape(property, PropertyShape::CloneSet, &other)),
    }
}

/// Looks up a property value by name, ignoring case.
pub fn lookup(props: &RawProperties, name: &str) -> ZfsResult<PropertyValue> {
    DatasetProperty::from_name(name)
        .map(|prop| prop.get(props))
        .ok_or_else(|| ZfsError::UnknownProperty {
            name: name.to_string(),
        })
}
