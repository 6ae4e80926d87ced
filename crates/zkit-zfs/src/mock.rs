//! In-memory implementation of the native command protocol.
//!
//! [`MockIoctl`] decodes each request, applies it to a dataset tree held in
//! memory, and encodes a reply the way the kernel would. Every call is
//! recorded, and failures can be injected per command and target. Tests use
//! it, and so can embedders that want a dry-run backend.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use tracing::trace;
use zkit_nv::{NativeValue, NvList};

use crate::command::{
    COMMAND_VERSION, KEY_CMD, KEY_VERSION, ZFS_CLONE, ZFS_CREATE, ZFS_DESTROY, ZFS_LIST,
    ZFS_ROLLBACK, ZFS_SEND, ZFS_SNAPSHOT,
};
use crate::dataset::{filesystem_name, pool_name, DatasetType};
use crate::ioctl::{BoundaryError, Ioctl};
use crate::manager::KEY_ERRLIST;
use crate::property::{PropStringWithSource, PropUint64WithSource, PropertySource, RawProperties};
use crate::record::{ObjsetStats, RawDatasetRecord, DMU_OST_ZFS, DMU_OST_ZVOL};

/// Space every filesystem and volume reports as available.
pub const MOCK_AVAILABLE: u64 = 1 << 40;
const MOCK_EPOCH: u64 = 1_600_000_000;
const GUID_BASE: u64 = 0x5eed_0000_0000;
const DEFAULT_VOLBLOCKSIZE: u64 = 8192;

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Native command name.
    pub command: String,
    /// Dataset or pool the command addressed.
    pub target: String,
    /// Decoded request list.
    pub request: NvList,
}

/// A send stream the backend was asked to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSend {
    /// Snapshot being sent.
    pub snapshot: String,
    /// Descriptor the stream was written to.
    pub fd: u64,
    /// Base snapshot of an incremental stream.
    pub from_snapshot: Option<String>,
    /// Whether large blocks were allowed.
    pub large_blocks: bool,
    /// Whether embedded blocks were allowed.
    pub embedded: bool,
}

#[derive(Debug, Clone)]
struct Node {
    kind: DatasetType,
    origin: String,
    guid: u64,
    create_txg: u64,
    props: NvList,
    clones: BTreeSet<String>,
    defer_destroy: bool,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: BTreeMap<String, Node>,
    txg: u64,
    guids: u64,
    calls: Vec<RecordedCall>,
    failures: Vec<(String, String, BoundaryError)>,
    destroyed: Vec<String>,
    sends: Vec<RecordedSend>,
}

/// In-memory kernel double.
#[derive(Debug, Default)]
pub struct MockIoctl {
    state: Mutex<MockState>,
}

impl MockIoctl {
    /// Creates a backend with no pools.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pool and its root filesystem.
    pub fn add_pool(&self, pool: &str) {
        let mut state = self.state.lock();
        let txg = state.next_txg();
        state.insert_node(pool, DatasetType::Filesystem, String::new(), NvList::new(), txg);
    }

    /// Sets a property locally on an existing dataset. Descendants inherit
    /// `compression` and `mountpoint`.
    pub fn set_property(
        &self,
        name: &str,
        property: &str,
        value: impl Into<NativeValue>,
    ) -> Result<(), BoundaryError> {
        let mut state = self.state.lock();
        let node = state.nodes.get_mut(name).ok_or(BoundaryError::NotFound)?;
        node.props.insert(property, value);
        Ok(())
    }

    /// Makes every later `command` against `target` fail with `error`.
    pub fn fail_on(&self, command: &str, target: &str, error: BoundaryError) {
        self.state
            .lock()
            .failures
            .push((command.to_string(), target.to_string(), error));
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Whether a dataset named `name` exists.
    pub fn exists(&self, name: &str) -> bool {
        self.state.lock().nodes.contains_key(name)
    }

    /// Names of every dataset, sorted.
    pub fn names(&self) -> Vec<String> {
        self.state.lock().nodes.keys().cloned().collect()
    }

    /// Every request received, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Datasets removed so far, in removal order.
    pub fn destroyed(&self) -> Vec<String> {
        self.state.lock().destroyed.clone()
    }

    /// Every send stream requested, in order.
    pub fn sends(&self) -> Vec<RecordedSend> {
        self.state.lock().sends.clone()
    }

    /// Whether a snapshot is marked for deferred destruction.
    pub fn is_defer_destroyed(&self, name: &str) -> bool {
        self.state
            .lock()
            .nodes
            .get(name)
            .map(|n| n.defer_destroy)
            .unwrap_or(false)
    }
}

impl Ioctl for MockIoctl {
    fn invoke(
        &self,
        command: &str,
        target: &str,
        request: &[u8],
    ) -> Result<Vec<u8>, BoundaryError> {
        let request = zkit_nv::decode(request).map_err(|_| einval())?;
        if request.get(KEY_CMD).and_then(NativeValue::as_str) != Some(command) {
            return Err(einval());
        }
        if request.get(KEY_VERSION).and_then(NativeValue::as_u64) != Some(COMMAND_VERSION) {
            return Err(BoundaryError::from_errno(libc::ENOTSUP));
        }

        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            command: command.to_string(),
            target: target.to_string(),
            request: request.clone(),
        });
        if let Some((_, _, error)) = state
            .failures
            .iter()
            .find(|(c, t, _)| c == command && t == target)
        {
            return Err(error.clone());
        }

        let reply = match command {
            ZFS_LIST => state.list(target, &request)?,
            ZFS_CREATE => state.create(target, &request)?,
            ZFS_CLONE => state.clone_snapshot(target, &request)?,
            ZFS_DESTROY => state.destroy(target, &request)?,
            ZFS_SNAPSHOT => state.snapshot(target, &request)?,
            ZFS_ROLLBACK => state.rollback(target, &request)?,
            ZFS_SEND => state.send(target, &request)?,
            _ => return Err(einval()),
        };
        trace!(command, target, entries = reply.len(), "Mock command served");

        if reply.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(zkit_nv::encode(&reply).to_vec())
        }
    }
}

fn einval() -> BoundaryError {
    BoundaryError::from_errno(libc::EINVAL)
}

fn param_str<'a>(params: &'a NvList, key: &str) -> Result<&'a str, BoundaryError> {
    params
        .get(key)
        .and_then(NativeValue::as_str)
        .ok_or_else(einval)
}

fn param_u64(params: &NvList, key: &str) -> Result<u64, BoundaryError> {
    params
        .get(key)
        .and_then(NativeValue::as_u64)
        .ok_or_else(einval)
}

fn param_bool(params: &NvList, key: &str) -> Result<bool, BoundaryError> {
    match params.get(key) {
        None => Ok(false),
        Some(NativeValue::Boolean(b)) => Ok(*b),
        Some(_) => Err(einval()),
    }
}

fn param_list(params: &NvList, key: &str) -> Result<NvList, BoundaryError> {
    match params.get(key) {
        None => Ok(NvList::new()),
        Some(NativeValue::List(list)) => Ok(list.clone()),
        Some(_) => Err(einval()),
    }
}

/// The dataset itself, then its snapshot's filesystem, then every parent up
/// to the pool.
fn lineage(name: &str) -> Vec<&str> {
    let mut out = vec![name];
    let mut current = filesystem_name(name);
    if current != name {
        out.push(current);
    }
    while let Some((parent, _)) = current.rsplit_once('/') {
        out.push(parent);
        current = parent;
    }
    out
}

fn local_u64(node: &Node, key: &str) -> PropUint64WithSource {
    match node.props.get(key).and_then(NativeValue::as_u64) {
        Some(value) => PropUint64WithSource {
            value,
            source: PropertySource::Local,
        },
        None => PropUint64WithSource {
            value: 0,
            source: PropertySource::Default,
        },
    }
}

impl MockState {
    fn next_txg(&mut self) -> u64 {
        self.txg += 1;
        self.txg
    }

    fn insert_node(
        &mut self,
        name: &str,
        kind: DatasetType,
        origin: String,
        props: NvList,
        txg: u64,
    ) {
        self.guids += 1;
        let node = Node {
            kind,
            origin,
            guid: GUID_BASE + self.guids,
            create_txg: txg,
            props,
            clones: BTreeSet::new(),
            defer_destroy: false,
        };
        self.nodes.insert(name.to_string(), node);
    }

    fn node(&self, name: &str) -> Result<&Node, BoundaryError> {
        self.nodes.get(name).ok_or(BoundaryError::NotFound)
    }

    fn require_kind(&self, name: &str, accept: &[DatasetType]) -> Result<&Node, BoundaryError> {
        let node = self.node(name)?;
        if !accept.contains(&node.kind) {
            return Err(einval());
        }
        Ok(node)
    }

    fn child_datasets(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}/", name);
        self.nodes
            .keys()
            .filter(|k| {
                k.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains(['/', '@']))
            })
            .cloned()
            .collect()
    }

    fn descendants(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}/", name);
        self.nodes
            .keys()
            .filter(|k| k.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('@')))
            .cloned()
            .collect()
    }

    /// Snapshots of `name`, oldest first.
    fn snapshots_of(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}@", name);
        let mut snaps: Vec<(u64, String)> = self
            .nodes
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(k, n)| (n.create_txg, k.clone()))
            .collect();
        snaps.sort();
        snaps.into_iter().map(|(_, k)| k).collect()
    }

    /// Preorder walk: a dataset, its child datasets, then its snapshots.
    fn walk(&self, name: &str, depth: u64, max_depth: Option<u64>, out: &mut Vec<String>) {
        out.push(name.to_string());
        if max_depth.is_some_and(|max| depth >= max) {
            return;
        }
        for child in self.child_datasets(name) {
            self.walk(&child, depth + 1, max_depth, out);
        }
        out.extend(self.snapshots_of(name));
    }

    fn inherited_string(&self, name: &str, property: &str) -> Option<PropStringWithSource> {
        for (i, ancestor) in lineage(name).into_iter().enumerate() {
            let value = self
                .nodes
                .get(ancestor)
                .and_then(|n| n.props.get(property))
                .and_then(NativeValue::as_str);
            if let Some(value) = value {
                let source = if i == 0 {
                    PropertySource::Local
                } else {
                    PropertySource::Inherited(ancestor.to_string())
                };
                return Some(PropStringWithSource {
                    value: value.to_string(),
                    source,
                });
            }
        }
        None
    }

    fn mountpoint(&self, name: &str) -> PropStringWithSource {
        match self.inherited_string(name, "mountpoint") {
            Some(PropStringWithSource {
                value,
                source: PropertySource::Inherited(from),
            }) => {
                let suffix = &name[from.len()..];
                PropStringWithSource {
                    value: format!("{}{}", value.trim_end_matches('/'), suffix),
                    source: PropertySource::Inherited(from),
                }
            }
            Some(local) => local,
            None => PropStringWithSource {
                value: String::new(),
                source: PropertySource::Default,
            },
        }
    }

    fn record(&self, name: &str, node: &Node) -> RawDatasetRecord {
        let dmu_type = match node.kind {
            DatasetType::Volume => DMU_OST_ZVOL,
            DatasetType::Filesystem | DatasetType::Snapshot => DMU_OST_ZFS,
        };

        let mut props = RawProperties::default();
        props.guid.value = node.guid;
        props.create_txg.value = node.create_txg;
        props.creation.value = MOCK_EPOCH + node.create_txg;
        props.objset_id.value = node.guid & 0xffff;
        props.dmu_type.value = dmu_type;
        props.defer_destroy.value = u64::from(node.defer_destroy);
        props.origin.value = node.origin.clone();
        props.clones.value = node.clones.iter().cloned().collect();
        props.compress_ratio.value = 100;
        props.ref_compress_ratio.value = 100;
        props.compression = self
            .inherited_string(name, "compression")
            .unwrap_or_else(|| PropStringWithSource {
                value: "off".to_string(),
                source: PropertySource::Default,
            });
        props.quota = local_u64(node, "quota");
        props.ref_quota = local_u64(node, "refquota");
        props.reservation = local_u64(node, "reservation");
        props.ref_reservation = local_u64(node, "refreservation");

        match node.kind {
            DatasetType::Snapshot => {}
            DatasetType::Filesystem => {
                props.available.value = MOCK_AVAILABLE;
                props.mountpoint = self.mountpoint(name);
            }
            DatasetType::Volume => {
                props.available.value = MOCK_AVAILABLE;
                props.volsize.value = node
                    .props
                    .get("volsize")
                    .and_then(NativeValue::as_u64)
                    .unwrap_or(0);
                props.vol_block_size.value = node
                    .props
                    .get("volblocksize")
                    .and_then(NativeValue::as_u64)
                    .unwrap_or(DEFAULT_VOLBLOCKSIZE);
            }
        }

        RawDatasetRecord {
            stats: ObjsetStats {
                creation_txg: node.create_txg,
                guid: node.guid,
                inconsistent: false,
                is_snapshot: node.kind == DatasetType::Snapshot,
                num_clones: node.clones.len() as u64,
                origin: node.origin.clone(),
                dataset_type: dmu_type,
            },
            name: name.to_string(),
            properties: props,
        }
    }

    fn list(&self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        self.node(target)?;
        let types: Option<BTreeSet<String>> = match params.get("type") {
            None => None,
            Some(NativeValue::List(types)) => Some(types.keys().map(str::to_string).collect()),
            Some(_) => return Err(einval()),
        };
        let max_depth = match params.get("recurse") {
            None | Some(NativeValue::Boolean(false)) => Some(0),
            Some(NativeValue::Boolean(true)) => None,
            Some(NativeValue::Uint64(depth)) => Some(*depth),
            Some(_) => return Err(einval()),
        };

        let mut names = Vec::new();
        self.walk(target, 0, max_depth, &mut names);

        let mut reply = NvList::ordered();
        for name in names {
            let node = self.node(&name)?;
            let wanted = types
                .as_ref()
                .map_or(true, |t| t.contains(node.kind.as_str()));
            if wanted {
                reply.insert(name.as_str(), self.record(&name, node).to_native());
            }
        }
        Ok(reply)
    }

    fn create(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        if target.contains(['@', '#']) {
            return Err(einval());
        }
        if self.nodes.contains_key(target) {
            return Err(BoundaryError::Exists);
        }
        let (parent, _) = target.rsplit_once('/').ok_or_else(einval)?;
        self.require_kind(parent, &[DatasetType::Filesystem])?;

        let kind = match param_u64(params, "type")? {
            DMU_OST_ZFS => DatasetType::Filesystem,
            DMU_OST_ZVOL => DatasetType::Volume,
            _ => return Err(einval()),
        };
        let props = param_list(params, "props")?;
        if kind == DatasetType::Volume
            && props.get("volsize").and_then(NativeValue::as_u64).unwrap_or(0) == 0
        {
            return Err(einval());
        }

        let txg = self.next_txg();
        self.insert_node(target, kind, String::new(), props, txg);
        Ok(NvList::new())
    }

    fn clone_snapshot(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        let origin = param_str(params, "origin")?;
        self.require_kind(origin, &[DatasetType::Snapshot])?;
        if self.nodes.contains_key(target) {
            return Err(BoundaryError::Exists);
        }
        let (parent, _) = target.rsplit_once('/').ok_or_else(einval)?;
        self.require_kind(parent, &[DatasetType::Filesystem])?;
        if pool_name(parent) != pool_name(origin) {
            return Err(BoundaryError::from_errno(libc::EXDEV));
        }

        let props = param_list(params, "props")?;
        let txg = self.next_txg();
        self.insert_node(target, DatasetType::Filesystem, origin.to_string(), props, txg);
        if let Some(snapshot) = self.nodes.get_mut(origin) {
            snapshot.clones.insert(target.to_string());
        }
        Ok(NvList::new())
    }

    fn destroy(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        let defer = param_bool(params, "defer")?;
        let (kind, has_clones) = {
            let node = self.node(target)?;
            (node.kind, !node.clones.is_empty())
        };

        if kind != DatasetType::Snapshot
            && (!self.child_datasets(target).is_empty() || !self.snapshots_of(target).is_empty())
        {
            return Err(BoundaryError::Busy);
        }
        if has_clones {
            if !defer {
                return Err(BoundaryError::Busy);
            }
            if let Some(node) = self.nodes.get_mut(target) {
                node.defer_destroy = true;
            }
            return Ok(NvList::new());
        }

        self.remove(target);
        Ok(NvList::new())
    }

    /// Removes a dataset and releases its origin snapshot. An origin marked
    /// for deferred destruction goes away with its last clone.
    fn remove(&mut self, name: &str) {
        let Some(node) = self.nodes.remove(name) else {
            return;
        };
        self.destroyed.push(name.to_string());
        if node.origin.is_empty() {
            return;
        }
        let release = match self.nodes.get_mut(&node.origin) {
            Some(origin) => {
                origin.clones.remove(name);
                origin.defer_destroy && origin.clones.is_empty()
            }
            None => false,
        };
        if release {
            self.remove(&node.origin);
        }
    }

    fn snapshot(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        let snaps = param_list(params, "snaps")?;
        let recursive = param_bool(params, "recursive")?;
        if snaps.is_empty() {
            return Err(einval());
        }

        let mut planned = Vec::new();
        for name in snaps.keys() {
            let (fs, short) = name.split_once('@').ok_or_else(einval)?;
            if short.is_empty() || short.contains(['@', '#', '/']) {
                return Err(einval());
            }
            if pool_name(fs) != target {
                return Err(BoundaryError::from_errno(libc::EXDEV));
            }
            self.require_kind(fs, &[DatasetType::Filesystem, DatasetType::Volume])?;
            planned.push(name.to_string());
            if recursive {
                for descendant in self.descendants(fs) {
                    planned.push(format!("{}@{}", descendant, short));
                }
            }
        }

        let mut errlist = NvList::new();
        for name in &planned {
            if self.nodes.contains_key(name) {
                errlist.insert(name.as_str(), libc::EEXIST as u64);
            }
        }
        if !errlist.is_empty() {
            return Ok(NvList::new().with(KEY_ERRLIST, errlist));
        }

        let txg = self.next_txg();
        for name in planned {
            self.insert_node(&name, DatasetType::Snapshot, String::new(), NvList::new(), txg);
        }
        Ok(NvList::new())
    }

    fn rollback(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        let snapshot = param_str(params, "target")?;
        let destroy_more_recent = param_bool(params, "destroy_more_recent")?;
        self.require_kind(target, &[DatasetType::Filesystem, DatasetType::Volume])?;
        let snap_txg = self
            .require_kind(snapshot, &[DatasetType::Snapshot])?
            .create_txg;
        if filesystem_name(snapshot) != target {
            return Err(einval());
        }

        let newer: Vec<String> = self
            .snapshots_of(target)
            .into_iter()
            .filter(|s| self.nodes.get(s).is_some_and(|n| n.create_txg > snap_txg))
            .collect();
        if !newer.is_empty() {
            if !destroy_more_recent {
                return Err(BoundaryError::Exists);
            }
            let cloned = newer
                .iter()
                .any(|s| self.nodes.get(s).is_some_and(|n| !n.clones.is_empty()));
            if cloned {
                return Err(BoundaryError::Busy);
            }
            for name in newer {
                self.remove(&name);
            }
        }
        Ok(NvList::new().with("target", snapshot))
    }

    fn send(&mut self, target: &str, params: &NvList) -> Result<NvList, BoundaryError> {
        let txg = self.require_kind(target, &[DatasetType::Snapshot])?.create_txg;
        let fd = param_u64(params, "fd")?;
        let from_snapshot = match params.get("fromsnap") {
            None => None,
            Some(NativeValue::String(from)) => Some(from.clone()),
            Some(_) => return Err(einval()),
        };
        if let Some(from) = &from_snapshot {
            let from_txg = self.require_kind(from, &[DatasetType::Snapshot])?.create_txg;
            if filesystem_name(from) != filesystem_name(target) || from_txg >= txg {
                return Err(BoundaryError::from_errno(libc::EXDEV));
            }
        }

        self.sends.push(RecordedSend {
            snapshot: target.to_string(),
            fd,
            from_snapshot,
            large_blocks: param_bool(params, "largeblockok")?,
            embedded: param_bool(params, "embedok")?,
        });
        Ok(NvList::new())
    }
}
