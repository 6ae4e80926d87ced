//! Dataset lifecycle operations.
//!
//! Nothing here caches dataset relationships. Parents, children, snapshots,
//! and clones are re-derived from the kernel by name on every call, so a
//! [`Dataset`] handed to a method only supplies names and types.

use std::collections::BTreeMap;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;

use tracing::{debug, info};
use zkit_nv::{NativeValue, NvList};

use crate::command::{
    Dispatcher, ZFS_CLONE, ZFS_CREATE, ZFS_DESTROY, ZFS_LIST, ZFS_ROLLBACK, ZFS_SEND,
    ZFS_SNAPSHOT,
};
use crate::config::ZfsConfig;
use crate::context::OpContext;
use crate::dataset::{
    filesystem_name, pool_name, require, validate_name, Dataset, DatasetType, DestroyOptions,
    SendOptions, TypeFilter,
};
use crate::error::{ZfsError, ZfsResult};
use crate::ioctl::{BoundaryError, Ioctl, Unmounter};
use crate::record::{RawDatasetRecord, DMU_OST_ZFS, DMU_OST_ZVOL};

/// Flat property map accepted by create and clone.
pub type PropertyMap = BTreeMap<String, NativeValue>;

/// Reply key listing per-snapshot failures.
pub const KEY_ERRLIST: &str = "errlist";

const COMMAND_UNMOUNT: &str = "unmount";

/// Entry point for dataset lifecycle operations.
pub struct DatasetManager<I> {
    dispatcher: Dispatcher<I>,
    unmounter: Option<Arc<dyn Unmounter>>,
}

impl<I: Ioctl> DatasetManager<I> {
    /// Creates a manager issuing commands through `ioctl`.
    pub fn new(ioctl: Arc<I>, config: &ZfsConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(ioctl, config),
            unmounter: None,
        }
    }

    /// Attaches the collaborator used for `force_unmount`.
    pub fn with_unmounter(mut self, unmounter: Arc<dyn Unmounter>) -> Self {
        self.unmounter = Some(unmounter);
        self
    }

    /// Returns a manager whose calls observe `ctx`.
    pub fn with_context(&self, ctx: OpContext) -> Self {
        Self {
            dispatcher: self.dispatcher.with_context(ctx),
            unmounter: self.unmounter.clone(),
        }
    }

    /// The dispatcher commands go through.
    pub fn dispatcher(&self) -> &Dispatcher<I> {
        &self.dispatcher
    }

    /// Lists `name` and, when `recursive`, its descendants down to `depth`
    /// levels (0 is unlimited). A non-recursive listing returns at most the
    /// dataset itself. Type filtering happens in the kernel.
    pub fn list(
        &self,
        name: &str,
        filter: TypeFilter,
        recursive: bool,
        depth: u64,
    ) -> ZfsResult<Vec<Dataset>> {
        require("name", name)?;

        let types: NvList = filter.type_set().iter().map(|t| (*t, true)).collect();
        let mut params = NvList::ordered().with("type", types);
        if recursive {
            if depth == 0 {
                params.insert("recurse", true);
            } else {
                params.insert("recurse", depth);
            }
        }

        let reply = self.dispatcher.dispatch(ZFS_LIST, name, params)?;
        let mut datasets = Vec::with_capacity(reply.len());
        for (key, value) in reply.iter() {
            let record = match value {
                NativeValue::List(list) => RawDatasetRecord::from_native(list)?,
                other => {
                    return Err(ZfsError::MalformedRecord {
                        field: key.to_string(),
                        reason: format!("expected list, got {}", other.type_name()),
                    })
                }
            };
            datasets.push(Dataset::from_record(record));
        }
        debug!(name = %name, count = datasets.len(), recursive, depth, "Listed datasets");
        Ok(datasets)
    }

    /// Fetches exactly one dataset.
    pub fn get(&self, name: &str) -> ZfsResult<Dataset> {
        let mut datasets = match self.list(name, TypeFilter::All, false, 0) {
            Ok(datasets) => datasets,
            Err(ZfsError::Boundary {
                source: BoundaryError::NotFound,
                ..
            }) => {
                return Err(ZfsError::NotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        match datasets.len() {
            1 => Ok(datasets.remove(0)),
            0 => Err(ZfsError::NotFound {
                name: name.to_string(),
            }),
            count => Err(ZfsError::AmbiguousResult {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Every dataset under `name`, including `name` itself.
    pub fn datasets(&self, name: &str) -> ZfsResult<Vec<Dataset>> {
        self.list(name, TypeFilter::All, true, 0)
    }

    /// Filesystems under `name`, including `name` itself.
    pub fn filesystems(&self, name: &str) -> ZfsResult<Vec<Dataset>> {
        self.list(name, TypeFilter::Filesystem, true, 0)
    }

    /// Snapshots of `name` and of every descendant.
    pub fn snapshots(&self, name: &str) -> ZfsResult<Vec<Dataset>> {
        self.list(name, TypeFilter::Snapshot, true, 0)
    }

    /// Volumes under `name`.
    pub fn volumes(&self, name: &str) -> ZfsResult<Vec<Dataset>> {
        self.list(name, TypeFilter::Volume, true, 0)
    }

    /// Snapshots taken directly of `dataset`.
    pub fn dataset_snapshots(&self, dataset: &Dataset) -> ZfsResult<Vec<Dataset>> {
        let snapshots = self.list(&dataset.name, TypeFilter::Snapshot, true, 1)?;
        Ok(snapshots
            .into_iter()
            .filter(|s| s.filesystem_name() == dataset.name)
            .collect())
    }

    /// Creates a filesystem and returns it as listed after creation.
    pub fn create_filesystem(&self, name: &str, properties: &PropertyMap) -> ZfsResult<Dataset> {
        self.create(name, DMU_OST_ZFS, property_list(properties)?)
    }

    /// Creates a volume of `size` bytes. `properties` is copied; the
    /// `volsize` entry is added to the copy.
    pub fn create_volume(
        &self,
        name: &str,
        size: u64,
        properties: &PropertyMap,
    ) -> ZfsResult<Dataset> {
        let mut props = property_list(properties)?;
        props.insert("volsize", size);
        self.create(name, DMU_OST_ZVOL, props)
    }

    fn create(&self, name: &str, dmu_type: u64, props: NvList) -> ZfsResult<Dataset> {
        validate_name("name", name)?;
        if filesystem_name(name) != name {
            return Err(ZfsError::InvalidArgument {
                argument: name.to_string(),
                reason: "snapshots are created with snapshot()",
            });
        }

        let params = NvList::ordered()
            .with("type", dmu_type)
            .with("props", props);
        self.dispatcher.dispatch(ZFS_CREATE, name, params)?;
        info!(name = %name, dmu_type, "Created dataset");
        self.get(name)
    }

    /// Descendants of `dataset` down to `depth` levels (0 is unlimited),
    /// never including `dataset` itself.
    pub fn children(&self, dataset: &Dataset, depth: u64) -> ZfsResult<Vec<Dataset>> {
        let listed = self.list(&dataset.name, TypeFilter::All, true, depth)?;
        Ok(listed
            .into_iter()
            .filter(|d| d.name != dataset.name)
            .collect())
    }

    /// Clones a snapshot into a new filesystem.
    pub fn clone(
        &self,
        snapshot: &Dataset,
        new_name: &str,
        properties: &PropertyMap,
    ) -> ZfsResult<Dataset> {
        require_snapshot(snapshot)?;
        validate_name("new_name", new_name)?;

        let params = NvList::ordered()
            .with("origin", snapshot.name.as_str())
            .with("props", property_list(properties)?);
        self.dispatcher.dispatch(ZFS_CLONE, new_name, params)?;
        info!(origin = %snapshot.name, name = %new_name, "Cloned snapshot");
        self.get(new_name)
    }

    /// Re-fetches every clone recorded on `snapshot`.
    pub fn clones(&self, snapshot: &Dataset) -> ZfsResult<Vec<Dataset>> {
        snapshot
            .clone_names()
            .iter()
            .map(|name| self.get(name))
            .collect()
    }

    /// Destroys `dataset`, first its children and clones when asked.
    ///
    /// This is not atomic. The first failure stops the walk and is returned;
    /// datasets destroyed before it stay destroyed. Calling again with the
    /// same options resumes where it stopped.
    pub fn destroy(&self, dataset: &Dataset, options: &DestroyOptions) -> ZfsResult<()> {
        if options.recursive {
            for child in self.children(dataset, 1)? {
                self.destroy(&child, options)?;
            }
        }

        if options.recursive_clones {
            let current = self.get(&dataset.name)?;
            for clone in self.clones(&current)? {
                self.destroy(&clone, options)?;
            }
        }

        if options.force_unmount && dataset.dataset_type == DatasetType::Filesystem {
            if let Some(unmounter) = &self.unmounter {
                unmounter
                    .unmount(&dataset.mountpoint, true)
                    .map_err(|source| ZfsError::Boundary {
                        command: COMMAND_UNMOUNT.to_string(),
                        source,
                    })?;
            }
        }

        let params = NvList::ordered().with("defer", options.deferred);
        self.dispatcher.dispatch(ZFS_DESTROY, &dataset.name, params)?;
        info!(name = %dataset.name, deferred = options.deferred, "Destroyed dataset");
        Ok(())
    }

    /// Snapshots `dataset` as `<dataset>@<name>`.
    ///
    /// The command is scoped to the pool. With `recursive`, the kernel also
    /// snapshots every descendant under the same name. Success means the
    /// kernel created the snapshot; fetch it with [`DatasetManager::get`].
    pub fn snapshot(&self, dataset: &Dataset, name: &str, recursive: bool) -> ZfsResult<()> {
        require("name", name)?;
        if dataset.is_snapshot() {
            return Err(ZfsError::InvalidOperation {
                name: dataset.name.clone(),
                reason: "cannot snapshot a snapshot",
            });
        }
        let full_name = format!("{}@{}", dataset.name, name);
        validate_name("name", &full_name)?;

        let params = NvList::ordered()
            .with("snaps", NvList::new().with(full_name.as_str(), true))
            .with("props", NvList::new())
            .with("recursive", recursive);
        let pool = pool_name(&dataset.name);
        let reply = self.dispatcher.dispatch(ZFS_SNAPSHOT, pool, params)?;
        check_errlist(ZFS_SNAPSHOT, &reply)?;
        info!(name = %full_name, pool = %pool, recursive, "Created snapshot");
        Ok(())
    }

    /// Rolls the snapshot's filesystem back to it. Newer snapshots block the
    /// rollback unless `destroy_more_recent` is set.
    pub fn rollback(&self, snapshot: &Dataset, destroy_more_recent: bool) -> ZfsResult<()> {
        require_snapshot(snapshot)?;

        let filesystem = snapshot.filesystem_name();
        let params = NvList::ordered()
            .with("target", snapshot.name.as_str())
            .with("destroy_more_recent", destroy_more_recent);
        self.dispatcher.dispatch(ZFS_ROLLBACK, filesystem, params)?;
        info!(snapshot = %snapshot.name, destroy_more_recent, "Rolled back");
        Ok(())
    }

    /// Streams `snapshot` to the open descriptor `sink`.
    pub fn send<F: AsRawFd>(
        &self,
        snapshot: &Dataset,
        sink: &F,
        options: &SendOptions,
    ) -> ZfsResult<()> {
        require_snapshot(snapshot)?;
        let fd = sink.as_raw_fd();
        let fd = u64::try_from(fd).map_err(|_| ZfsError::InvalidArgument {
            argument: fd.to_string(),
            reason: "invalid file descriptor",
        })?;

        let mut params = NvList::ordered().with("fd", fd);
        if let Some(from) = &options.from_snapshot {
            validate_name("from_snapshot", from)?;
            params.insert("fromsnap", from.as_str());
        }
        params.insert("largeblockok", options.large_blocks);
        params.insert("embedok", options.embedded);

        self.dispatcher.dispatch(ZFS_SEND, &snapshot.name, params)?;
        info!(
            snapshot = %snapshot.name,
            fd,
            incremental = options.from_snapshot.is_some(),
            "Sent snapshot"
        );
        Ok(())
    }

    /// Receiving send streams is not supported.
    pub fn receive_snapshot<F: AsRawFd>(&self, _source: &F, _name: &str) -> ZfsResult<Dataset> {
        Err(ZfsError::NotImplemented {
            feature: "receive_snapshot",
        })
    }

    /// Diffing snapshots is not supported.
    pub fn diff(&self, _snapshot: &Dataset, _other: &str) -> ZfsResult<Vec<String>> {
        Err(ZfsError::NotImplemented { feature: "diff" })
    }
}

fn require_snapshot(dataset: &Dataset) -> ZfsResult<()> {
    if !dataset.is_snapshot() {
        return Err(ZfsError::InvalidOperation {
            name: dataset.name.clone(),
            reason: "dataset is not a snapshot",
        });
    }
    Ok(())
}

/// Converts a flat property map into a native list. Nested lists are
/// rejected.
fn property_list(properties: &PropertyMap) -> ZfsResult<NvList> {
    let mut list = NvList::new();
    for (name, value) in properties {
        require("property name", name)?;
        if let NativeValue::List(_) = value {
            return Err(ZfsError::InvalidArgument {
                argument: name.clone(),
                reason: "property values must be flat",
            });
        }
        list.insert(name.as_str(), value.clone());
    }
    Ok(list)
}

/// Surfaces the first per-name failure in a reply's error list.
fn check_errlist(command: &str, reply: &NvList) -> ZfsResult<()> {
    let errlist = match reply.get(KEY_ERRLIST) {
        Some(NativeValue::List(errlist)) => errlist,
        _ => return Ok(()),
    };
    match errlist.iter().next() {
        None => Ok(()),
        Some((name, NativeValue::Uint64(errno))) => {
            let errno = i32::try_from(*errno).unwrap_or(libc::EINVAL);
            debug!(command = %command, name = %name, errno, "Per-name failure in reply");
            Err(ZfsError::Boundary {
                command: command.to_string(),
                source: BoundaryError::from_errno(errno),
            })
        }
        Some((name, other)) => Err(ZfsError::MalformedRecord {
            field: format!("{}.{}", KEY_ERRLIST, name),
            reason: format!("expected uint64, got {}", other.type_name()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertySource;
    use crate::record::ObjsetStats;
    use parking_lot::Mutex;

    /// Backend that answers every listing with a fixed reply.
    struct FixedList {
        reply: NvList,
        requests: Mutex<Vec<NvList>>,
    }

    impl FixedList {
        fn new(records: &[&str]) -> Arc<Self> {
            let mut reply = NvList::ordered();
            for name in records {
                let record = RawDatasetRecord {
                    name: name.to_string(),
                    stats: ObjsetStats {
                        dataset_type: DMU_OST_ZFS,
                        ..ObjsetStats::default()
                    },
                    ..RawDatasetRecord::default()
                };
                reply.insert(*name, record.to_native());
            }
            Arc::new(Self {
                reply,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl Ioctl for FixedList {
        fn invoke(
            &self,
            command: &str,
            _target: &str,
            request: &[u8],
        ) -> Result<Vec<u8>, BoundaryError> {
            assert_eq!(command, ZFS_LIST);
            let decoded =
                zkit_nv::decode(request).map_err(|_| BoundaryError::from_errno(libc::EINVAL))?;
            self.requests.lock().push(decoded);
            Ok(zkit_nv::encode(&self.reply).to_vec())
        }
    }

    fn manager(ioctl: Arc<FixedList>) -> DatasetManager<FixedList> {
        DatasetManager::new(ioctl, &ZfsConfig::default())
    }

    #[test]
    fn test_get_single_record() {
        let ds = manager(FixedList::new(&["tank/fs"])).get("tank/fs").unwrap();
        assert_eq!(ds.name, "tank/fs");
        assert_eq!(ds.mountpoint, "/tank/fs");
    }

    #[test]
    fn test_get_zero_records() {
        let err = manager(FixedList::new(&[])).get("tank/fs").unwrap_err();
        assert!(matches!(err, ZfsError::NotFound { ref name } if name == "tank/fs"));
    }

    #[test]
    fn test_get_two_records_is_ambiguous() {
        let err = manager(FixedList::new(&["tank/fs", "tank/fs2"]))
            .get("tank/fs")
            .unwrap_err();
        assert!(matches!(err, ZfsError::AmbiguousResult { count: 2, .. }));
        assert_eq!(err.to_string(), "Expected 1 dataset for tank/fs, got 2");
    }

    #[test]
    fn test_list_params() {
        let ioctl = FixedList::new(&[]);
        let mgr = manager(Arc::clone(&ioctl));
        mgr.list("tank", TypeFilter::Snapshot, true, 0).unwrap();
        mgr.list("tank", TypeFilter::All, true, 2).unwrap();
        mgr.list("tank", TypeFilter::Volume, false, 5).unwrap();

        let requests = ioctl.requests.lock();
        let types = requests[0].get("type").and_then(|v| v.as_list()).unwrap();
        assert_eq!(types.keys().collect::<Vec<_>>(), vec!["snapshot"]);
        assert_eq!(requests[0].get("recurse"), Some(&NativeValue::Boolean(true)));
        assert_eq!(requests[1].get("recurse"), Some(&NativeValue::Uint64(2)));
        assert_eq!(
            requests[1].get("type").and_then(|v| v.as_list()).map(|l| l.len()),
            Some(3)
        );
        assert!(requests[2].get("recurse").is_none());
    }

    #[test]
    fn test_empty_name_fails_fast() {
        let ioctl = FixedList::new(&[]);
        let err = manager(Arc::clone(&ioctl)).get("").unwrap_err();
        assert!(matches!(err, ZfsError::MissingArgument { argument: "name" }));
        assert!(ioctl.requests.lock().is_empty());
    }

    #[test]
    fn test_property_list_rejects_nested() {
        let mut props = PropertyMap::new();
        props.insert("compression".to_string(), "lz4".into());
        assert_eq!(property_list(&props).unwrap().len(), 1);

        props.insert("nested".to_string(), NvList::new().into());
        assert!(matches!(
            property_list(&props),
            Err(ZfsError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_errlist_maps_errno() {
        let reply = NvList::new().with(
            KEY_ERRLIST,
            NvList::new().with("tank@s", libc::EEXIST as u64),
        );
        let err = check_errlist(ZFS_SNAPSHOT, &reply).unwrap_err();
        assert!(matches!(
            err,
            ZfsError::Boundary {
                source: BoundaryError::Exists,
                ..
            }
        ));
        assert!(check_errlist(ZFS_SNAPSHOT, &NvList::new()).is_ok());
    }

    #[test]
    fn test_not_implemented_operations() {
        let mgr = manager(FixedList::new(&["tank@s"]));
        let ds = mgr.get("tank@s").unwrap();
        assert!(matches!(
            mgr.diff(&ds, "tank@t"),
            Err(ZfsError::NotImplemented { feature: "diff" })
        ));
        let file = tempfile::tempfile().unwrap();
        assert!(matches!(
            mgr.receive_snapshot(&file, "tank/recv"),
            Err(ZfsError::NotImplemented { .. })
        ));
        assert_eq!(
            ds.get_property("mountpoint").unwrap().source(),
            Some(&PropertySource::None)
        );
    }
}
