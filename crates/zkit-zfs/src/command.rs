//! Native command builder and dispatcher.
//!
//! Every request is an ordered list `{cmd, version, ...params}`. The kernel
//! reads command lists positionally, so parameters keep the order in which
//! the caller inserted them.

use std::sync::Arc;

use tracing::{debug, warn};
use zkit_nv::{NvConfig, NvList};

use crate::config::ZfsConfig;
use crate::context::OpContext;
use crate::error::{ZfsError, ZfsResult};
use crate::ioctl::Ioctl;

/// Current command format version.
pub const COMMAND_VERSION: u64 = 0;

/// List datasets.
pub const ZFS_LIST: &str = "zfs_list";
/// Create a filesystem or volume.
pub const ZFS_CREATE: &str = "zfs_create";
/// Clone a snapshot into a new dataset.
pub const ZFS_CLONE: &str = "zfs_clone";
/// Destroy a dataset.
pub const ZFS_DESTROY: &str = "zfs_destroy";
/// Create snapshots.
pub const ZFS_SNAPSHOT: &str = "zfs_snapshot";
/// Roll a filesystem back to a snapshot.
pub const ZFS_ROLLBACK: &str = "zfs_rollback";
/// Stream a snapshot to a file descriptor.
pub const ZFS_SEND: &str = "zfs_send";

/// Request key holding the command name.
pub const KEY_CMD: &str = "cmd";
/// Request key holding the command version.
pub const KEY_VERSION: &str = "version";

/// Builds, encodes, and issues native commands.
pub struct Dispatcher<I> {
    ioctl: Arc<I>,
    nv_config: NvConfig,
    version: u64,
    ctx: OpContext,
}

impl<I> Clone for Dispatcher<I> {
    fn clone(&self) -> Self {
        Self {
            ioctl: Arc::clone(&self.ioctl),
            nv_config: self.nv_config,
            version: self.version,
            ctx: self.ctx.clone(),
        }
    }
}

impl<I: Ioctl> Dispatcher<I> {
    /// Creates a dispatcher using the byte order, version, and default deadline from `config`.
    pub fn new(ioctl: Arc<I>, config: &ZfsConfig) -> Self {
        let ctx = match config.default_timeout() {
            Some(timeout) => OpContext::with_timeout(timeout),
            None => OpContext::new(),
        };
        Self {
            ioctl,
            nv_config: config.nv_config(),
            version: config.command_version,
            ctx,
        }
    }

    /// Returns a dispatcher sharing the same boundary with a different context.
    pub fn with_context(&self, ctx: OpContext) -> Self {
        Self {
            ctx,
            ..self.clone()
        }
    }

    /// Context checked before each command.
    pub fn context(&self) -> &OpContext {
        &self.ctx
    }

    /// The underlying command boundary.
    pub fn ioctl(&self) -> &Arc<I> {
        &self.ioctl
    }

    /// Builds the ordered request list `{cmd, version, ...params}`.
    pub fn build_request(&self, command: &str, params: &NvList) -> NvList {
        debug_assert!(
            !params.contains_key(KEY_CMD) && !params.contains_key(KEY_VERSION),
            "params must not override cmd or version"
        );
        let mut request = NvList::ordered()
            .with(KEY_CMD, command)
            .with(KEY_VERSION, self.version);
        request.extend_from(params);
        request
    }

    /// Issues one command and decodes its reply.
    ///
    /// An empty reply decodes to an empty list. Boundary and decode failures
    /// are tagged with the command name. Nothing is retried.
    pub fn dispatch(&self, command: &str, target: &str, params: NvList) -> ZfsResult<NvList> {
        self.ctx.check(command)?;

        let request = self.build_request(command, &params);
        let encoded = zkit_nv::encode_with(&request, &self.nv_config);
        debug!(
            command = %command,
            target = %target,
            bytes = encoded.len(),
            "Dispatching native command"
        );

        let reply = self
            .ioctl
            .invoke(command, target, &encoded)
            .map_err(|source| {
                warn!(
                    command = %command,
                    target = %target,
                    error = %source,
                    "Native command failed"
                );
                ZfsError::Boundary {
                    command: command.to_string(),
                    source,
                }
            })?;

        if reply.is_empty() {
            return Ok(NvList::new());
        }

        zkit_nv::decode(&reply).map_err(|source| {
            warn!(
                command = %command,
                target = %target,
                kind = source.kind(),
                error = %source,
                reply_bytes = reply.len(),
                "Malformed native reply"
            );
            ZfsError::Decode {
                command: command.to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CancelToken, OpContext};
    use crate::ioctl::BoundaryError;
    use parking_lot::Mutex;
    use zkit_nv::ByteOrder;

    /// Boundary double that records requests and returns a canned reply.
    struct Canned {
        reply: Result<Vec<u8>, BoundaryError>,
        seen: Mutex<Vec<(String, String, Vec<u8>)>>,
    }

    impl Canned {
        fn new(reply: Result<Vec<u8>, BoundaryError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Ioctl for Canned {
        fn invoke(
            &self,
            command: &str,
            target: &str,
            request: &[u8],
        ) -> Result<Vec<u8>, BoundaryError> {
            self.seen
                .lock()
                .push((command.to_string(), target.to_string(), request.to_vec()));
            self.reply.clone()
        }
    }

    #[test]
    fn test_request_order() {
        let dispatcher = Dispatcher::new(Canned::new(Ok(vec![])), &ZfsConfig::default());
        let params = NvList::ordered().with("defer", true).with("alpha", 1u64);
        let request = dispatcher.build_request(ZFS_DESTROY, &params);
        let keys: Vec<&str> = request.keys().collect();
        assert_eq!(keys, vec!["cmd", "version", "defer", "alpha"]);
        assert_eq!(request.get("cmd").and_then(|v| v.as_str()), Some("zfs_destroy"));
        assert_eq!(request.get("version").and_then(|v| v.as_u64()), Some(0));
    }

    #[test]
    fn test_dispatch_encodes_request() {
        let ioctl = Canned::new(Ok(vec![]));
        let config = ZfsConfig {
            byte_order: ByteOrder::Big,
            ..ZfsConfig::default()
        };
        let dispatcher = Dispatcher::new(Arc::clone(&ioctl), &config);
        let reply = dispatcher
            .dispatch(ZFS_DESTROY, "tank/fs", NvList::ordered().with("defer", false))
            .unwrap();
        assert!(reply.is_empty());

        let seen = ioctl.seen.lock();
        assert_eq!(seen.len(), 1);
        let (command, target, request) = &seen[0];
        assert_eq!(command, "zfs_destroy");
        assert_eq!(target, "tank/fs");
        let decoded = zkit_nv::decode(request).unwrap();
        let expected = NvList::ordered()
            .with("cmd", "zfs_destroy")
            .with("version", 0u64)
            .with("defer", false);
        assert!(decoded.same_order(&expected));
    }

    #[test]
    fn test_dispatch_decodes_reply() {
        let reply = NvList::new().with("target", "tank/fs");
        let ioctl = Canned::new(Ok(zkit_nv::encode(&reply).to_vec()));
        let dispatcher = Dispatcher::new(ioctl, &ZfsConfig::default());
        let decoded = dispatcher
            .dispatch(ZFS_ROLLBACK, "tank/fs", NvList::ordered())
            .unwrap();
        assert_eq!(decoded, reply);
    }

    #[test]
    fn test_boundary_error_tagged() {
        let ioctl = Canned::new(Err(BoundaryError::Busy));
        let dispatcher = Dispatcher::new(ioctl, &ZfsConfig::default());
        let err = dispatcher
            .dispatch(ZFS_DESTROY, "tank/fs", NvList::ordered())
            .unwrap_err();
        match err {
            ZfsError::Boundary { command, source } => {
                assert_eq!(command, "zfs_destroy");
                assert_eq!(source, BoundaryError::Busy);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_reply_is_decode_error() {
        let ioctl = Canned::new(Ok(vec![0, 1, 0]));
        let dispatcher = Dispatcher::new(ioctl, &ZfsConfig::default());
        let err = dispatcher
            .dispatch(ZFS_LIST, "tank", NvList::ordered())
            .unwrap_err();
        assert!(matches!(err, ZfsError::Decode { ref command, .. } if command == "zfs_list"));
    }

    #[test]
    fn test_cancelled_context_skips_boundary() {
        let ioctl = Canned::new(Ok(vec![]));
        let token = CancelToken::new();
        token.cancel();
        let dispatcher = Dispatcher::new(Arc::clone(&ioctl), &ZfsConfig::default())
            .with_context(OpContext::new().with_cancel(token));
        let err = dispatcher
            .dispatch(ZFS_DESTROY, "tank/fs", NvList::ordered())
            .unwrap_err();
        assert!(matches!(err, ZfsError::Cancelled { .. }));
        assert!(ioctl.seen.lock().is_empty());
    }
}
