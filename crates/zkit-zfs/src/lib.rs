#![warn(missing_docs)]

//! zkit dataset subsystem: ZFS dataset lifecycle over the native command interface
//!
//! This crate turns dataset operations (list, create, clone, snapshot,
//! rollback, send, destroy) into native command lists, issues them through a
//! pluggable [`Ioctl`] boundary, and interprets the replies as typed
//! [`Dataset`] values with a statically checked property schema.

pub mod command;
pub mod config;
pub mod context;
pub mod dataset;
pub mod error;
pub mod ioctl;
pub mod manager;
pub mod mock;
pub mod property;
pub mod record;

pub use command::{Dispatcher, COMMAND_VERSION};
pub use config::ZfsConfig;
pub use context::{CancelToken, Deadline, OpContext};
pub use dataset::{Dataset, DatasetType, DestroyOptions, SendOptions, TypeFilter};
pub use error::{ZfsError, ZfsResult};
pub use ioctl::{BoundaryError, Ioctl, Unmounter};
pub use manager::{DatasetManager, PropertyMap};
pub use mock::{MockIoctl, RecordedCall, RecordedSend};
pub use property::{DatasetProperty, PropertyShape, PropertySource, PropertyValue, RawProperties};
pub use record::{ObjsetStats, RawDatasetRecord};
