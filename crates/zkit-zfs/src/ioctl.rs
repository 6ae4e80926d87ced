//! Kernel command boundary.
//!
//! The raw ioctl syscall lives outside this crate. [`Ioctl`] is the seam it
//! plugs into: it takes a command name, a target dataset, and an encoded
//! request, and returns an encoded reply or a [`BoundaryError`].
//! [`crate::mock::MockIoctl`] implements the same seam in memory.

use std::sync::Arc;

use thiserror::Error;

/// Failure reported by the kernel boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// The dataset or snapshot does not exist.
    #[error("dataset or snapshot not found")]
    NotFound,
    /// The dataset is busy or still referenced.
    #[error("dataset is busy")]
    Busy,
    /// The caller lacks permission.
    #[error("permission denied")]
    PermissionDenied,
    /// The dataset already exists.
    #[error("dataset already exists")]
    Exists,
    /// Any other failure.
    #[error("errno {errno}: {message}")]
    Failure {
        /// Raw errno value.
        errno: i32,
        /// Description of the failure.
        message: String,
    },
}

impl BoundaryError {
    /// Maps a kernel errno to a boundary error.
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::ENOENT => BoundaryError::NotFound,
            libc::EBUSY => BoundaryError::Busy,
            libc::EPERM | libc::EACCES => BoundaryError::PermissionDenied,
            libc::EEXIST => BoundaryError::Exists,
            _ => BoundaryError::Failure {
                errno,
                message: std::io::Error::from_raw_os_error(errno).to_string(),
            },
        }
    }

    /// Returns the errno this error corresponds to.
    pub fn errno(&self) -> i32 {
        match self {
            BoundaryError::NotFound => libc::ENOENT,
            BoundaryError::Busy => libc::EBUSY,
            BoundaryError::PermissionDenied => libc::EPERM,
            BoundaryError::Exists => libc::EEXIST,
            BoundaryError::Failure { errno, .. } => *errno,
        }
    }
}

/// Synchronous kernel command interface.
pub trait Ioctl: Send + Sync {
    /// Executes `command` against `target` with an encoded request.
    /// Returns the encoded reply, which may be empty.
    fn invoke(
        &self,
        command: &str,
        target: &str,
        request: &[u8],
    ) -> Result<Vec<u8>, BoundaryError>;
}

impl<T: Ioctl + ?Sized> Ioctl for Arc<T> {
    fn invoke(
        &self,
        command: &str,
        target: &str,
        request: &[u8],
    ) -> Result<Vec<u8>, BoundaryError> {
        (**self).invoke(command, target, request)
    }
}

/// Unmounts filesystems before they are destroyed.
pub trait Unmounter: Send + Sync {
    /// Unmounts the filesystem mounted at `mountpoint`.
    fn unmount(&self, mountpoint: &str, force: bool) -> Result<(), BoundaryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno_known() {
        assert_eq!(BoundaryError::from_errno(libc::ENOENT), BoundaryError::NotFound);
        assert_eq!(BoundaryError::from_errno(libc::EBUSY), BoundaryError::Busy);
        assert_eq!(
            BoundaryError::from_errno(libc::EACCES),
            BoundaryError::PermissionDenied
        );
        assert_eq!(BoundaryError::from_errno(libc::EEXIST), BoundaryError::Exists);
    }

    #[test]
    fn test_from_errno_generic() {
        let err = BoundaryError::from_errno(libc::EIO);
        match &err {
            BoundaryError::Failure { errno, message } => {
                assert_eq!(*errno, libc::EIO);
                assert!(!message.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.errno(), libc::EIO);
    }

    #[test]
    fn test_errno_round_trip() {
        for err in [
            BoundaryError::NotFound,
            BoundaryError::Busy,
            BoundaryError::Exists,
        ] {
            assert_eq!(BoundaryError::from_errno(err.errno()), err);
        }
    }
}
