// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! File-backed mapping for Unix hosts.
//!
//! The record lives in `<shm_dir>/<name>`. The creator holds an exclusive
//! `flock` on the file for as long as its region exists; the kernel drops the
//! lock when the process dies, however it dies. An opener that can take a
//! shared lock has found a file with no helper behind it, removes it, and
//! reports the helper as not running.
//!
//! Removing the file only removes the name: mappings already established
//! stay valid until they are dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::thread;
use std::time::Duration;

use memmap2::MmapMut;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, warn};

use super::layout::{SharedBlock, RECORD_SIZE};
use super::{ChannelConfig, ChannelError};

const CREATE_ATTEMPTS: u32 = 3;
const CREATE_RETRY_DELAY: Duration = Duration::from_millis(10);

pub(super) struct Region {
    // Keeps the mapping alive for `block`.
    _map: MmapMut,
    block: NonNull<SharedBlock>,
    path: PathBuf,
    // Creator only. Released after `Drop` has removed the name.
    creator_lock: Option<Flock<File>>,
}

// SAFETY: `block` points into `_map`, which moves with the region. The record
// is only touched through atomics.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    pub(super) fn create(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let path = config.shm_dir.join(&config.name);
        let mut attempt = 0;
        let lock = loop {
            attempt += 1;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                // An opener clearing a stale file may have unlinked it
                // between our open and our lock.
                Ok(lock) => {
                    if is_linked_at(&lock, &path)? {
                        break lock;
                    }
                }
                // Held by a live helper, or briefly by an opener checking it.
                Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                    if attempt >= CREATE_ATTEMPTS {
                        return Err(ChannelError::AlreadyRunning(config.name.clone()));
                    }
                }
                Err((_, errno)) => return Err(io::Error::from(errno).into()),
            }
            if attempt >= CREATE_ATTEMPTS {
                return Err(ChannelError::Io(io::Error::other(
                    "channel file was removed while being created",
                )));
            }
            thread::sleep(CREATE_RETRY_DELAY);
        };

        // Truncation to zero then extension zero-fills the record.
        lock.set_len(0)?;
        lock.set_len(RECORD_SIZE as u64)?;
        let (map, block) = map_record(&lock)?;
        let region = Self {
            _map: map,
            block,
            path,
            creator_lock: Some(lock),
        };
        debug!(path = %region.path.display(), "channel created");
        Ok(region)
    }

    pub(super) fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let path = config.shm_dir.join(&config.name);
        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ChannelError::NotRunning(config.name.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        let file = match Flock::lock(file, FlockArg::LockSharedNonblock) {
            Ok(stale) => {
                // Still holding the lock, so no new creator can claim the
                // file before it is gone.
                match fs::remove_file(&path) {
                    Ok(()) => warn!(path = %path.display(), "removed channel left by a dead helper"),
                    Err(e) => debug!(path = %path.display(), error = %e, "stale channel already gone"),
                }
                drop(stale);
                return Err(ChannelError::NotRunning(config.name.clone()));
            }
            Err((file, errno)) if errno == Errno::EWOULDBLOCK => file,
            Err((_, errno)) => return Err(io::Error::from(errno).into()),
        };

        let len = file.metadata()?.len();
        if len < RECORD_SIZE as u64 {
            return Err(ChannelError::LayoutMismatch {
                expected: RECORD_SIZE,
                actual: usize::try_from(len).unwrap_or(0),
            });
        }
        let (map, block) = map_record(&file)?;
        Ok(Self {
            _map: map,
            block,
            path,
            creator_lock: None,
        })
    }

    pub(super) fn block(&self) -> &SharedBlock {
        // SAFETY: page-aligned mapping of at least RECORD_SIZE bytes, alive
        // as long as `self`. Every field is an atomic, so shared references
        // are sound even while another process writes.
        unsafe { self.block.as_ref() }
    }
}

fn map_record(file: &File) -> Result<(MmapMut, NonNull<SharedBlock>), ChannelError> {
    // SAFETY: the file is at least RECORD_SIZE bytes. Other processes may
    // write it concurrently, which is why the record is accessed only
    // through atomics.
    let mut map = unsafe { MmapMut::map_mut(file)? };
    let block = NonNull::new(map.as_mut_ptr().cast::<SharedBlock>())
        .ok_or_else(|| ChannelError::Io(io::Error::other("null mapping")))?;
    Ok((map, block))
}

/// Whether `path` still names the file behind `file`.
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(named) => Ok(named.dev() == held.dev() && named.ino() == held.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.creator_lock.is_some() {
            if let Err(e) = fs::remove_file(&self.path) {
                debug!(path = %self.path.display(), error = %e, "channel name already gone");
            }
        }
    }
}
