// Copyright 2024-2026 vram-pressure Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pagefile-backed named file mapping for Windows hosts.
//!
//! The record is the section object `Local\<name>`. The kernel keeps it alive
//! until the last handle and view are closed.

use std::ffi::CString;
use std::mem::{size_of, zeroed};
use std::ptr::{self, NonNull};

use tracing::debug;
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Memory::{
    CreateFileMappingA, MapViewOfFile, OpenFileMappingA, UnmapViewOfFile, VirtualQuery,
    FILE_MAP_ALL_ACCESS, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS, PAGE_READWRITE,
};

use super::layout::{SharedBlock, RECORD_SIZE};
use super::{ChannelConfig, ChannelError};

const ERROR_FILE_NOT_FOUND: u32 = 2;

pub(super) struct Region {
    handle: HANDLE,
    block: NonNull<SharedBlock>,
}

// SAFETY: the view stays mapped until drop and is only touched through
// atomics. Section handles may be used from any thread.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

fn section_name(config: &ChannelConfig) -> Result<CString, ChannelError> {
    CString::new(format!("Local\\{}", config.name))
        .map_err(|_| ChannelError::InvalidName(config.name.clone()))
}

impl Region {
    pub(super) fn create(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let name = section_name(config)?;
        // SAFETY: FFI call with a NUL-terminated name; a null handle signals
        // failure.
        let handle = unsafe {
            CreateFileMappingA(
                INVALID_HANDLE_VALUE,
                ptr::null(),
                PAGE_READWRITE,
                0,
                RECORD_SIZE as u32,
                name.as_ptr().cast(),
            )
        };
        if handle == 0 {
            return Err(last_os_error("CreateFileMappingA"));
        }
        let region = Self::map(handle)?;
        // The section may predate us if a previous helper leaked a handle.
        // SAFETY: the view spans RECORD_SIZE writable bytes.
        unsafe { ptr::write_bytes(region.block.as_ptr().cast::<u8>(), 0, RECORD_SIZE) };
        debug!(name = %config.name, "channel created");
        Ok(region)
    }

    pub(super) fn open(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let name = section_name(config)?;
        // SAFETY: FFI call with a NUL-terminated name.
        let handle = unsafe { OpenFileMappingA(FILE_MAP_ALL_ACCESS, 0, name.as_ptr().cast()) };
        if handle == 0 {
            // SAFETY: reads thread-local error state.
            let code = unsafe { GetLastError() };
            if code == ERROR_FILE_NOT_FOUND {
                return Err(ChannelError::NotRunning(config.name.clone()));
            }
            return Err(ChannelError::Os {
                call: "OpenFileMappingA",
                code,
            });
        }
        let region = Self::map(handle)?;

        // SAFETY: queries our own view; the struct is plain data.
        let mut info: MEMORY_BASIC_INFORMATION = unsafe { zeroed() };
        let written = unsafe {
            VirtualQuery(
                region.block.as_ptr().cast(),
                &mut info,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written != 0 && info.RegionSize < RECORD_SIZE {
            return Err(ChannelError::LayoutMismatch {
                expected: RECORD_SIZE,
                actual: info.RegionSize,
            });
        }
        Ok(region)
    }

    fn map(handle: HANDLE) -> Result<Self, ChannelError> {
        // SAFETY: `handle` is a live section handle.
        let view = unsafe { MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, RECORD_SIZE) };
        match NonNull::new(view.Value.cast::<SharedBlock>()) {
            Some(block) => Ok(Self { handle, block }),
            None => {
                let err = last_os_error("MapViewOfFile");
                // SAFETY: closing the handle we own.
                unsafe { CloseHandle(handle) };
                Err(err)
            }
        }
    }

    pub(super) fn block(&self) -> &SharedBlock {
        // SAFETY: page-aligned view of at least RECORD_SIZE bytes, alive as
        // long as `self`. Every field is an atomic.
        unsafe { self.block.as_ref() }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: unmapping our own view and closing our own handle.
        unsafe {
            UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS {
                Value: self.block.as_ptr().cast(),
            });
            CloseHandle(self.handle);
        }
    }
}

fn last_os_error(call: &'static str) -> ChannelError {
    // SAFETY: reads thread-local error state.
    let code = unsafe { GetLastError() };
    ChannelError::Os { call, code }
}
