//! Volume control calls against a live NTFS volume

use super::reader::{JournalState, JournalVolume};
use crate::types::JournalError;
use std::ffi::c_void;
use std::mem::size_of;
use tracing::debug;
use windows::core::HSTRING;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_HANDLE_EOF, ERROR_JOURNAL_NOT_ACTIVE, GENERIC_READ,
    HANDLE,
};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetVolumeInformationW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_READ,
    FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows::Win32::System::Ioctl::{
    CREATE_USN_JOURNAL_DATA, FSCTL_CREATE_USN_JOURNAL, FSCTL_ENUM_USN_DATA,
    FSCTL_QUERY_USN_JOURNAL, MFT_ENUM_DATA_V0, USN_JOURNAL_DATA_V0,
};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};
use windows::Win32::System::IO::DeviceIoControl;

/// Open handle on a volume device (`\\.\C:`)
pub struct WindowsVolume {
    handle: HANDLE,
    volume: String,
}

impl WindowsVolume {
    /// Open `volume` (a drive such as `C:`) for journal reads
    pub fn open(volume: &str) -> Result<Self, JournalError> {
        let device = HSTRING::from(format!("\\\\.\\{}", volume));

        let handle = unsafe {
            CreateFileW(
                &device,
                GENERIC_READ.0,
                FILE_SHARE_READ | FILE_SHARE_WRITE,
                None,
                OPEN_EXISTING,
                FILE_FLAGS_AND_ATTRIBUTES(0),
                None,
            )
        }
        .map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                JournalError::AccessDenied {
                    volume: volume.to_string(),
                }
            } else {
                ioctl_error("CreateFileW", &e)
            }
        })?;

        debug!(volume, "Opened volume handle");
        Ok(Self {
            handle,
            volume: volume.to_string(),
        })
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    fn control<I>(
        &self,
        operation: &'static str,
        code: u32,
        input: Option<&I>,
        output: Option<&mut [u8]>,
    ) -> Result<usize, windows::core::Error> {
        let (in_ptr, in_len) = match input {
            Some(value) => (Some(value as *const I as *const c_void), size_of::<I>() as u32),
            None => (None, 0),
        };
        let (out_ptr, out_len) = match output {
            Some(buf) => (Some(buf.as_mut_ptr() as *mut c_void), buf.len() as u32),
            None => (None, 0),
        };
        let mut returned = 0u32;

        unsafe {
            DeviceIoControl(
                self.handle,
                code,
                in_ptr,
                in_len,
                out_ptr,
                out_len,
                Some(&mut returned as *mut u32),
                None,
            )
        }?;

        debug!(operation, returned, "Volume control call completed");
        Ok(returned as usize)
    }
}

impl Drop for WindowsVolume {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

fn ioctl_error(operation: &'static str, error: &windows::core::Error) -> JournalError {
    JournalError::Ioctl {
        operation,
        code: error.code().0 as u32,
    }
}

impl JournalVolume for WindowsVolume {
    fn query_state(&mut self) -> Result<JournalState, JournalError> {
        let mut data = USN_JOURNAL_DATA_V0::default();
        let out = unsafe {
            std::slice::from_raw_parts_mut(
                &mut data as *mut USN_JOURNAL_DATA_V0 as *mut u8,
                size_of::<USN_JOURNAL_DATA_V0>(),
            )
        };

        self.control::<()>("FSCTL_QUERY_USN_JOURNAL", FSCTL_QUERY_USN_JOURNAL, None, Some(out))
            .map_err(|e| {
                if e.code() == ERROR_JOURNAL_NOT_ACTIVE.to_hresult() {
                    JournalError::JournalNotFound
                } else {
                    ioctl_error("FSCTL_QUERY_USN_JOURNAL", &e)
                }
            })?;

        Ok(JournalState {
            journal_id: data.UsnJournalID,
            first_usn: data.FirstUsn,
            next_usn: data.NextUsn,
            lowest_valid_usn: data.LowestValidUsn,
            max_usn: data.MaxUsn,
            maximum_size: data.MaximumSize,
            allocation_delta: data.AllocationDelta,
        })
    }

    fn ensure_journal(&mut self, maximum_size: u64, allocation_delta: u64) -> Result<(), JournalError> {
        let request = CREATE_USN_JOURNAL_DATA {
            MaximumSize: maximum_size,
            AllocationDelta: allocation_delta,
        };
        self.control("FSCTL_CREATE_USN_JOURNAL", FSCTL_CREATE_USN_JOURNAL, Some(&request), None)
            .map_err(|e| ioctl_error("FSCTL_CREATE_USN_JOURNAL", &e))?;
        Ok(())
    }

    fn enum_chunk(&mut self, start_id: u64, high_usn: i64, buf: &mut [u8]) -> Result<usize, JournalError> {
        let request = MFT_ENUM_DATA_V0 {
            StartFileReferenceNumber: start_id,
            LowUsn: 0,
            HighUsn: high_usn,
        };
        match self.control("FSCTL_ENUM_USN_DATA", FSCTL_ENUM_USN_DATA, Some(&request), Some(buf)) {
            Ok(written) => Ok(written),
            Err(e) if e.code() == ERROR_HANDLE_EOF.to_hresult() => Ok(0),
            Err(e) => Err(ioctl_error("FSCTL_ENUM_USN_DATA", &e)),
        }
    }
}

/// Whether the current process runs with an elevated token
pub fn is_elevated() -> bool {
    let mut token = HANDLE::default();
    if unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) }.is_err() {
        return false;
    }

    let mut elevation = TOKEN_ELEVATION::default();
    let mut returned = 0u32;
    let queried = unsafe {
        GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut TOKEN_ELEVATION as *mut c_void),
            size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        )
    };
    unsafe {
        let _ = CloseHandle(token);
    }

    queried.is_ok() && elevation.TokenIsElevated != 0
}

/// Filesystem name of the volume holding `volume` (e.g. `NTFS`)
pub fn filesystem_name(volume: &str) -> Option<String> {
    let root = HSTRING::from(format!("{}\\", volume));
    let mut name = [0u16; 64];

    unsafe { GetVolumeInformationW(&root, None, None, None, None, Some(&mut name)) }.ok()?;

    let len = name.iter().position(|&c| c == 0).unwrap_or(name.len());
    Some(String::from_utf16_lossy(&name[..len]))
}
