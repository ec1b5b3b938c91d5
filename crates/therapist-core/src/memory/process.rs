//! Attaching to the game process.
//!
//! Only Windows targets can actually open a process; on other platforms
//! every attach reports [`AttachError::PlatformUnsupported`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::{Address, ReadMemory, WriteMemory};
use crate::error::{AttachError, MemoryError, MemoryResult};

/// Executable name of the game, used when no explicit target is given.
pub const DEFAULT_PROCESS_NAME: &str = "dwarfort.exe";

/// A running process seen during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// An attached foreign process.
///
/// Exactly one session owns a handle. Once [`ProcessHandle::invalidate`] is
/// called, or the process is observed to have exited, every read and write
/// fails with [`MemoryError::AccessRevoked`].
pub struct ProcessHandle {
    pub pid: u32,
    pub name: String,
    pub base_address: Address,
    pub module_size: u32,
    revoked: AtomicBool,
    #[cfg(target_os = "windows")]
    handle: windows::Win32::Foundation::HANDLE,
}

// SAFETY: Windows process HANDLEs are process-wide and can be used from any
// thread; ReadProcessMemory/WriteProcessMemory do not require affinity.
#[cfg(target_os = "windows")]
unsafe impl Send for ProcessHandle {}
#[cfg(target_os = "windows")]
unsafe impl Sync for ProcessHandle {}

impl ProcessHandle {
    /// Find a process by executable name (case-insensitive) and attach to it.
    pub fn find_and_open(name: &str) -> Result<Self, AttachError> {
        let process = list_processes()?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| AttachError::ProcessNotFound(name.to_string()))?;

        debug!("Found {} with PID {}", process.name, process.pid);
        Self::open(process.pid)
    }

    /// Revoke this handle. In-flight operations fail on their next access.
    pub fn invalidate(&self) {
        if !self.revoked.swap(true, Ordering::SeqCst) {
            info!("Process handle for PID {} invalidated", self.pid);
        }
    }

    fn check_access(&self) -> MemoryResult<()> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(MemoryError::AccessRevoked);
        }
        Ok(())
    }
}

#[cfg(target_os = "windows")]
mod platform {
    use std::ffi::c_void;

    use windows::Win32::Foundation::{
        CloseHandle, ERROR_ACCESS_DENIED, ERROR_PARTIAL_COPY, STILL_ACTIVE,
    };
    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQueryEx,
    };
    use windows::Win32::System::Threading::{
        GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
        PROCESS_VM_READ, PROCESS_VM_WRITE,
    };

    use super::*;

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    pub fn list_processes() -> Result<Vec<ProcessInfo>, AttachError> {
        // SAFETY: snapshot creation has no preconditions; the handle is closed below.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| AttachError::ProcessNotFound(format!("process snapshot failed: {e}")))?;

        let mut processes = Vec::new();
        let mut entry = PROCESSENTRY32W {
            dwSize: std::mem::size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: entry is a properly sized PROCESSENTRY32W owned by this frame.
        let mut ok = unsafe { Process32FirstW(snapshot, &mut entry) }.is_ok();
        while ok {
            processes.push(ProcessInfo {
                pid: entry.th32ProcessID,
                name: wide_to_string(&entry.szExeFile),
            });
            // SAFETY: same as above.
            ok = unsafe { Process32NextW(snapshot, &mut entry) }.is_ok();
        }

        // SAFETY: snapshot is a valid handle returned above.
        let _ = unsafe { CloseHandle(snapshot) };
        Ok(processes)
    }

    pub fn open(pid: u32) -> Result<ProcessHandle, AttachError> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;

        // SAFETY: OpenProcess has no memory-safety preconditions.
        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(|e| {
            if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
                AttachError::PermissionDenied {
                    pid,
                    message: e.message(),
                }
            } else {
                AttachError::ProcessNotFound(format!("PID {pid}: {e}"))
            }
        })?;

        let (base_address, module_size, name) = match main_module(pid) {
            Ok(module) => module,
            Err(e) => {
                // SAFETY: handle was returned by OpenProcess above.
                let _ = unsafe { CloseHandle(handle) };
                return Err(e);
            }
        };

        info!(
            "Attached to {} (PID: {}, base: 0x{:X}, size: 0x{:X})",
            name, pid, base_address, module_size
        );

        Ok(ProcessHandle {
            pid,
            name,
            base_address,
            module_size,
            revoked: AtomicBool::new(false),
            handle,
        })
    }

    fn main_module(pid: u32) -> Result<(Address, u32, String), AttachError> {
        // SAFETY: snapshot creation has no preconditions; the handle is closed below.
        let snapshot =
            unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
                .map_err(|e| AttachError::PermissionDenied {
                    pid,
                    message: e.message(),
                })?;

        let mut entry = MODULEENTRY32W {
            dwSize: std::mem::size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };
        // SAFETY: entry is a properly sized MODULEENTRY32W owned by this frame.
        let first = unsafe { Module32FirstW(snapshot, &mut entry) };
        // SAFETY: snapshot is a valid handle returned above.
        let _ = unsafe { CloseHandle(snapshot) };

        first.map_err(|e| AttachError::ProcessNotFound(format!("PID {pid} has no modules: {e}")))?;
        Ok((
            entry.modBaseAddr as Address,
            entry.modBaseSize,
            wide_to_string(&entry.szModule),
        ))
    }

    impl ProcessHandle {
        fn process_alive(&self) -> bool {
            let mut code = 0u32;
            // SAFETY: handle is valid for the lifetime of self.
            unsafe { GetExitCodeProcess(self.handle, &mut code) }.is_ok()
                && code == STILL_ACTIVE.0 as u32
        }

        /// Map an OS failure to the error taxonomy, revoking the handle if the
        /// process is gone.
        fn classify(
            &self,
            address: Address,
            size: usize,
            err: windows::core::Error,
            write: bool,
        ) -> MemoryError {
            if !self.process_alive() {
                self.invalidate();
                return MemoryError::AccessRevoked;
            }
            if err.code() == ERROR_PARTIAL_COPY.to_hresult() {
                return MemoryError::AddressOutOfRange { address, size };
            }
            if write {
                MemoryError::WriteFailed {
                    address,
                    message: err.message(),
                }
            } else {
                MemoryError::ReadFailed {
                    address,
                    message: err.message(),
                }
            }
        }

        pub(super) fn read_raw(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut read = 0usize;
            // SAFETY: buffer has exactly `size` writable bytes.
            let result = unsafe {
                ReadProcessMemory(
                    self.handle,
                    address as *const c_void,
                    buffer.as_mut_ptr() as *mut c_void,
                    size,
                    Some(&mut read),
                )
            };
            match result {
                Ok(()) if read == size => Ok(buffer),
                Ok(()) => Err(MemoryError::AddressOutOfRange { address, size }),
                Err(e) => Err(self.classify(address, size, e, false)),
            }
        }

        pub(super) fn write_raw(&self, address: Address, bytes: &[u8]) -> MemoryResult<()> {
            let mut written = 0usize;
            // SAFETY: bytes is a valid readable slice of the given length.
            let result = unsafe {
                WriteProcessMemory(
                    self.handle,
                    address as *const c_void,
                    bytes.as_ptr() as *const c_void,
                    bytes.len(),
                    Some(&mut written),
                )
            };
            match result {
                Ok(()) if written == bytes.len() => Ok(()),
                Ok(()) => Err(MemoryError::AddressOutOfRange {
                    address,
                    size: bytes.len(),
                }),
                Err(e) => Err(self.classify(address, bytes.len(), e, true)),
            }
        }

        pub(super) fn query_mapped(&self, address: Address) -> bool {
            let mut info = MEMORY_BASIC_INFORMATION::default();
            // SAFETY: info is a properly sized MEMORY_BASIC_INFORMATION.
            let written = unsafe {
                VirtualQueryEx(
                    self.handle,
                    Some(address as *const c_void),
                    &mut info,
                    std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            written != 0
                && info.State == MEM_COMMIT
                && info.Protect != PAGE_NOACCESS
                && (info.Protect.0 & PAGE_GUARD.0) == 0
        }

        pub(super) fn alive(&self) -> bool {
            self.process_alive()
        }
    }

    impl Drop for ProcessHandle {
        fn drop(&mut self) {
            // SAFETY: handle was returned by OpenProcess and is closed exactly once.
            let _ = unsafe { CloseHandle(self.handle) };
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod platform {
    use super::*;

    pub fn list_processes() -> Result<Vec<ProcessInfo>, AttachError> {
        Err(AttachError::PlatformUnsupported)
    }

    pub fn open(_pid: u32) -> Result<ProcessHandle, AttachError> {
        Err(AttachError::PlatformUnsupported)
    }

    impl ProcessHandle {
        pub(super) fn read_raw(&self, _address: Address, _size: usize) -> MemoryResult<Vec<u8>> {
            Err(MemoryError::AccessRevoked)
        }

        pub(super) fn write_raw(&self, _address: Address, _bytes: &[u8]) -> MemoryResult<()> {
            Err(MemoryError::AccessRevoked)
        }

        pub(super) fn query_mapped(&self, _address: Address) -> bool {
            false
        }

        pub(super) fn alive(&self) -> bool {
            false
        }
    }
}

/// Enumerate running processes.
pub fn list_processes() -> Result<Vec<ProcessInfo>, AttachError> {
    platform::list_processes()
}

impl ProcessHandle {
    /// Attach to a process by PID.
    pub fn open(pid: u32) -> Result<Self, AttachError> {
        platform::open(pid)
    }
}

impl ReadMemory for ProcessHandle {
    fn read_bytes(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        self.check_access()?;
        self.read_raw(address, size)
    }

    fn base_address(&self) -> Address {
        self.base_address
    }

    fn is_valid(&self) -> bool {
        if self.revoked.load(Ordering::SeqCst) {
            return false;
        }
        if !self.alive() {
            warn!("Process {} (PID {}) has exited", self.name, self.pid);
            self.invalidate();
            return false;
        }
        true
    }

    fn is_mapped(&self, address: Address) -> bool {
        address != 0 && !self.revoked.load(Ordering::SeqCst) && self.query_mapped(address)
    }
}

impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, address: Address, bytes: &[u8]) -> MemoryResult<()> {
        self.check_access()?;
        debug!("Writing {} bytes at 0x{:X}", bytes.len(), address);
        self.write_raw(address, bytes)
    }
}
