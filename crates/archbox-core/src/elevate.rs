//! Privilege elevation for the scanner exclusion.
//!
//! Only Windows needs this: registering a Defender exclusion requires an
//! administrator, and UAC asks the user through a foreground consent
//! dialog. Everywhere else [`Unsupported`] is selected and callers skip the
//! step. The exclusion is a convenience, so callers log failures and carry
//! on.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Runs a single command with elevated privileges.
pub trait ElevationRequester: Send + Sync {
    /// Whether this platform has an elevation primitive at all.
    fn is_available(&self) -> bool;

    /// Run `program` with `args` elevated. Blocks until the elevated process
    /// has finished when the implementation waits for completion.
    fn request_elevated(&self, program: &str, args: &str) -> Result<()>;
}

/// Platforms without interactive elevation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unsupported;

impl ElevationRequester for Unsupported {
    fn is_available(&self) -> bool {
        false
    }

    fn request_elevated(&self, _program: &str, _args: &str) -> Result<()> {
        Err(Error::ElevationUnavailable)
    }
}

/// `ShellExecuteExW` with the `runas` verb, which always raises the UAC
/// consent dialog.
#[cfg(windows)]
#[derive(Debug, Clone, Copy)]
pub struct RunAs {
    /// Block until the elevated process exits and check its exit code.
    pub wait: bool,
}

#[cfg(windows)]
impl ElevationRequester for RunAs {
    fn is_available(&self) -> bool {
        true
    }

    fn request_elevated(&self, program: &str, args: &str) -> Result<()> {
        win32::shell_execute_runas(program, args, self.wait)
    }
}

/// The elevation capability of the running platform.
pub fn for_current_platform() -> Arc<dyn ElevationRequester> {
    #[cfg(windows)]
    {
        Arc::new(RunAs { wait: true })
    }
    #[cfg(not(windows))]
    {
        Arc::new(Unsupported)
    }
}

/// PowerShell arguments that add `dir` to the Defender exclusion list.
pub fn scanner_exclusion_args(dir: &Path) -> String {
    let dir = dir.display().to_string().replace('\'', "''");
    format!(
        "-NoProfile -ExecutionPolicy Bypass -WindowStyle Hidden -Command \"Add-MpPreference -ExclusionPath '{dir}'\""
    )
}

/// Ask for elevation and register `dir` as a scanner exclusion.
pub fn register_scanner_exclusion(elevation: &dyn ElevationRequester, dir: &Path) -> Result<()> {
    if !elevation.is_available() {
        return Err(Error::ElevationUnavailable);
    }
    tracing::info!(dir = %dir.display(), "requesting scanner exclusion");
    elevation.request_elevated("powershell.exe", &scanner_exclusion_args(dir))
}

#[cfg(windows)]
#[allow(unsafe_code)]
mod win32 {
    use windows::Win32::Foundation::{CloseHandle, ERROR_CANCELLED, WAIT_FAILED};
    use windows::Win32::System::Threading::{GetExitCodeProcess, INFINITE, WaitForSingleObject};
    use windows::Win32::UI::Shell::{SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW, ShellExecuteExW};
    use windows::core::PCWSTR;

    use crate::error::{Error, Result};

    fn to_wide(s: &str) -> Vec<u16> {
        s.encode_utf16().chain(std::iter::once(0)).collect()
    }

    pub fn shell_execute_runas(program: &str, args: &str, wait: bool) -> Result<()> {
        let verb = to_wide("runas");
        let file = to_wide(program);
        let params = to_wide(args);

        let mut info = SHELLEXECUTEINFOW {
            cbSize: u32::try_from(std::mem::size_of::<SHELLEXECUTEINFOW>()).unwrap_or(u32::MAX),
            fMask: SEE_MASK_NOCLOSEPROCESS,
            lpVerb: PCWSTR(verb.as_ptr()),
            lpFile: PCWSTR(file.as_ptr()),
            lpParameters: PCWSTR(params.as_ptr()),
            nShow: 0, // SW_HIDE
            ..Default::default()
        };

        // SAFETY: every pointer in `info` refers to a NUL-terminated buffer
        // that outlives the call.
        if let Err(e) = unsafe { ShellExecuteExW(&mut info) } {
            if e.code() == ERROR_CANCELLED.to_hresult() {
                return Err(Error::Elevation("declined by user".into()));
            }
            return Err(Error::Elevation(format!("ShellExecuteExW: {e}")));
        }

        let process = info.hProcess;
        if process.is_invalid() {
            return Ok(());
        }

        let mut result = Ok(());
        if wait {
            // SAFETY: `process` is a live handle returned by ShellExecuteExW
            // because SEE_MASK_NOCLOSEPROCESS was set; it is closed below.
            unsafe {
                if WaitForSingleObject(process, INFINITE) == WAIT_FAILED {
                    result = Err(Error::Elevation("waiting for elevated process failed".into()));
                } else {
                    let mut code = 0u32;
                    if GetExitCodeProcess(process, &mut code).is_ok() && code != 0 {
                        result = Err(Error::Elevation(format!(
                            "{program} exited with code {code}"
                        )));
                    }
                }
            }
        }

        // SAFETY: closing the handle we own exactly once.
        unsafe {
            let _ = CloseHandle(process);
        }
        result
    }
}
