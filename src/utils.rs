//! Utility functions for disk space checking and filesystem helpers

use crate::error::{Error, Result};
use std::path::Path;

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Arguments
///
/// * `path` - The path to check (typically the output directory)
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: This is safe because:
        // 1. c_path is a valid, null-terminated C string created from the input path
        // 2. stat is properly initialized with zeroed memory before the call
        // 3. We check the return value and propagate any OS errors
        // 4. The statvfs struct is only read after a successful call
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is available blocks for unprivileged users;
            // f_frsize is the fragment size (preferred over f_bsize)
            let available_bytes = stat.f_bavail.saturating_mul(stat.f_frsize);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0)) // null terminator
            .collect();

        // SAFETY: This is safe because:
        // 1. wide_path is a valid, null-terminated wide string
        // 2. All output pointers point to valid, properly aligned u64 variables
        // 3. We check the return value and propagate any OS errors
        // 4. The output variables are only read after a successful call
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Ensure a directory has at least `required` bytes of free space
///
/// Checked before starting new work; on failure no partial work is performed.
///
/// # Errors
///
/// Returns [`Error::DiskSpaceCheckFailed`] if the platform query fails and
/// [`Error::InsufficientSpace`] if the free space is below the requirement.
pub fn ensure_free_space(path: &Path, required: u64) -> Result<()> {
    let available =
        get_available_space(path).map_err(|e| Error::DiskSpaceCheckFailed(e.to_string()))?;
    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn available_space_on_valid_path_is_positive_and_sane() {
        let temp_dir = TempDir::new().unwrap();
        let available = get_available_space(temp_dir.path()).unwrap();

        assert!(available > 0, "available space should be greater than 0");
        assert!(
            available < 1_000_000_000_000_000,
            "available space seems unreasonably large"
        );
    }

    #[test]
    fn available_space_on_nonexistent_path_errors() {
        let result = get_available_space(Path::new("/nonexistent/path/that/should/not/exist"));
        assert!(result.is_err(), "should return error for nonexistent path");
    }

    #[test]
    fn ensure_free_space_passes_for_tiny_requirement() {
        let temp_dir = TempDir::new().unwrap();
        ensure_free_space(temp_dir.path(), 1).unwrap();
    }

    #[test]
    fn ensure_free_space_fails_for_absurd_requirement() {
        let temp_dir = TempDir::new().unwrap();
        let err = ensure_free_space(temp_dir.path(), u64::MAX).unwrap_err();
        assert!(
            matches!(err, Error::InsufficientSpace { required, .. } if required == u64::MAX),
            "expected InsufficientSpace, got {err:?}"
        );
    }

    #[test]
    fn ensure_free_space_on_bad_path_reports_check_failure() {
        let err =
            ensure_free_space(Path::new("/nonexistent/path/that/should/not/exist"), 1).unwrap_err();
        assert!(matches!(err, Error::DiskSpaceCheckFailed(_)));
    }
}
