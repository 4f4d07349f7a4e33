use camino::Utf8Path;
use filetime::FileTime;
use std::fs;
use std::io;

/// Copy `from` to `to`, creating parent directories, and carry the
/// access/modification times over so archived files keep their dates.
pub fn copy_preserving_times(from: &Utf8Path, to: &Utf8Path) -> io::Result<u64> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    let bytes = fs::copy(from, to)?;
    let meta = fs::metadata(from)?;
    filetime::set_file_times(
        to,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )?;
    Ok(bytes)
}

