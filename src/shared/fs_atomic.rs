use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    fs::create_dir_all(parent)?;
    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("state"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;
    sync_parent_dir(parent)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_parent_directories() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("cache").join("users").join("cursor.json");
        atomic_write_file(&path, b"{}").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");
    }

    #[test]
    fn overwrites_existing_file_content() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.yaml");
        atomic_write_file(&path, b"a: 1").expect("first write");
        atomic_write_file(&path, b"a: 2").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "a: 2");
    }
}
