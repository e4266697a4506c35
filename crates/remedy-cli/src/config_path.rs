use remedy_core::config::CONFIG_FILE;
use std::path::{Path, PathBuf};

/// Resolve the config file.
///
/// Priority:
/// 1. `--config` flag / `REMEDY_CONFIG` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `remedy.yaml`
/// 3. Fall back to `cwd/remedy.yaml` (reported as missing on load)
pub fn resolve_config(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_upward(&cwd).unwrap_or_else(|| cwd.join(CONFIG_FILE))
}

fn find_upward(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_path_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("elsewhere.yaml");
        assert_eq!(resolve_config(Some(&path)), path);
    }

    #[test]
    fn finds_config_in_ancestor() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "x: 1\n").unwrap();
        let deep = dir.path().join("a/b/c");
        std::fs::create_dir_all(&deep).unwrap();
        assert_eq!(find_upward(&deep), Some(dir.path().join(CONFIG_FILE)));
    }

    #[test]
    fn nearest_config_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "x: 1\n").unwrap();
        let inner = dir.path().join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join(CONFIG_FILE), "x: 2\n").unwrap();
        assert_eq!(find_upward(&inner), Some(inner.join(CONFIG_FILE)));
    }
}
