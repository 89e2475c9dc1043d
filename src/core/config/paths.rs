use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem layout used by the server.
///
/// `project_root` is where the bundled `config.yml` lives. Durable state
/// (logs, uploaded files awaiting ingestion, secrets) lives under
/// `user_data_dir`, which in debug builds is the project root itself.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub uploads_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        let paths = AppPaths {
            log_dir: user_data_dir.join("logs"),
            uploads_dir: user_data_dir.join("uploads"),
            secrets_path: user_data_dir.join("secrets.yaml"),
            project_root,
            user_data_dir,
        };
        paths.ensure_directories();
        paths
    }

    fn ensure_directories(&self) {
        for dir in [&self.user_data_dir, &self.log_dir, &self.uploads_dir] {
            let _ = fs::create_dir_all(dir);
        }
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("TABULA_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        manifest_dir
    } else {
        env::current_dir().unwrap_or(manifest_dir)
    }
}

fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("TABULA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    // Debug builds keep everything next to the sources.
    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    platform_data_dir()
}

fn platform_data_dir() -> PathBuf {
    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .or_else(|_| env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(base).join("Tabula")
    } else if cfg!(target_os = "macos") {
        home_dir().join("Library/Application Support/Tabula")
    } else {
        match env::var("XDG_DATA_HOME") {
            Ok(base) => PathBuf::from(base).join("tabula"),
            Err(_) => home_dir().join(".local/share/tabula"),
        }
    }
}

fn home_dir() -> PathBuf {
    for key in ["HOME", "USERPROFILE"] {
        if let Ok(home) = env::var(key) {
            return PathBuf::from(home);
        }
    }
    PathBuf::from(".")
}
