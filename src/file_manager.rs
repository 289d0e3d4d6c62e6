use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::category::AssetCategory;

const DEFAULT_STEM: &str = "file";
const DEFAULT_EXTENSION: &str = ".bin";

/// Owns the output tree of one run: the `css/`, `js/` and `asset/<category>/`
/// folders plus the set of file names handed out so far.
#[derive(Clone)]
pub struct FileManager {
    base_dir: PathBuf,
    reserved: Arc<Mutex<HashSet<PathBuf>>>,
}

impl FileManager {
    pub fn new(base_dir: &Path) -> Result<Self> {
        let base_dir = base_dir.to_path_buf();
        for dir in [
            base_dir.clone(),
            base_dir.join("css"),
            base_dir.join("js"),
            base_dir.join("asset"),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }

        Ok(Self {
            base_dir,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join("index.html")
    }

    pub fn css_dir(&self) -> PathBuf {
        self.base_dir.join("css")
    }

    pub fn js_dir(&self) -> PathBuf {
        self.base_dir.join("js")
    }

    /// Returns the folder for `category`, creating it on first use.
    pub fn ensure_category_dir(&self, category: AssetCategory) -> Result<PathBuf> {
        let dir = self.base_dir.join(category.relative_dir());
        if !dir.is_dir() {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {:?}", dir))?;
        }
        Ok(dir)
    }

    /// Picks a free file name for `url` inside `dir` and reserves it for the
    /// rest of the run. Lookup and reservation happen under one lock, so two
    /// callers never receive the same path.
    pub fn reserve_unique_path(&self, dir: &Path, url: &Url) -> PathBuf {
        let file_name = file_name_for_url(url);
        let mut reserved = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = unique_path(dir, &file_name, |candidate| reserved.contains(candidate));
        reserved.insert(path.clone());
        path
    }

    /// Writes a fetched resource into its category folder under a fresh name.
    pub fn save_asset(&self, category: AssetCategory, url: &Url, content: &[u8]) -> Result<PathBuf> {
        let dir = self.ensure_category_dir(category)?;
        let file_path = self.reserve_unique_path(&dir, url);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .with_context(|| format!("Failed to create file: {:?}", file_path))?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to file: {:?}", file_path))?;

        Ok(file_path)
    }

    /// Writes `content` at a fixed path below the output root, replacing any
    /// previous file.
    pub fn save_file(&self, relative_path: &Path, content: &[u8]) -> Result<PathBuf> {
        let file_path = self.base_dir.join(relative_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        fs::write(&file_path, content)
            .with_context(|| format!("Failed to write to file: {:?}", file_path))?;

        Ok(file_path)
    }

    /// `./`-prefixed, slash-separated path of `file_path` relative to the output root.
    pub fn get_relative_path(&self, file_path: &Path) -> Result<String> {
        let relative = file_path
            .strip_prefix(&self.base_dir)
            .with_context(|| format!("Failed to get relative path from {:?}", file_path))?;

        Ok(format!("./{}", to_url_path(relative)))
    }
}

/// Local file name for a remote URL: the sanitized last path segment, `file`
/// when that is empty, with `.bin` appended when it carries no extension.
pub fn file_name_for_url(url: &Url) -> String {
    let last_segment = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("");
    let decoded = percent_decode_str(last_segment).decode_utf8_lossy();

    let mut name = sanitize_file_name(&decoded);
    if name.is_empty() {
        name = DEFAULT_STEM.to_string();
    }
    if !name.contains('.') {
        name.push_str(DEFAULT_EXTENSION);
    }
    name
}

/// First of `name.ext`, `name-1.ext`, `name-2.ext`, ... that neither exists in
/// `dir` nor is rejected by `is_taken`.
pub fn unique_path<F>(dir: &Path, file_name: &str, is_taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let mut counter = 0usize;
    loop {
        let candidate = dir.join(numbered_name(file_name, counter));
        if !candidate.exists() && !is_taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn numbered_name(file_name: &str, counter: usize) -> String {
    if counter == 0 {
        return file_name.to_string();
    }

    match file_name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}-{}{}", &file_name[..dot], counter, &file_name[dot..]),
        _ => format!("{}-{}", file_name, counter),
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// Joins the normal components of `path` with `/`, whatever the host separator.
pub fn to_url_path(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_file_name_defaults() {
        assert_eq!(file_name_for_url(&url("https://cdn.example.com/lib/app.min.js")), "app.min.js");
        assert_eq!(file_name_for_url(&url("https://example.com/")), "file.bin");
        assert_eq!(file_name_for_url(&url("https://example.com/download")), "download.bin");
        assert_eq!(file_name_for_url(&url("https://example.com/my%20font.woff?v=2")), "my_font.woff");
    }

    #[test]
    fn test_numbered_name_goes_before_extension() {
        assert_eq!(numbered_name("logo.png", 0), "logo.png");
        assert_eq!(numbered_name("logo.png", 2), "logo-2.png");
        assert_eq!(numbered_name("jquery.min.js", 1), "jquery.min-1.js");
        assert_eq!(numbered_name(".htaccess", 1), ".htaccess-1");
    }

    #[test]
    fn test_unique_path_skips_existing_files() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("logo.png"), b"a").unwrap();
        fs::write(temp_dir.path().join("logo-1.png"), b"b").unwrap();

        let path = unique_path(temp_dir.path(), "logo.png", |_| false);
        assert_eq!(path, temp_dir.path().join("logo-2.png"));
    }

    #[test]
    fn test_reservations_produce_gapless_sequence() {
        let temp_dir = tempdir().unwrap();
        let file_manager = FileManager::new(temp_dir.path()).unwrap();
        let dir = file_manager.ensure_category_dir(AssetCategory::Img).unwrap();

        let names: Vec<String> = (0..4)
            .map(|i| {
                let path = file_manager
                    .reserve_unique_path(&dir, &url(&format!("https://host{}.example.com/a/logo.png", i)));
                path.file_name().unwrap().to_string_lossy().into_owned()
            })
            .collect();

        assert_eq!(names, vec!["logo.png", "logo-1.png", "logo-2.png", "logo-3.png"]);
    }

    #[test]
    fn test_save_asset_and_relative_path() {
        let temp_dir = tempdir().unwrap();
        let file_manager = FileManager::new(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join("css").is_dir());
        assert!(temp_dir.path().join("js").is_dir());
        assert!(!temp_dir.path().join("asset/font").exists());

        let font_url = url("https://fonts.example.com/inter.woff2");
        let first = file_manager.save_asset(AssetCategory::Font, &font_url, b"one").unwrap();
        let second = file_manager.save_asset(AssetCategory::Font, &font_url, b"two").unwrap();

        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");
        assert_eq!(file_manager.get_relative_path(&first).unwrap(), "./asset/font/inter.woff2");
        assert_eq!(file_manager.get_relative_path(&second).unwrap(), "./asset/font/inter-1.woff2");
    }
}
