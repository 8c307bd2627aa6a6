//! Classpath walking: directories, jar archives and JDK jmod files.
//!
//! Produces a [`ClasspathScan`]: every class visible on the classpath as a
//! [`ClasspathSymbol`], classified from its classfile header. Scans are the
//! heavyweight artefact the shared scan cache deduplicates and persists.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::Url;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::classpath::classfile::{parse_summary, ClassKind};
use crate::classpath::symbol::{ClasspathSymbol, SymbolKind};

/// Result of scanning one classpath. Serialised verbatim into the disk
/// cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClasspathScan {
    pub symbols: Vec<ClasspathSymbol>,
    pub package_names: BTreeSet<String>,
    pub class_count: usize,
    /// Canonical paths of the elements that were actually scanned.
    pub element_paths: Vec<String>,
}

/// Turn a classpath URL string into a filesystem path. Accepts `file:` URLs
/// and plain paths.
pub fn url_to_path(url: &str) -> Option<PathBuf> {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.scheme() == "file" {
            return parsed.to_file_path().ok();
        }
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

/// Canonical filesystem paths for a set of classpath URLs. Entries that do
/// not exist keep their textual path so post-filters stay stable.
pub fn canonical_paths(urls: &[String]) -> std::collections::HashSet<String> {
    urls.iter()
        .filter_map(|url| url_to_path(url))
        .map(|path| canonicalize_lossy(&path))
        .collect()
}

fn canonicalize_lossy(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn is_rejected(package: &str, reject_packages: &[String]) -> bool {
    reject_packages.iter().any(|prefix| {
        package == prefix || package.starts_with(&format!("{prefix}."))
    })
}

/// Entry names that never become symbols: metadata pseudo-classes and
/// nested/anonymous classes.
fn is_indexable_entry(class_name: &str) -> bool {
    let simple = class_name.rsplit('.').next().unwrap_or(class_name);
    !simple.contains('$') && simple != "module-info" && simple != "package-info"
}

/// Scan every element of a classpath, applying the reject-package filter
/// during the walk. Unreadable elements are logged and skipped; a scan
/// always succeeds.
pub fn scan_classpath(urls: &[String], reject_packages: &[String]) -> ClasspathScan {
    let mut scan = ClasspathScan::default();
    for url in urls {
        let Some(path) = url_to_path(url) else {
            debug!("skipping non-file classpath URL {url}");
            continue;
        };
        if !path.exists() {
            debug!("skipping missing classpath element {}", path.display());
            continue;
        }
        let canonical = canonicalize_lossy(&path);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let result = match extension.as_deref() {
            Some("jar") => scan_archive(&path, Some(&canonical), "", reject_packages, &mut scan),
            // Classes out of the JDK image carry no element path.
            Some("jmod") => scan_archive(&path, None, "classes/", reject_packages, &mut scan),
            _ if path.is_dir() => {
                scan_directory(&path, &canonical, reject_packages, &mut scan);
                Ok(())
            }
            _ => {
                debug!("skipping unrecognised classpath element {}", path.display());
                continue;
            }
        };
        if let Err(e) = result {
            warn!("failed to scan classpath element {}: {e}", path.display());
            continue;
        }
        scan.element_paths.push(canonical);
    }
    scan.class_count = scan.symbols.len();
    scan
}

fn scan_directory(
    dir: &Path,
    canonical: &str,
    reject_packages: &[String],
    scan: &mut ClasspathScan,
) {
    for entry in WalkDir::new(dir).follow_links(false).into_iter().flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("class") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let class_name = relative
            .with_extension("")
            .to_string_lossy()
            .replace(['/', '\\'], ".");
        let mut bytes = Vec::new();
        let readable = File::open(path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .is_ok();
        if !readable {
            continue;
        }
        record_class(&class_name, &bytes, Some(canonical), reject_packages, scan);
    }
}

fn scan_archive(
    path: &Path,
    element_path: Option<&str>,
    strip_prefix: &str,
    reject_packages: &[String],
    scan: &mut ClasspathScan,
) -> anyhow::Result<()> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let Some(stripped) = name.strip_prefix(strip_prefix) else {
            continue;
        };
        let Some(class_path) = stripped.strip_suffix(".class") else {
            continue;
        };
        let class_name = class_path.replace('/', ".");
        let mut bytes = Vec::new();
        if entry.read_to_end(&mut bytes).is_err() {
            continue;
        }
        record_class(&class_name, &bytes, element_path, reject_packages, scan);
    }
    Ok(())
}

fn record_class(
    class_name: &str,
    bytes: &[u8],
    element_path: Option<&str>,
    reject_packages: &[String],
    scan: &mut ClasspathScan,
) {
    if !is_indexable_entry(class_name) {
        return;
    }
    let package = class_name.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
    if is_rejected(package, reject_packages) {
        return;
    }
    let kind = match parse_summary(bytes) {
        Ok(summary) => summary.kind,
        Err(e) => {
            debug!("unparseable classfile for {class_name}: {e}");
            ClassKind::Class
        }
    };
    scan.package_names.insert(package.to_string());
    scan.symbols.push(ClasspathSymbol::new(
        class_name,
        SymbolKind::from(kind),
        element_path.map(str::to_string),
    ));
}
