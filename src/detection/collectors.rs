//! Evidence collectors
//!
//! Each collector probes one aspect of a project (file names, directory
//! shape, dependency manifests, configuration content) and emits evidence
//! tuples. Collectors share one bounded walk of the project tree, taken on
//! the blocking pool before any collector runs.

use async_trait::async_trait;
use glob::Pattern;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::models::{DetectionEvidence, DetectionMethod};
use crate::error::Result;
use crate::products::Product;

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &["node_modules", "bin", "obj", ".git", ".vs", "target", "dist"];

/// Manifests and config files larger than this are ignored
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Bounded listing of a project tree, paths relative to the root
#[derive(Debug, Clone, Default)]
pub struct ProjectSnapshot {
    pub root: PathBuf,
    pub files: Vec<PathBuf>,
    pub directories: Vec<PathBuf>,
    /// The walk stopped at `max_files`
    pub truncated: bool,
}

impl ProjectSnapshot {
    /// Walk `root` up to `max_depth` levels, stopping after `max_files` files.
    /// Unreadable entries are skipped.
    pub fn scan(root: &Path, max_depth: usize, max_files: usize) -> Self {
        let mut snapshot = Self {
            root: root.to_path_buf(),
            ..Default::default()
        };

        let walker = WalkDir::new(root)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let relative = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };

            if entry.file_type().is_dir() {
                snapshot.directories.push(relative);
            } else if entry.file_type().is_file() {
                if snapshot.files.len() >= max_files {
                    snapshot.truncated = true;
                    break;
                }
                snapshot.files.push(relative);
            }
        }

        snapshot
    }

    /// Files whose name satisfies `predicate`
    pub fn files_named<'a>(
        &'a self,
        predicate: impl Fn(&str) -> bool + 'a,
    ) -> impl Iterator<Item = &'a PathBuf> + 'a {
        self.files
            .iter()
            .filter(move |p| file_name(p).map(|n| predicate(n)).unwrap_or(false))
    }
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| SKIPPED_DIRS.contains(&name))
            .unwrap_or(false)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Independent probe over a project snapshot
#[async_trait]
pub trait EvidenceCollector: Send + Sync {
    fn method(&self) -> DetectionMethod;

    /// Collect evidence. An error fails only this collector.
    async fn collect(&self, snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>>;
}

/// The four built-in collectors, in registration order
pub fn default_collectors() -> Vec<Box<dyn EvidenceCollector>> {
    vec![
        Box::new(FilePatternCollector::new()),
        Box::new(DirectoryCollector::new()),
        Box::new(DependencyCollector::new()),
        Box::new(ConfigFileCollector::new()),
    ]
}

struct FileRule {
    pattern: Pattern,
    product: Product,
    confidence: f64,
    description: &'static str,
}

const FILE_RULES: &[(&str, Product, f64, &str)] = &[
    ("*.episerverdata", Product::CmsPaas, 0.8, "CMS content export package"),
    ("EPiServerFramework.config", Product::CmsPaas, 0.9, "CMS framework configuration"),
    ("ecf.*.config", Product::CommerceConnect, 0.8, "Commerce framework configuration"),
    ("Insite*.csproj", Product::ConfiguredCommerce, 0.7, "Configured Commerce project file"),
    ("*.opti-type.json", Product::CmsSaas, 0.7, "SaaS CMS content type definition"),
    ("optimizely-datafile*.json", Product::Experimentation, 0.8, "Feature Experimentation datafile"),
];

/// Matches file names against glob patterns
pub struct FilePatternCollector {
    rules: Vec<FileRule>,
}

impl FilePatternCollector {
    pub fn new() -> Self {
        let rules = FILE_RULES
            .iter()
            .filter_map(|(glob, product, confidence, description)| {
                match Pattern::new(glob) {
                    Ok(pattern) => Some(FileRule {
                        pattern,
                        product: *product,
                        confidence: *confidence,
                        description: *description,
                    }),
                    Err(e) => {
                        warn!("Ignoring invalid file pattern {}: {}", glob, e);
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }
}

impl Default for FilePatternCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceCollector for FilePatternCollector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::FilePattern
    }

    async fn collect(&self, snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
        let mut evidence = Vec::new();

        for rule in &self.rules {
            let matched: Vec<&PathBuf> = snapshot
                .files_named(|name| rule.pattern.matches(name))
                .collect();
            // One observation per pattern, anchored at the first match
            if let Some(first) = matched.first() {
                evidence.push(DetectionEvidence {
                    evidence_type: self.method().evidence_type(),
                    product: rule.product,
                    path: display_path(first),
                    pattern: rule.pattern.as_str().to_string(),
                    confidence: rule.confidence,
                    description: format!("{} ({} file(s))", rule.description, matched.len()),
                });
            }
        }

        Ok(evidence)
    }
}

const DIRECTORY_MARKERS: &[(&str, Product, f64, &str)] = &[
    ("InsiteCommerce.Web", Product::ConfiguredCommerce, 0.8, "Configured Commerce web project"),
    ("FrontEnd/modules/blueprints", Product::ConfiguredCommerce, 0.9, "Spire blueprint folder"),
    (
        "modules/_protected/EPiServer.Commerce.UI",
        Product::CommerceConnect,
        0.9,
        "Commerce UI add-on module",
    ),
    ("modules/_protected/EPiServer.Cms.UI", Product::CmsPaas, 0.8, "CMS UI add-on module"),
    ("modules/_protected/Optimizely.Graph", Product::CmsSaas, 0.6, "Graph add-on module"),
];

/// Matches directory paths against known layout markers
pub struct DirectoryCollector {
    markers: &'static [(&'static str, Product, f64, &'static str)],
}

impl DirectoryCollector {
    pub fn new() -> Self {
        Self {
            markers: DIRECTORY_MARKERS,
        }
    }
}

impl Default for DirectoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceCollector for DirectoryCollector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Directory
    }

    async fn collect(&self, snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
        let mut evidence = Vec::new();

        for (marker, product, confidence, description) in self.markers {
            let marker_path = Path::new(marker);
            if let Some(dir) = snapshot.directories.iter().find(|d| d.ends_with(marker_path)) {
                evidence.push(DetectionEvidence {
                    evidence_type: self.method().evidence_type(),
                    product: *product,
                    path: display_path(dir),
                    pattern: marker.to_string(),
                    confidence: *confidence,
                    description: description.to_string(),
                });
            }
        }

        Ok(evidence)
    }
}

/// Package name prefixes, matched case-insensitively
const DEPENDENCY_RULES: &[(&str, Product, f64)] = &[
    ("insite.", Product::ConfiguredCommerce, 0.9),
    ("episerver.commerce", Product::CommerceConnect, 0.9),
    ("episerver.cms", Product::CmsPaas, 0.9),
    ("episerver.framework", Product::CmsPaas, 0.6),
    ("@optimizely/cms-sdk", Product::CmsSaas, 0.9),
    ("optimizely.graph", Product::CmsSaas, 0.8),
    ("@optimizely/optimizely-sdk", Product::Experimentation, 0.9),
    ("@optimizely/react-sdk", Product::Experimentation, 0.9),
    ("optimizely.sdk", Product::Experimentation, 0.9),
    ("@zaiusinc/", Product::DataPlatform, 0.7),
];

static PACKAGE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<PackageReference\s+Include\s*=\s*"([^"]+)""#).expect("valid regex")
});

static PACKAGES_CONFIG_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<package\s+id\s*=\s*"([^"]+)""#).expect("valid regex"));

/// Reads dependency manifests (package.json, *.csproj, packages.config)
pub struct DependencyCollector;

impl DependencyCollector {
    pub fn new() -> Self {
        Self
    }

    /// Package names declared by one manifest; `None` for unparsable content
    fn parse_manifest(name: &str, content: &str) -> Option<Vec<String>> {
        if name == "package.json" {
            let json: serde_json::Value = serde_json::from_str(content).ok()?;
            let mut packages = BTreeSet::new();
            for section in ["dependencies", "devDependencies", "peerDependencies"] {
                if let Some(deps) = json.get(section).and_then(|d| d.as_object()) {
                    packages.extend(deps.keys().cloned());
                }
            }
            Some(packages.into_iter().collect())
        } else if name.ends_with(".csproj") {
            Some(
                PACKAGE_REFERENCE
                    .captures_iter(content)
                    .map(|c| c[1].to_string())
                    .collect(),
            )
        } else {
            Some(
                PACKAGES_CONFIG_ENTRY
                    .captures_iter(content)
                    .map(|c| c[1].to_string())
                    .collect(),
            )
        }
    }

    fn classify(package: &str) -> Option<(Product, f64, &'static str)> {
        let lower = package.to_ascii_lowercase();
        DEPENDENCY_RULES
            .iter()
            .find(|(prefix, _, _)| lower.starts_with(prefix))
            .map(|(prefix, product, confidence)| (*product, *confidence, *prefix))
    }
}

impl Default for DependencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a file no larger than `MAX_MANIFEST_BYTES`. Unreadable files are
/// logged and skipped so the remaining files still contribute evidence.
async fn read_bounded(path: &Path) -> Option<Vec<u8>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Cannot stat {}: {}, skipping", path.display(), e);
            return None;
        }
    };
    if metadata.len() > MAX_MANIFEST_BYTES {
        debug!("Skipping oversized file {}", path.display());
        return None;
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Cannot read {}: {}, skipping", path.display(), e);
            None
        }
    }
}

/// UTF-8 (optionally with BOM), or UTF-16 when a byte-order mark says so
fn decode_text(bytes: &[u8]) -> Option<String> {
    let utf16 = |units: Vec<u16>| String::from_utf16(&units).ok();
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec()).ok(),
        [0xFF, 0xFE, rest @ ..] if rest.len() % 2 == 0 => utf16(
            rest.chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect(),
        ),
        [0xFE, 0xFF, rest @ ..] if rest.len() % 2 == 0 => utf16(
            rest.chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect(),
        ),
        _ => String::from_utf8(bytes.to_vec()).ok(),
    }
}

fn is_manifest(name: &str) -> bool {
    name == "package.json" || name == "packages.config" || name.ends_with(".csproj")
}

#[async_trait]
impl EvidenceCollector for DependencyCollector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Dependency
    }

    async fn collect(&self, snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
        let mut evidence = Vec::new();

        for relative in snapshot.files_named(is_manifest) {
            let path = snapshot.root.join(relative);
            let Some(bytes) = read_bounded(&path).await else {
                continue;
            };
            let Some(content) = decode_text(&bytes) else {
                warn!("Manifest {} is not UTF-8 or UTF-16 text, skipping", path.display());
                continue;
            };
            let name = file_name(relative).unwrap_or_default();

            let Some(packages) = Self::parse_manifest(name, &content) else {
                warn!("Unparsable manifest {}, skipping", path.display());
                continue;
            };

            for package in packages {
                if let Some((product, confidence, prefix)) = Self::classify(&package) {
                    evidence.push(DetectionEvidence {
                        evidence_type: self.method().evidence_type(),
                        product,
                        path: display_path(relative),
                        pattern: prefix.to_string(),
                        confidence,
                        description: format!("Depends on {}", package),
                    });
                }
            }
        }

        Ok(evidence)
    }
}

/// Substring markers in configuration content, matched case-insensitively
const CONFIG_MARKERS: &[(&str, Product, f64)] = &[
    ("insitecommerce", Product::ConfiguredCommerce, 0.7),
    ("episerver.commerce", Product::CommerceConnect, 0.7),
    ("\"episerver\"", Product::CmsPaas, 0.6),
    ("episerver.cms", Product::CmsPaas, 0.6),
    ("optimizely_graph", Product::CmsSaas, 0.7),
    ("\"optimizely\": {", Product::CmsSaas, 0.3),
    ("optimizely_sdk_key", Product::Experimentation, 0.7),
    ("sdkkey", Product::Experimentation, 0.5),
    ("optimizely_odp", Product::DataPlatform, 0.6),
];

fn is_config_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    (lower.starts_with("appsettings") && lower.ends_with(".json"))
        || lower == "web.config"
        || lower == ".env"
        || lower.starts_with(".env.")
}

/// Scans configuration files for product-specific sections and keys
pub struct ConfigFileCollector;

impl ConfigFileCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConfigFileCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceCollector for ConfigFileCollector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::ConfigFile
    }

    async fn collect(&self, snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
        let mut evidence = Vec::new();

        for relative in snapshot.files_named(is_config_file) {
            let path = snapshot.root.join(relative);
            let Some(bytes) = read_bounded(&path).await else {
                continue;
            };
            let content = decode_text(&bytes)
                .unwrap_or_else(|| String::from_utf8_lossy(&bytes).into_owned())
                .to_lowercase();

            for (marker, product, confidence) in CONFIG_MARKERS {
                if content.contains(marker) {
                    evidence.push(DetectionEvidence {
                        evidence_type: self.method().evidence_type(),
                        product: *product,
                        path: display_path(relative),
                        pattern: marker.to_string(),
                        confidence: *confidence,
                        description: format!("Configuration mentions {}", marker.trim_matches('"')),
                    });
                }
            }
        }

        Ok(evidence)
    }
}
