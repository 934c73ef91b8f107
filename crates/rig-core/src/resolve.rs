//! Mesh file reference resolution
//!
//! URDF mesh references come in three shapes:
//! - `package://<name>/<path>`: located through ROS package locators, falling
//!   back to a directory named after the package next to the URDF file
//! - `file:///<absolute path>` or `file://<path relative to the URDF>`
//! - plain paths, relative to the URDF file
//!
//! Any other URI scheme is rejected.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Errors raised while resolving a mesh reference
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("File path scheme '{scheme}' is not supported: {uri}")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("Can not resolve ROS package {package}")]
    PackageNotFound { package: String },

    #[error("File {} does not exist", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Malformed package URI: {0}")]
    InvalidUri(String),
}

/// A single locator miss. These are expected and only logged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LocateError {
    #[error("{variable} is not set")]
    NotConfigured { variable: &'static str },

    #[error("package {0} not found")]
    NotFound(String),
}

/// One package-name resolution protocol
pub trait PackageLocator {
    /// Name used in diagnostics
    fn name(&self) -> &'static str;

    /// Installation directory of `package`
    fn locate(&self, package: &str) -> Result<PathBuf, LocateError>;
}

/// Maximum directory depth searched below each `ROS_PACKAGE_PATH` root
const MAX_CRAWL_DEPTH: usize = 8;

/// First protocol: ROS 1 style crawl of `ROS_PACKAGE_PATH`
#[derive(Debug, Clone, Default)]
pub struct RosPackLocator {
    roots: Vec<PathBuf>,
}

impl RosPackLocator {
    pub const ENV_VAR: &'static str = "ROS_PACKAGE_PATH";

    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    pub fn from_env() -> Self {
        Self::new(paths_from_env(Self::ENV_VAR))
    }

    fn crawl(dir: &Path, package: &str, depth: usize) -> Option<PathBuf> {
        if dir.join("CATKIN_IGNORE").exists() || dir.join("COLCON_IGNORE").exists() {
            return None;
        }

        let manifest = dir.join("package.xml");
        if manifest.is_file() {
            let dir_name = dir.file_name().and_then(|n| n.to_str());
            let matches = package_xml_name(&manifest).as_deref() == Some(package)
                || dir_name == Some(package);
            // Packages never nest
            return matches.then(|| dir.to_path_buf());
        }

        if depth == 0 {
            return None;
        }

        let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter(|path| {
                !path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .collect();
        subdirs.sort();

        subdirs
            .iter()
            .find_map(|sub| Self::crawl(sub, package, depth - 1))
    }
}

impl PackageLocator for RosPackLocator {
    fn name(&self) -> &'static str {
        "rospack"
    }

    fn locate(&self, package: &str) -> Result<PathBuf, LocateError> {
        if self.roots.is_empty() {
            return Err(LocateError::NotConfigured {
                variable: Self::ENV_VAR,
            });
        }

        self.roots
            .iter()
            .filter(|root| root.is_dir())
            .find_map(|root| Self::crawl(root, package, MAX_CRAWL_DEPTH))
            .ok_or_else(|| LocateError::NotFound(package.to_string()))
    }
}

/// Second protocol: ROS 2 ament resource index under `AMENT_PREFIX_PATH`
#[derive(Debug, Clone, Default)]
pub struct AmentIndexLocator {
    prefixes: Vec<PathBuf>,
}

impl AmentIndexLocator {
    pub const ENV_VAR: &'static str = "AMENT_PREFIX_PATH";

    pub fn new(prefixes: Vec<PathBuf>) -> Self {
        Self { prefixes }
    }

    pub fn from_env() -> Self {
        Self::new(paths_from_env(Self::ENV_VAR))
    }
}

impl PackageLocator for AmentIndexLocator {
    fn name(&self) -> &'static str {
        "ament_index"
    }

    fn locate(&self, package: &str) -> Result<PathBuf, LocateError> {
        if self.prefixes.is_empty() {
            return Err(LocateError::NotConfigured {
                variable: Self::ENV_VAR,
            });
        }

        for prefix in &self.prefixes {
            let marker = prefix
                .join("share")
                .join("ament_index")
                .join("resource_index")
                .join("packages")
                .join(package);
            let share = prefix.join("share").join(package);
            if marker.exists() && share.is_dir() {
                return Ok(share);
            }
        }

        Err(LocateError::NotFound(package.to_string()))
    }
}

fn paths_from_env(variable: &str) -> Vec<PathBuf> {
    std::env::var_os(variable)
        .map(|value| {
            std::env::split_paths(&value)
                .filter(|p| !p.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Read the `<name>` of a `package.xml` manifest
fn package_xml_name(manifest: &Path) -> Option<String> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let content = std::fs::read_to_string(manifest).ok()?;
    let mut reader = Reader::from_str(&content);
    let mut depth = 0usize;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 && e.local_name().as_ref() == b"name" {
                    let name = reader.read_text(e.name()).ok()?;
                    return Some(name.trim().to_string());
                }
            }
            Event::End(_) => depth = depth.saturating_sub(1),
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Resolves mesh references against package locators and the URDF location
pub struct PackageResolver {
    locators: Vec<Box<dyn PackageLocator>>,
    base_dir: PathBuf,
    cache: HashMap<String, PathBuf>,
}

impl PackageResolver {
    /// Resolver without package locators; only the directory fallback applies
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            locators: Vec::new(),
            base_dir: base_dir.into(),
            cache: HashMap::new(),
        }
    }

    /// Resolver using the ROS 1 then ROS 2 locators configured in the environment
    pub fn from_env(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir)
            .with_locator(Box::new(RosPackLocator::from_env()))
            .with_locator(Box::new(AmentIndexLocator::from_env()))
    }

    /// Append a locator; locators are tried in insertion order
    pub fn with_locator(mut self, locator: Box<dyn PackageLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Installation directory of a package
    pub fn resolve_package(&mut self, package: &str) -> Result<PathBuf, ResolveError> {
        if let Some(path) = self.cache.get(package) {
            return Ok(path.clone());
        }

        let path = self.locate_uncached(package)?;
        self.cache.insert(package.to_string(), path.clone());
        Ok(path)
    }

    fn locate_uncached(&self, package: &str) -> Result<PathBuf, ResolveError> {
        for locator in &self.locators {
            match locator.locate(package) {
                Ok(path) if path.is_dir() => {
                    tracing::debug!("{} resolved package {} to {:?}", locator.name(), package, path);
                    return Ok(path);
                }
                Ok(path) => {
                    tracing::debug!("{} returned missing directory {:?}", locator.name(), path);
                }
                Err(e) => {
                    tracing::debug!("{} could not resolve {}: {}", locator.name(), package, e);
                }
            }
        }

        tracing::info!(
            "ROS package {} not found by any locator, trying the package name as a directory",
            package
        );

        let candidates = [self.base_dir.join(package), PathBuf::from(package)];
        candidates
            .into_iter()
            .find(|candidate| candidate.is_dir())
            .ok_or_else(|| ResolveError::PackageNotFound {
                package: package.to_string(),
            })
    }

    /// Resolve a URDF mesh `filename` to an existing file
    pub fn resolve_uri(&mut self, filename: &str) -> Result<PathBuf, ResolveError> {
        let path = if let Some(rest) = filename.strip_prefix("package://") {
            let (package, relative) = rest.split_once('/').unwrap_or((rest, ""));
            if package.is_empty() || relative.is_empty() {
                return Err(ResolveError::InvalidUri(filename.to_string()));
            }
            self.resolve_package(package)?.join(relative)
        } else if let Some(rest) = filename.strip_prefix("file://") {
            self.relative_to_base(rest)
        } else if let Some((scheme, _)) = filename.split_once("://") {
            return Err(ResolveError::UnsupportedScheme {
                scheme: scheme.to_string(),
                uri: filename.to_string(),
            });
        } else {
            self.relative_to_base(filename)
        };

        if !path.exists() {
            return Err(ResolveError::FileNotFound { path });
        }

        Ok(path)
    }

    fn relative_to_base(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl std::fmt::Debug for PackageResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageResolver")
            .field(
                "locators",
                &self.locators.iter().map(|l| l.name()).collect::<Vec<_>>(),
            )
            .field("base_dir", &self.base_dir)
            .finish()
    }
}
