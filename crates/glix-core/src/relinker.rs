//! ELF retargeting: point a binary at a registered libc.
//!
//! Two edits are made with `patchelf`:
//! 1. Interpreter: `--set-interpreter <registered ld-linux>`
//! 2. Runtime search path: `--set-rpath <directory of libc.so.6>`
//!
//! # Implementation Note: Interpreter and RPATH
//!
//! The kernel starts a dynamically linked ELF by loading the program named in
//! its `PT_INTERP` header, the dynamic loader. That loader then resolves
//! `DT_NEEDED` libraries, searching `DT_RUNPATH`/`DT_RPATH` before the system
//! directories. A libc only works with the loader from the same build, so both
//! the interpreter and the search path must move together: swapping just one
//! tends to crash at startup with symbol version errors.
//!
//! Edits are applied in that order and never rolled back here. A binary whose
//! interpreter was set but whose rpath edit failed keeps the new interpreter;
//! callers that need atomicity take a backup first.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use glix_schema::{Arch, VersionId};
use thiserror::Error;

use crate::store::{RegistryError, VersionRegistry};
use crate::tool::{self, ToolError};

#[derive(Error, Debug)]
pub enum RelinkError {
    #[error("Unrecognized architecture for {path}: {description}")]
    UnknownArchitecture { path: String, description: String },

    #[error("Version {0} is not installed")]
    NotInstalled(VersionId),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Reads the CPU architecture of an ELF file.
pub trait ArchitectureDetector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`RelinkError::UnknownArchitecture`] for anything that is not a
    /// supported ELF, or the tool failure.
    fn detect(&self, path: &Path) -> Result<Arch, RelinkError>;

    /// # Errors
    ///
    /// Returns [`ToolError::Missing`] when the backing utility is absent.
    fn check(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Applies header edits to an ELF file.
pub trait BinaryMutator: Send + Sync {
    /// # Errors
    ///
    /// Returns the tool failure.
    fn set_interpreter(&self, path: &Path, interpreter: &Path) -> Result<(), ToolError>;

    /// # Errors
    ///
    /// Returns the tool failure.
    fn set_rpath(&self, path: &Path, dir: &Path) -> Result<(), ToolError>;

    /// # Errors
    ///
    /// Returns [`ToolError::Missing`] when the backing utility is absent.
    fn check(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// `file -L -b <path>`
#[derive(Debug, Clone)]
pub struct FileCommand {
    timeout: Duration,
}

impl FileCommand {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ArchitectureDetector for FileCommand {
    fn check(&self) -> Result<(), ToolError> {
        tool::ensure_available("file")
    }

    fn detect(&self, path: &Path) -> Result<Arch, RelinkError> {
        let out = tool::run(
            "file",
            [OsStr::new("-L"), OsStr::new("-b"), path.as_os_str()],
            self.timeout,
        )?;
        let description = out.stdout.trim();
        arch_from_description(description).ok_or_else(|| RelinkError::UnknownArchitecture {
            path: path.display().to_string(),
            description: description.to_string(),
        })
    }
}

/// Map `file` output to an architecture.
///
/// ```
/// use glix_core::relinker::arch_from_description;
/// use glix_schema::Arch;
///
/// let desc = "ELF 64-bit LSB pie executable, x86-64, version 1 (SYSV), dynamically linked";
/// assert_eq!(arch_from_description(desc), Some(Arch::Amd64));
/// assert_eq!(arch_from_description("ASCII text"), None);
/// ```
pub fn arch_from_description(description: &str) -> Option<Arch> {
    if !description.contains("ELF") {
        return None;
    }
    let fields: Vec<String> = description
        .split(',')
        .map(|f| f.trim().to_lowercase())
        .collect();
    let has = |needle: &str| fields.iter().any(|f| f.contains(needle));

    if has("x86-64") {
        Some(Arch::Amd64)
    } else if has("80386") {
        Some(Arch::I386)
    } else if has("aarch64") {
        Some(Arch::Aarch64)
    } else if fields.iter().any(|f| f == "arm") {
        Some(Arch::Arm)
    } else {
        None
    }
}

/// `patchelf --set-interpreter` / `--set-rpath`
#[derive(Debug, Clone)]
pub struct Patchelf {
    timeout: Duration,
}

impl Patchelf {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl BinaryMutator for Patchelf {
    fn check(&self) -> Result<(), ToolError> {
        tool::ensure_available("patchelf")
    }

    fn set_interpreter(&self, path: &Path, interpreter: &Path) -> Result<(), ToolError> {
        tool::run(
            "patchelf",
            [
                OsStr::new("--set-interpreter"),
                interpreter.as_os_str(),
                path.as_os_str(),
            ],
            self.timeout,
        )
        .map(|_| ())
    }

    fn set_rpath(&self, path: &Path, dir: &Path) -> Result<(), ToolError> {
        tool::run(
            "patchelf",
            [OsStr::new("--set-rpath"), dir.as_os_str(), path.as_os_str()],
            self.timeout,
        )
        .map(|_| ())
    }
}

/// Outcome of one retarget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub success: bool,
    pub error: Option<String>,
}

impl PatchResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Retargets binaries at versions from a registry.
pub struct Retargeter<'r> {
    registry: &'r VersionRegistry,
    mutator: Box<dyn BinaryMutator>,
    detector: Box<dyn ArchitectureDetector>,
}

impl std::fmt::Debug for Retargeter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retargeter")
            .field("registry", self.registry)
            .finish_non_exhaustive()
    }
}

impl<'r> Retargeter<'r> {
    /// Retargeter using `patchelf` and `file`.
    pub fn new(registry: &'r VersionRegistry, tool_timeout: Duration) -> Self {
        Self::with_tools(
            registry,
            Box::new(Patchelf::new(tool_timeout)),
            Box::new(FileCommand::new(tool_timeout)),
        )
    }

    pub fn with_tools(
        registry: &'r VersionRegistry,
        mutator: Box<dyn BinaryMutator>,
        detector: Box<dyn ArchitectureDetector>,
    ) -> Self {
        Self {
            registry,
            mutator,
            detector,
        }
    }

    /// Architecture of `path`, for picking which build to install.
    ///
    /// # Errors
    ///
    /// See [`ArchitectureDetector::detect`].
    pub fn architecture(&self, path: &Path) -> Result<Arch, RelinkError> {
        self.detector.check()?;
        self.detector.detect(path)
    }

    /// Confirm both external utilities are installed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Missing`] for the first one that is absent.
    pub fn check_tools(&self) -> Result<(), ToolError> {
        self.detector.check()?;
        self.mutator.check()
    }

    /// Point `elf_path` at the loader and libc of `version`.
    ///
    /// Nothing is touched unless the version is registered and has a loader.
    pub fn retarget(&self, elf_path: &Path, version: &VersionId) -> PatchResult {
        let record = match self.registry.lookup(version) {
            Ok(Some(r)) => r,
            Ok(None) => {
                return PatchResult::failed(RelinkError::NotInstalled(version.clone()).to_string());
            }
            Err(e) => return PatchResult::failed(e.to_string()),
        };

        let Some(interpreter) = record.interpreter_path.as_deref() else {
            return PatchResult::failed(format!("No dynamic loader recorded for {version}"));
        };
        let Some(lib_dir) = record.library_dir() else {
            return PatchResult::failed(format!("Library path for {version} has no parent"));
        };

        if let Err(e) = self.mutator.check() {
            return PatchResult::failed(e.to_string());
        }
        if let Err(e) = self.mutator.set_interpreter(elf_path, interpreter) {
            tracing::warn!("set-interpreter on {} failed: {e}", elf_path.display());
            return PatchResult::failed(e.diagnostic());
        }
        if let Err(e) = self.mutator.set_rpath(elf_path, lib_dir) {
            tracing::warn!("set-rpath on {} failed: {e}", elf_path.display());
            return PatchResult::failed(e.diagnostic());
        }

        tracing::info!("retargeted {} to {version}", elf_path.display());
        PatchResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    /// Records edits; optionally fails the rpath step.
    #[derive(Default, Clone)]
    struct FakeMutator {
        interpreter: Arc<Mutex<Option<PathBuf>>>,
        rpath: Arc<Mutex<Option<PathBuf>>>,
        fail_rpath: bool,
        missing: bool,
    }

    impl BinaryMutator for FakeMutator {
        fn check(&self) -> Result<(), ToolError> {
            if self.missing {
                return Err(ToolError::Missing("patchelf".into()));
            }
            Ok(())
        }

        fn set_interpreter(&self, _path: &Path, interpreter: &Path) -> Result<(), ToolError> {
            *self.interpreter.lock().unwrap() = Some(interpreter.to_path_buf());
            Ok(())
        }

        fn set_rpath(&self, _path: &Path, dir: &Path) -> Result<(), ToolError> {
            if self.fail_rpath {
                return Err(ToolError::Failed {
                    tool: "patchelf".into(),
                    status: "1".into(),
                    stderr: "cannot find section '.dynstr'".into(),
                });
            }
            *self.rpath.lock().unwrap() = Some(dir.to_path_buf());
            Ok(())
        }
    }

    struct FixedArch(Arch);

    impl ArchitectureDetector for FixedArch {
        fn detect(&self, _path: &Path) -> Result<Arch, RelinkError> {
            Ok(self.0)
        }
    }

    fn setup() -> (TempDir, VersionRegistry, VersionId) {
        let dir = tempdir().unwrap();
        let lib = dir.path().join("libs/libc6/lib/x86_64-linux-gnu");
        std::fs::create_dir_all(&lib).unwrap();
        std::fs::write(lib.join("libc.so.6"), b"").unwrap();
        std::fs::write(lib.join("ld-linux-x86-64.so.2"), b"").unwrap();

        let registry = VersionRegistry::open_at(&dir.path().join("glix.db")).unwrap();
        let version: VersionId = "2.31-0ubuntu9".parse().unwrap();
        registry
            .add(&version, &lib.join("libc.so.6"), None, None)
            .unwrap();
        (dir, registry, version)
    }

    #[test]
    fn test_retarget_sets_interpreter_then_rpath() {
        let (dir, registry, version) = setup();
        let mutator = FakeMutator::default();
        let retargeter = Retargeter::with_tools(
            &registry,
            Box::new(mutator.clone()),
            Box::new(FixedArch(Arch::Amd64)),
        );

        let result = retargeter.retarget(&dir.path().join("chall"), &version);
        assert!(result.success, "{:?}", result.error);

        let interp = mutator.interpreter.lock().unwrap().clone().unwrap();
        assert!(interp.ends_with("ld-linux-x86-64.so.2"));
        let rpath = mutator.rpath.lock().unwrap().clone().unwrap();
        assert!(rpath.ends_with("lib/x86_64-linux-gnu"));
    }

    #[test]
    fn test_partial_failure_keeps_new_interpreter() {
        let (dir, registry, version) = setup();
        let mutator = FakeMutator {
            fail_rpath: true,
            ..FakeMutator::default()
        };
        let retargeter = Retargeter::with_tools(
            &registry,
            Box::new(mutator.clone()),
            Box::new(FixedArch(Arch::Amd64)),
        );

        let result = retargeter.retarget(&dir.path().join("chall"), &version);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("cannot find section '.dynstr'"));
        assert!(mutator.interpreter.lock().unwrap().is_some());
        assert!(mutator.rpath.lock().unwrap().is_none());
    }

    #[test]
    fn test_missing_patchelf_touches_nothing() {
        let (dir, registry, version) = setup();
        let mutator = FakeMutator {
            missing: true,
            ..FakeMutator::default()
        };
        let retargeter = Retargeter::with_tools(
            &registry,
            Box::new(mutator.clone()),
            Box::new(FixedArch(Arch::Amd64)),
        );

        assert!(matches!(retargeter.check_tools(), Err(ToolError::Missing(_))));
        let result = retargeter.retarget(&dir.path().join("chall"), &version);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("patchelf"));
        assert!(mutator.interpreter.lock().unwrap().is_none());
    }

    #[test]
    fn test_unknown_version_touches_nothing() {
        let (dir, registry, _) = setup();
        let mutator = FakeMutator::default();
        let retargeter = Retargeter::with_tools(
            &registry,
            Box::new(mutator.clone()),
            Box::new(FixedArch(Arch::I386)),
        );

        let other: VersionId = "2.35-0ubuntu3".parse().unwrap();
        let result = retargeter.retarget(&dir.path().join("chall"), &other);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not installed"));
        assert!(mutator.interpreter.lock().unwrap().is_none());

        assert_eq!(
            retargeter.architecture(&dir.path().join("chall")).unwrap(),
            Arch::I386
        );
    }

    #[test]
    fn test_arch_from_description() {
        let cases = [
            ("ELF 32-bit LSB executable, Intel 80386, version 1 (SYSV)", Some(Arch::I386)),
            ("ELF 64-bit LSB executable, ARM aarch64, version 1 (SYSV)", Some(Arch::Aarch64)),
            ("ELF 32-bit LSB executable, ARM, EABI5 version 1 (SYSV)", Some(Arch::Arm)),
            ("ELF 64-bit MSB executable, IBM S/390, version 1 (SYSV)", None),
            ("data", None),
        ];
        for (desc, expected) in cases {
            assert_eq!(arch_from_description(desc), expected, "{desc}");
        }
    }
}
