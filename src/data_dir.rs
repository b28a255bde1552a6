use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, warn};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV: &str = "SIEVE_DATA_DIR";

const CURRENT: &str = "CURRENT";
const GENERATIONS: &str = "generations";
/// Written last by a build; directories without it are still being written.
const COMPLETE: &str = "COMPLETE";
/// Shared-locked by every process serving the generation.
const LEASE: &str = "LEASE";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

/// One complete build of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    name: String,
    root: PathBuf,
}

impl Generation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog(&self) -> PathBuf {
        self.root.join("catalog.redb")
    }

    pub fn embeddings_db(&self) -> PathBuf {
        self.root.join("embeddings.redb")
    }

    pub fn patterns_dir(&self) -> PathBuf {
        self.root.join("patterns")
    }

    /// Record that every file of the build has been written.
    pub fn mark_complete(&self) -> Result<()> {
        std::fs::write(self.root.join(COMPLETE), "")?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.root.join(COMPLETE).is_file()
    }

    /// Hold the generation open against pruning until the lease is dropped.
    pub fn lease(&self) -> Result<GenerationLease> {
        let file = open_lease_file(&self.root)?;
        fs2::FileExt::lock_shared(&file)?;
        Ok(GenerationLease { _file: file })
    }
}

/// A shared lock on a generation's lease file, released on drop.
#[derive(Debug)]
pub struct GenerationLease {
    _file: File,
}

fn open_lease_file(generation: &Path) -> std::io::Result<File> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(generation.join(LEASE))
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The SIEVE_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/sieve/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("sieve")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn generation(&self, name: &str) -> Generation {
        Generation {
            name: name.to_string(),
            root: self.root.join(GENERATIONS).join(name),
        }
    }

    /// The generation `CURRENT` points at, if any build has been published.
    pub fn current(&self) -> Result<Option<Generation>> {
        let pointer = self.root.join(CURRENT);
        let name = match std::fs::read_to_string(&pointer) {
            Ok(name) => name.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let generation = self.generation(&name);
        if !generation.root.is_dir() {
            return Err(Error::NotFound {
                kind: "generation",
                name,
            });
        }
        Ok(Some(generation))
    }

    /// Create an empty directory for a build that is not yet visible.
    pub fn new_generation(&self) -> Result<Generation> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let name = format!("{stamp:032}-{:010}-{seq:020}", std::process::id());
        let generation = self.generation(&name);
        std::fs::create_dir_all(&generation.root)
            .map_err(|_| Error::DataDir(generation.root.clone()))?;
        Ok(generation)
    }

    /// Point `CURRENT` at `generation`, then remove older generations.
    ///
    /// The pointer is replaced with a rename, so readers see either the old
    /// or the new generation. The replaced generation survives until the
    /// next publish so processes still serving it keep working.
    pub fn publish(&self, generation: &Generation) -> Result<()> {
        let previous = self.current().ok().flatten();

        let tmp = self.root.join(format!("{CURRENT}.tmp"));
        std::fs::write(&tmp, format!("{}\n", generation.name))?;
        std::fs::rename(&tmp, self.root.join(CURRENT))?;
        debug!(generation = %generation.name, "published generation");

        // Names sort by creation time; only builds older than both kept
        // generations are candidates.
        let oldest_kept = previous.as_ref().unwrap_or(generation);
        let cutoff = oldest_kept.name.as_str().min(generation.name.as_str());
        self.prune(cutoff);
        Ok(())
    }

    /// Remove complete generations named before `cutoff` that no process
    /// holds a lease on. Failures are logged, not returned: a leftover
    /// directory is never read.
    fn prune(&self, cutoff: &str) {
        let Ok(entries) = std::fs::read_dir(self.root.join(GENERATIONS)) else {
            return;
        };
        for entry in entries.flatten() {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let generation = self.generation(&name);
            if name.as_str() >= cutoff
                || !generation.root.is_dir()
                || !generation.is_complete()
            {
                continue;
            }

            let lease = match open_lease_file(&generation.root) {
                Ok(file) => file,
                Err(e) => {
                    warn!(generation = %name, error = %e, "failed to open generation lease");
                    continue;
                }
            };
            if fs2::FileExt::try_lock_exclusive(&lease).is_err() {
                debug!(generation = %name, "generation still in use, keeping it");
                continue;
            }

            if let Err(e) = std::fs::remove_dir_all(&generation.root) {
                warn!(path = %generation.root.display(), error = %e, "failed to remove old generation");
            }
        }
    }
}
