//! Linux CEC backend.
//!
//! Adapters are the character devices the kernel CEC framework exposes as
//! `/dev/cec0`, `/dev/cec1`, ... Discovery checks the first `MAX_ADAPTERS`
//! device nodes in order and the first one present wins; there is no other
//! selection heuristic.

mod adapter;
mod ioctl;
mod keys;

use std::path::{Path, PathBuf};

use adapter::LinuxCecAdapter;

use crate::cec::{CecAdapter, CecError, SessionConfig};

/// Directory holding the CEC device nodes.
const DEV_DIR: &str = "/dev";

/// Highest number of adapters considered during discovery.
const MAX_ADAPTERS: usize = 10;

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Opens the first CEC adapter under /dev and registers `config` on it.
pub fn discover_and_open(config: &SessionConfig) -> Result<Box<dyn CecAdapter + Send>, CecError> {
    let adapters = enumerate_adapters(Path::new(DEV_DIR));
    let Some(first) = adapters.first() else {
        return Err(CecError::NoAdapter);
    };

    log::info!("cec: found {} adapter(s)", adapters.len());
    for path in &adapters {
        log::debug!("cec: candidate {}", path.display());
    }

    LinuxCecAdapter::open(first, config).map(|a| Box::new(a) as Box<dyn CecAdapter + Send>)
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Lists `cecN` device nodes under `dev_dir` for N in `0..MAX_ADAPTERS`, in
/// ascending order.
fn enumerate_adapters(dev_dir: &Path) -> Vec<PathBuf> {
    (0..MAX_ADAPTERS)
        .map(|n| dev_dir.join(format!("cec{n}")))
        .filter(|path| path.exists())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_has_no_adapters() {
        let dir = tempfile::tempdir().unwrap();
        assert!(enumerate_adapters(dir.path()).is_empty());
    }

    #[test]
    fn adapters_are_listed_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cec3", "cec0", "video0"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = enumerate_adapters(dir.path());
        assert_eq!(found, vec![dir.path().join("cec0"), dir.path().join("cec3")]);
    }

    #[test]
    fn adapters_past_the_limit_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cec10"), b"").unwrap();
        assert!(enumerate_adapters(dir.path()).is_empty());
    }
}
