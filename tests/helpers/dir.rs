use std::path::Path;

use tempfile::TempDir;

/// Temporary policy directory with automatic cleanup
pub struct TestPolicyDir {
    dir: TempDir,
}

impl TestPolicyDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.dir.path().join(name), contents).expect("Failed to write policy file");
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.dir.path().join(name)).expect("Failed to remove policy file");
    }
}

impl Default for TestPolicyDir {
    fn default() -> Self {
        Self::new()
    }
}
