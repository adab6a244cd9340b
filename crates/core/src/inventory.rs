use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::info;

use crate::error::HarvestError;
use crate::roles::RoleAssignment;

/// Static host grouping for the configuration-management tool. The section
/// names and the `provider=` / `main_ip=` keys are read by that tool and
/// must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryDocument {
    pub main_ip: String,
    /// `(ip, provider label)` in assignment order.
    pub harvesters: Vec<(String, String)>,
}

impl InventoryDocument {
    pub fn new(main_ip: impl Into<String>, roles: &RoleAssignment) -> Self {
        InventoryDocument {
            main_ip: main_ip.into(),
            harvesters: roles
                .harvesters
                .iter()
                .map(|h| (h.ip.clone(), h.label.clone()))
                .collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "[main]");
        let _ = writeln!(out, "{}", self.main_ip);
        let _ = writeln!(out);
        let _ = writeln!(out, "[harvesters]");
        for (ip, label) in &self.harvesters {
            let _ = writeln!(out, "{} provider={}", ip, label);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[harvesters:vars]");
        let _ = writeln!(out, "main_ip={}", self.main_ip);
        out
    }

    /// Write the rendered document to `path`, all or nothing.
    ///
    /// The content goes to a temporary file next to `path` which is then
    /// renamed over it, so readers never observe a half-written inventory.
    /// The parent directory must already exist.
    pub fn write(&self, path: &Path) -> Result<(), HarvestError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(|e| HarvestError::io(path, e))?;
        file.write_all(self.render().as_bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| HarvestError::io(path, e))?;
        file.persist(path).map_err(|e| HarvestError::io(path, e.error))?;

        info!(path = %path.display(), harvesters = self.harvesters.len(), "wrote inventory");
        Ok(())
    }
}
