use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::inventory::{ItemKind, REMEDIATION_SCRIPT_KEY};
use crate::inventory_store::{InventoryStore, ItemFilter};

/// Keeps ids usable as file names.
fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Writes the script content of every `kind` record that has some to
/// `<dir>/<collection>/<id>.ps1`. Remediations also get their fix-up script
/// as `<id>.remediation.ps1`. Returns the written paths.
pub fn export_content(
    store: &dyn InventoryStore,
    kind: ItemKind,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let target = dir.join(kind.collection_name());
    fs::create_dir_all(&target).with_context(|| format!("Failed to create {:?}", target))?;

    let filter = ItemFilter {
        has_content: Some(true),
        ..Default::default()
    };
    let mut written = Vec::new();
    for record in store.list(kind, &filter)? {
        let stem = file_stem(&record.id);

        if let Some(content) = record.content.as_deref() {
            let path = target.join(format!("{}.ps1", stem));
            fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
            debug!("Exported {} {} to {:?}", kind, record.id, path);
            written.push(path);
        }

        if let Some(script) = record.metadata_str(REMEDIATION_SCRIPT_KEY) {
            let path = target.join(format!("{}.remediation.ps1", stem));
            fs::write(&path, script).with_context(|| format!("Failed to write {:?}", path))?;
            written.push(path);
        }
    }

    info!("Exported {} {} script file(s) to {:?}", written.len(), kind, target);
    Ok(written)
}
