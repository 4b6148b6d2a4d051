//! Stimulus preloading. Every image must be available before timing starts.

use super::ui::UiSink;
use picnam_core::{Result, SessionError, StimulusItem};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait AssetLoader {
    /// Makes the image for `item` ready for immediate display.
    fn load(&mut self, item: &StimulusItem) -> Result<()>;
}

/// Images are files under a root directory, looked up by `image_file`.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    root: PathBuf,
}

impl DirectoryAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, item: &StimulusItem) -> PathBuf {
        self.root.join(&item.image_file)
    }
}

impl AssetLoader for DirectoryAssets {
    fn load(&mut self, item: &StimulusItem) -> Result<()> {
        let path = self.path_for(item);
        let resource = format!("image {}", item.image_file);
        let meta = std::fs::metadata(&path)
            .map_err(|e| SessionError::resource(&resource, format!("{}: {}", path.display(), e)))?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(SessionError::resource(
                resource,
                format!("{} is empty or not a file", path.display()),
            ));
        }
        debug!(file = %path.display(), bytes = meta.len(), "asset ready");
        Ok(())
    }
}

/// Loader for runs without images, e.g. dry runs in a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllAssets;

impl AssetLoader for AcceptAllAssets {
    fn load(&mut self, _item: &StimulusItem) -> Result<()> {
        Ok(())
    }
}

/// Loads every item in order. The first failure stops preloading.
pub fn preload_all<'a, I>(loader: &mut dyn AssetLoader, items: I, ui: &mut dyn UiSink) -> Result<()>
where
    I: IntoIterator<Item = &'a StimulusItem>,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    let total = items.len();
    for (i, item) in items.enumerate() {
        ui.set_status(&format!("Preloading images ({}/{})", i + 1, total));
        if let Err(e) = loader.load(item) {
            warn!(image = %item.image_file, error = %e, "preload failed");
            return Err(e);
        }
    }
    Ok(())
}
