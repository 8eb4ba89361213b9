use crate::core::tile_grid::TileCoordinate;
use std::path::{Path, PathBuf};

/// On-disk arena of tile workspaces, addressed by [`TileCoordinate`]
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile(&self, coord: TileCoordinate) -> TileWorkspace {
        TileWorkspace {
            dir: self.root.join(format!("Dalle_{}_{}", coord.x, coord.y)),
            coord,
        }
    }

    /// Column-merged copy of a solved tile, written by the mosaic row pass
    pub fn corrected_tile_path(&self, coord: TileCoordinate) -> PathBuf {
        self.root.join(format!("Dalle_corrigee_{}_{}.tif", coord.x, coord.y))
    }

    pub fn row_mosaic_path(&self, y: usize) -> PathBuf {
        self.root.join(format!("ligne_mosaic_{}.tif", y))
    }

    /// Row mosaic after the vertical seam pass
    pub fn corrected_row_path(&self, y: usize) -> PathBuf {
        self.root.join(format!("ligne_mosaic_corrigee_{}.tif", y))
    }
}

/// Directory holding the four rasters of one tile
#[derive(Debug, Clone)]
pub struct TileWorkspace {
    pub coord: TileCoordinate,
    dir: PathBuf,
}

impl TileWorkspace {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, prefix: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}_{}.tif", prefix, self.coord.x, self.coord.y))
    }

    /// Input elevation window
    pub fn dsm_path(&self) -> PathBuf {
        self.file("Out_MNS")
    }

    /// Input classification mask window
    pub fn mask_path(&self) -> PathBuf {
        self.file("Out_MASQUE")
    }

    /// Input initialization window
    pub fn init_path(&self) -> PathBuf {
        self.file("Out_INIT")
    }

    /// Solved output, absent until dispatch succeeds
    pub fn dtm_path(&self) -> PathBuf {
        self.file("Out_MNT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_paths() {
        let layout = WorkspaceLayout::new("/work/tmp");
        let ws = layout.tile(TileCoordinate::new(3, 1));
        assert_eq!(ws.dir(), Path::new("/work/tmp/Dalle_3_1"));
        assert_eq!(ws.dsm_path(), Path::new("/work/tmp/Dalle_3_1/Out_MNS_3_1.tif"));
        assert_eq!(ws.mask_path(), Path::new("/work/tmp/Dalle_3_1/Out_MASQUE_3_1.tif"));
        assert_eq!(ws.init_path(), Path::new("/work/tmp/Dalle_3_1/Out_INIT_3_1.tif"));
        assert_eq!(ws.dtm_path(), Path::new("/work/tmp/Dalle_3_1/Out_MNT_3_1.tif"));
        assert_eq!(
            layout.corrected_tile_path(TileCoordinate::new(3, 1)),
            Path::new("/work/tmp/Dalle_corrigee_3_1.tif")
        );
    }
}
