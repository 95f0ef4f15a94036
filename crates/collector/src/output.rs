// Copyright (C) 2025-present The tripstream Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::OutputConfig;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::debug;
use tripstream_analytics::{
    combine::FinalAggregate,
    render::{render, Colormap, Rgb, Shading},
};

/// Writes the raster payload of window emissions as PPM images
#[derive(Debug, Clone)]
pub struct ImageWriter {
    dir: PathBuf,
    colormap: Colormap,
    shading: Shading,
    background: Rgb,
}

impl ImageWriter {
    /// Creates `dir` if needed
    pub async fn new(dir: impl AsRef<Path>, config: &OutputConfig) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            colormap: config.colormap.colormap(),
            shading: config.shading,
            background: config.background,
        })
    }

    /// Renders `window` into `<dir>/<name>-<seq>.ppm`, scalar windows are
    /// ignored
    pub async fn write(
        &self,
        name: &str,
        seq: u64,
        window: &FinalAggregate,
    ) -> io::Result<Option<PathBuf>> {
        let Some(raster) = window.raster() else {
            return Ok(None);
        };
        let image = render(
            raster,
            window.op(),
            &self.colormap,
            self.background,
            self.shading,
        );
        let mut buf = Vec::with_capacity(image.width() * image.height() * 3 + 32);
        image.write_ppm(&mut buf)?;
        let path = self.dir.join(format!("{name}-{seq:06}.ppm"));
        tokio::fs::write(&path, buf).await?;
        debug!("Wrote '{}' window {} to {}", name, window.label(), path.display());
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;
    use tripstream_analytics::{
        batch::ColumnarBatch,
        reduce::{GridSpec, RasterReducer, ReduceOp, ScalarReducer},
        retention::RetentionBuffer,
        window::SlidingWindowAggregator,
    };

    fn batch() -> ColumnarBatch {
        ColumnarBatch::new(
            vec![Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(); 2],
            IndexMap::from([
                ("x".to_string(), vec![0.5, 1.5]),
                ("y".to_string(), vec![0.5, 0.5]),
            ]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_write_raster_window() {
        let dir = std::env::temp_dir().join(format!("tripstream-output-{}", std::process::id()));
        let writer = ImageWriter::new(&dir, &OutputConfig::default())
            .await
            .unwrap();
        let grid = GridSpec {
            x_min: 0.0,
            x_max: 2.0,
            y_min: 0.0,
            y_max: 1.0,
            width: 2,
            height: 1,
        };
        let mut window = SlidingWindowAggregator::new(
            RasterReducer::new("x", "y", None, ReduceOp::Count, grid).unwrap(),
            1,
            RetentionBuffer::single(),
        )
        .unwrap();
        let result = window.update(&batch()).unwrap();

        let path = writer.write("pickups", 7, &result).await.unwrap().unwrap();
        assert_eq!(path, dir.join("pickups-000007.ppm"));
        let bytes = tokio::fs::read(&path).await.unwrap();
        assert!(bytes.starts_with(b"P6\n2 1\n255\n"));
        assert_eq!(bytes.len(), b"P6\n2 1\n255\n".len() + 6);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_scalar_window_is_skipped() {
        let dir = std::env::temp_dir().join(format!("tripstream-scalar-{}", std::process::id()));
        let writer = ImageWriter::new(&dir, &OutputConfig::default())
            .await
            .unwrap();
        let mut window = SlidingWindowAggregator::new(
            ScalarReducer::new(None, ReduceOp::Count).unwrap(),
            1,
            RetentionBuffer::single(),
        )
        .unwrap();
        let result = window.update(&batch()).unwrap();
        assert_eq!(writer.write("trips", 0, &result).await.unwrap(), None);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
