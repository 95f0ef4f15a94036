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

//! Colour mapping of raster payloads into images.
//!
//! Rendering is applied downstream of the combiner, on the merged raster of a
//! window: bins without any record take the background colour, the others are
//! normalized over the range of the non-empty bins and mapped through a
//! colormap.

use crate::reduce::{Raster, ReduceOp};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use strum_macros::{Display, EnumString};

pub type Rgb = [u8; 3];

pub const BLACK: Rgb = [0, 0, 0];
pub const WHITE: Rgb = [255, 255, 255];

/// Linear interpolation between evenly spaced colour stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Colormap {
    stops: Vec<Rgb>,
}

impl Colormap {
    /// Returns `None` when no stop is given
    pub fn new(stops: Vec<Rgb>) -> Option<Self> {
        if stops.is_empty() {
            None
        } else {
            Some(Self { stops })
        }
    }

    /// Colour at position `t`, clamped to `[0, 1]`
    pub fn color(&self, t: f64) -> Rgb {
        let last = self.stops.len() - 1;
        if last == 0 || t.is_nan() {
            return self.stops[0];
        }
        let pos = t.clamp(0.0, 1.0) * last as f64;
        let idx = (pos.floor() as usize).min(last - 1);
        let frac = pos - idx as f64;
        let (lo, hi) = (self.stops[idx], self.stops[idx + 1]);
        let mut rgb = [0; 3];
        for (channel, (lo, hi)) in rgb.iter_mut().zip(lo.iter().zip(hi.iter())) {
            *channel = (*lo as f64 + (*hi as f64 - *lo as f64) * frac).round() as u8;
        }
        rgb
    }
}

#[derive(
    Display, EnumString, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Palette {
    Fire,
    Viridis,
    Greys,
}

impl Palette {
    pub fn colormap(&self) -> Colormap {
        let stops = match self {
            Self::Fire => vec![
                [0, 0, 0],
                [128, 0, 0],
                [230, 30, 0],
                [255, 140, 0],
                [255, 230, 60],
                [255, 255, 255],
            ],
            Self::Viridis => vec![
                [68, 1, 84],
                [59, 82, 139],
                [33, 145, 140],
                [94, 201, 98],
                [253, 231, 37],
            ],
            Self::Greys => vec![WHITE, BLACK],
        };
        Colormap { stops }
    }
}

#[derive(
    Display, EnumString, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Shading {
    Linear,
    /// `ln(1 + v - min)`, spreads out heavy tailed counts
    #[default]
    Log,
}

impl Shading {
    fn normalize(&self, value: f64, min: f64, max: f64) -> f64 {
        let span = max - min;
        if span <= 0.0 {
            return 1.0;
        }
        match self {
            Self::Linear => (value - min) / span,
            Self::Log => (value - min).ln_1p() / span.ln_1p(),
        }
    }
}

/// RGBA image, row 0 at the top
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<[u8; 4]>,
}

impl Image {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    /// Writes the image as a binary PPM, dropping the alpha channel
    pub fn write_ppm<W: Write>(&self, mut writer: W) -> io::Result<()> {
        write!(writer, "P6\n{} {}\n255\n", self.width, self.height)?;
        for [r, g, b, _] in &self.pixels {
            writer.write_all(&[*r, *g, *b])?;
        }
        writer.flush()
    }
}

/// Maps the finalized bins of `raster` to colours.
///
/// Empty bins and bins without a finite value take `background` with a zero
/// alpha.
pub fn render(
    raster: &Raster,
    op: ReduceOp,
    colormap: &Colormap,
    background: Rgb,
    shading: Shading,
) -> Image {
    let grid = raster.grid();
    let values: Vec<Option<f64>> = raster
        .cells()
        .iter()
        .map(|cell| {
            if cell.is_empty() {
                None
            } else {
                cell.value(op).filter(|v| v.is_finite())
            }
        })
        .collect();
    let (min, max) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(*v), max.max(*v))
        });

    let mut pixels = Vec::with_capacity(grid.len());
    for img_row in 0..grid.height {
        let row = grid.height - 1 - img_row;
        for col in 0..grid.width {
            let pixel = match values[row * grid.width + col] {
                Some(value) => {
                    let [r, g, b] = colormap.color(shading.normalize(value, min, max));
                    [r, g, b, 255]
                }
                None => {
                    let [r, g, b] = background;
                    [r, g, b, 0]
                }
            };
            pixels.push(pixel);
        }
    }
    Image {
        width: grid.width,
        height: grid.height,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::{Accumulator, GridSpec};

    fn raster() -> Raster {
        let grid = GridSpec {
            x_min: 0.0,
            x_max: 2.0,
            y_min: 0.0,
            y_max: 2.0,
            width: 2,
            height: 2,
        };
        let mut raster = Raster::init(grid);
        // bottom left: 1, bottom right: 3, top left: empty, top right: 2
        raster.push((0.5, 0.5, 1.0));
        raster.push((1.5, 0.5, 1.0));
        raster.push((1.5, 0.5, 1.0));
        raster.push((1.5, 0.5, 1.0));
        raster.push((1.5, 1.5, 1.0));
        raster.push((1.5, 1.5, 1.0));
        raster
    }

    #[test]
    fn test_colormap_interpolation() {
        let greys = Palette::Greys.colormap();
        assert_eq!(greys.color(0.0), WHITE);
        assert_eq!(greys.color(1.0), BLACK);
        assert_eq!(greys.color(0.5), [128, 128, 128]);
        assert_eq!(greys.color(7.0), BLACK);
        assert_eq!(greys.color(f64::NAN), WHITE);
        assert_eq!(Colormap::new(vec![]), None);
        assert_eq!(Colormap::new(vec![BLACK]).unwrap().color(0.3), BLACK);
    }

    #[test]
    fn test_render_linear() {
        let image = render(
            &raster(),
            ReduceOp::Count,
            &Palette::Greys.colormap(),
            [10, 20, 30],
            Shading::Linear,
        );
        assert_eq!(image.width(), 2);
        assert_eq!(image.height(), 2);
        // Row 0 is the top of the grid
        assert_eq!(image.pixel(0, 0), Some([10, 20, 30, 0]));
        assert_eq!(image.pixel(1, 0), Some([128, 128, 128, 255]));
        assert_eq!(image.pixel(0, 1), Some([255, 255, 255, 255]));
        assert_eq!(image.pixel(1, 1), Some([0, 0, 0, 255]));
        assert_eq!(image.pixel(2, 0), None);
    }

    #[test]
    fn test_render_log_keeps_extremes() {
        let image = render(
            &raster(),
            ReduceOp::Count,
            &Palette::Greys.colormap(),
            BLACK,
            Shading::Log,
        );
        assert_eq!(image.pixel(0, 1), Some([255, 255, 255, 255]));
        assert_eq!(image.pixel(1, 1), Some([0, 0, 0, 255]));
        // ln(2) / ln(3) of the way to black
        let [r, _, _, _] = image.pixel(1, 0).unwrap();
        assert!(r < 128);
    }

    #[test]
    fn test_render_empty_raster() {
        let grid = *raster().grid();
        let image = render(
            &Raster::empty(grid),
            ReduceOp::Sum,
            &Palette::Fire.colormap(),
            WHITE,
            Shading::Log,
        );
        assert!((0..2).all(|x| (0..2).all(|y| image.pixel(x, y) == Some([255, 255, 255, 0]))));
    }

    #[test]
    fn test_write_ppm() {
        let image = render(
            &raster(),
            ReduceOp::Count,
            &Palette::Viridis.colormap(),
            BLACK,
            Shading::Linear,
        );
        let mut out = Vec::new();
        image.write_ppm(&mut out).unwrap();
        let header = b"P6\n2 2\n255\n";
        assert_eq!(&out[..header.len()], header);
        assert_eq!(out.len(), header.len() + 2 * 2 * 3);
    }
}
