//! Planar multi-channel image used between pipeline stages.

use rayon::prelude::*;

use common::Buffer2;
use crate::error::{Error, Result};

/// Grayscale or multi-channel image of real intensities.
///
/// Channels are stored as separate planes of identical extent, in R, G, B
/// order for colour images. Stages take `&Image` and return new images, so
/// one stage can never observe another stage's partial writes.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    channels: Vec<Buffer2<f32>>,
}

impl Image {
    pub fn from_channels(channels: Vec<Buffer2<f32>>) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::ChannelCount {
                expected: "at least 1",
                actual: 0,
            });
        };
        if let Some(other) = channels.iter().find(|c| !c.same_shape(first)) {
            return Err(Error::DimensionMismatch {
                what: "channel plane",
                expected: first.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(Self { channels })
    }

    pub fn gray(plane: Buffer2<f32>) -> Self {
        Self {
            channels: vec![plane],
        }
    }

    /// Splits interleaved `[c0, c1, .., c0, c1, ..]` samples into planes.
    pub fn from_interleaved(
        width: usize,
        height: usize,
        channel_count: usize,
        samples: &[f32],
    ) -> Self {
        assert!(channel_count > 0, "channel_count must be > 0");
        assert_eq!(
            samples.len(),
            width * height * channel_count,
            "samples length must equal width * height * channels"
        );
        let channels = (0..channel_count)
            .map(|c| {
                Buffer2::new(
                    width,
                    height,
                    samples
                        .iter()
                        .skip(c)
                        .step_by(channel_count)
                        .copied()
                        .collect(),
                )
            })
            .collect();
        Self { channels }
    }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        self.channels[0].dimensions()
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn channel(&self, c: usize) -> &Buffer2<f32> {
        &self.channels[c]
    }

    /// Mutable plane access for in-place drawing. Replacing the plane with
    /// one of a different extent breaks the image's invariant.
    #[inline]
    pub fn channel_mut(&mut self, c: usize) -> &mut Buffer2<f32> {
        &mut self.channels[c]
    }

    #[inline]
    pub fn channels(&self) -> &[Buffer2<f32>] {
        &self.channels
    }

    /// Weighted channel average. Grayscale images are returned as-is.
    pub fn luminance(&self, weights: [f32; 3]) -> Result<Buffer2<f32>> {
        match self.channels.as_slice() {
            [gray] => Ok(gray.clone()),
            [r, g, b] => {
                let total: f32 = weights.iter().sum();
                let [wr, wg, wb] = weights.map(|w| w / total);
                let mut out = Buffer2::new_default(r.width(), r.height());
                out.pixels_mut()
                    .par_iter_mut()
                    .zip(r.pixels().par_iter())
                    .zip(g.pixels().par_iter().zip(b.pixels().par_iter()))
                    .for_each(|((o, &r), (&g, &b))| *o = wr * r + wg * g + wb * b);
                Ok(out)
            }
            other => Err(Error::ChannelCount {
                expected: "1 or 3",
                actual: other.len(),
            }),
        }
    }

    /// Per-pixel sum over channels.
    pub fn channel_sum(&self) -> Buffer2<f32> {
        let (width, height) = self.dimensions();
        let mut out = Buffer2::new_default(width, height);
        for plane in &self.channels {
            for (o, &v) in out.iter_mut().zip(plane.iter()) {
                *o += v;
            }
        }
        out
    }

    /// Runs `f` on every channel in parallel and collects the new planes.
    pub fn map_channels<F>(&self, f: F) -> Image
    where
        F: Fn(&Buffer2<f32>) -> Buffer2<f32> + Sync + Send,
    {
        Image {
            channels: self.channels.par_iter().map(f).collect(),
        }
    }

    /// Applies `f` to every sample of every channel.
    pub fn map_samples(&self, f: impl Fn(f32) -> f32 + Sync + Send) -> Image {
        self.map_channels(|plane| plane.map(|&v| f(v)))
    }

    /// Copies the window `[x0, x1) × [y0, y1)` of every channel.
    pub fn crop(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Image {
        Image {
            channels: self
                .channels
                .iter()
                .map(|c| c.crop(x0, y0, x1, y1))
                .collect(),
        }
    }

    /// Replicates a grayscale image into R, G, B; colour images are cloned.
    pub fn to_rgb(&self) -> Image {
        if self.channels.len() == 1 {
            Image {
                channels: vec![self.channels[0].clone(); 3],
            }
        } else {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgb(width: usize, height: usize, r: f32, g: f32, b: f32) -> Image {
        Image::from_channels(vec![
            Buffer2::new_filled(width, height, r),
            Buffer2::new_filled(width, height, g),
            Buffer2::new_filled(width, height, b),
        ])
        .unwrap()
    }

    #[test]
    fn from_channels_rejects_mismatched_planes() {
        let result = Image::from_channels(vec![
            Buffer2::new_default(4, 4),
            Buffer2::new_default(4, 3),
        ]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
        assert!(matches!(
            Image::from_channels(vec![]),
            Err(Error::ChannelCount { .. })
        ));
    }

    #[test]
    fn interleaved_split() {
        let img = Image::from_interleaved(2, 1, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(img.channel(0).pixels(), &[1.0, 4.0]);
        assert_eq!(img.channel(1).pixels(), &[2.0, 5.0]);
        assert_eq!(img.channel(2).pixels(), &[3.0, 6.0]);
    }

    #[test]
    fn luminance_uses_normalized_weights() {
        let img = rgb(3, 2, 100.0, 50.0, 10.0);
        let lum = img.luminance([0.299, 0.587, 0.114]).unwrap();
        let expected = 0.299 * 100.0 + 0.587 * 50.0 + 0.114 * 10.0;
        assert!(lum.iter().all(|&v| (v - expected).abs() < 1e-3));

        let doubled = img.luminance([0.598, 1.174, 0.228]).unwrap();
        assert!(doubled.iter().all(|&v| (v - expected).abs() < 1e-3));
    }

    #[test]
    fn luminance_rejects_two_channels() {
        let img = Image::from_channels(vec![Buffer2::new_default(2, 2); 2]).unwrap();
        assert!(matches!(
            img.luminance([0.299, 0.587, 0.114]),
            Err(Error::ChannelCount { actual: 2, .. })
        ));
    }

    #[test]
    fn channel_sum_and_crop() {
        let img = rgb(4, 4, 1.0, 2.0, 3.0);
        assert!(img.channel_sum().iter().all(|&v| v == 6.0));
        let cropped = img.crop(1, 1, 3, 4);
        assert_eq!(cropped.dimensions(), (2, 3));
        assert_eq!(cropped.channel_count(), 3);
    }

    #[test]
    fn map_channels_leaves_source_untouched() {
        let img = rgb(2, 2, 1.0, 2.0, 3.0);
        let out = img.map_samples(|v| v * 10.0);
        assert_eq!(img.channel(2).pixels(), &[3.0; 4]);
        assert_eq!(out.channel(2).pixels(), &[30.0; 4]);
    }
}
