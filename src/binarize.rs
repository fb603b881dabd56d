//! Automatic (Otsu) binarization confined to an intensity range.
//!
//! Intensities are clamped into `lower..=upper` before the histogram is split, so pixels
//! darker than `lower` always count as background and pixels brighter than `upper` always
//! count as foreground. The cut point itself is never supplied by the caller.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{
    definitions::{DEFAULT_THRESHOLD_LOWER, DEFAULT_THRESHOLD_UPPER},
    Error,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThresholdRange {
    lower: u8,
    upper: u8,
}

impl ThresholdRange {
    pub fn new(lower: u8, upper: u8) -> Result<Self, Error> {
        if lower > upper {
            return Err(Error::InvalidConfig(format!(
                "threshold lower bound {lower} exceeds upper bound {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> u8 {
        self.lower
    }

    pub fn upper(&self) -> u8 {
        self.upper
    }
}

impl Default for ThresholdRange {
    fn default() -> Self {
        Self {
            lower: DEFAULT_THRESHOLD_LOWER,
            upper: DEFAULT_THRESHOLD_UPPER,
        }
    }
}

/// The Otsu level of `img` with intensities clamped to `range`. Pixels strictly above the
/// returned level are foreground.
///
/// Returns `None` if the clamped image holds a single intensity, in which case there is no
/// split and every pixel is background.
pub fn otsu_level_in_range(img: &GrayImage, range: ThresholdRange) -> Option<u8> {
    let (lower, upper) = (range.lower, range.upper);
    let clamped = imageproc::map::map_colors(img, |Luma([v])| Luma([v.clamp(lower, upper)]));

    //a single intensity has no split; otsu_level would put every pixel in the foreground.
    let min = clamped.pixels().map(|p| p.0[0]).min()?;
    let max = clamped.pixels().map(|p| p.0[0]).max()?;
    if min == max {
        return None;
    }

    Some(imageproc::contrast::otsu_level(&clamped))
}

/// Binarize `img` to {0, 255} using [`otsu_level_in_range`].
pub fn auto_threshold(img: &GrayImage, range: ThresholdRange) -> GrayImage {
    match otsu_level_in_range(img, range) {
        Some(level) => {
            imageproc::contrast::threshold(img, level, imageproc::contrast::ThresholdType::Binary)
        }
        None => GrayImage::new(img.width(), img.height()),
    }
}

/// Luma of a colour frame. Frames whose channels are equal convert exactly.
pub fn to_gray(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_range_validation() {
        assert!(ThresholdRange::new(10, 10).is_ok());
        assert!(matches!(ThresholdRange::new(11, 10), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_two_levels_split_between() {
        #[rustfmt::skip]
        let pixs = vec![
            0,   0,   0,   0,
            0,   200, 200, 0,
            0,   200, 200, 0,
            0,   0,   0,   0,
        ];
        let img = GrayImage::from_vec(4, 4, pixs).unwrap();
        let range = ThresholdRange::new(50, 255).unwrap();

        let level = otsu_level_in_range(&img, range).unwrap();
        assert!((50..200).contains(&level));

        #[rustfmt::skip]
        let exp = vec![
            0,   0,   0,   0,
            0,   255, 255, 0,
            0,   255, 255, 0,
            0,   0,   0,   0,
        ];
        assert_eq!(auto_threshold(&img, range).into_raw(), exp);
    }

    #[test]
    fn test_below_range_is_background() {
        //every pixel clamps to the lower bound, so there is nothing to split.
        #[rustfmt::skip]
        let pixs = vec![
            0,  10, 20,
            30, 40, 49,
        ];
        let img = GrayImage::from_vec(3, 2, pixs).unwrap();
        let range = ThresholdRange::new(50, 255).unwrap();

        assert_eq!(otsu_level_in_range(&img, range), None);
        assert!(auto_threshold(&img, range).pixels().all(|p| p.0 == [0]));
    }

    #[test]
    fn test_above_range_is_foreground() {
        #[rustfmt::skip]
        let pixs = vec![
            0,   0,   0,
            250, 0,   0,
        ];
        let img = GrayImage::from_vec(3, 2, pixs).unwrap();
        let range = ThresholdRange::new(30, 180).unwrap();

        let bin = auto_threshold(&img, range);
        assert_eq!(bin.get_pixel(0, 1), &Luma([255]));
        assert_eq!(bin.pixels().filter(|p| p.0 == [255]).count(), 1);
    }

    #[test]
    fn test_split_is_chosen_on_clamped_values() {
        //clamped to 50, 100 and 200, the widest gap is between 100 and 200.
        #[rustfmt::skip]
        let pixs = vec![
            10,  10,  10,  10,
            100, 100, 100, 100,
            240, 240, 240, 240,
            240, 240, 240, 240,
        ];
        let img = GrayImage::from_vec(4, 4, pixs).unwrap();
        let range = ThresholdRange::new(50, 200).unwrap();

        assert_eq!(otsu_level_in_range(&img, range), Some(100));

        let bin = auto_threshold(&img, range);
        let fg = bin.enumerate_pixels().filter(|(_, _, p)| p.0 == [255]).map(|(_, y, _)| y);
        assert!(fg.clone().all(|y| y >= 2));
        assert_eq!(fg.count(), 8);
    }

    #[test]
    fn test_uniform_image_has_no_split() {
        let img = GrayImage::from_pixel(5, 5, Luma([128]));
        let range = ThresholdRange::new(0, 255).unwrap();
        assert_eq!(otsu_level_in_range(&img, range), None);
    }
}
