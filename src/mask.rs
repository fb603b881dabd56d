//! Largest-region foreground masks.
//!
//! A frame is binarized with [`auto_threshold`], its top-level outer contours are traced,
//! and the contour enclosing the greatest area is filled solid. Everything else is cleared.

use image::{DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::{
    contours::{BorderType, Contour},
    definitions::Image,
    point::Point,
    region_labelling::{connected_components, Connectivity},
};
use log::warn;

use crate::{
    binarize::{auto_threshold, to_gray, ThresholdRange},
    progress::{ProgressObserver, ProgressTracker},
    video::{VideoSink, VideoSource},
    Error,
};

/// A filled single-region mask: 255 inside the region, 0 elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
    area: f64,
}

impl Mask {
    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn into_image(self) -> GrayImage {
        self.image
    }

    /// Area enclosed by the region's outer contour, in square pixels.
    pub fn contour_area(&self) -> f64 {
        self.area
    }

    /// Number of pixels set in the mask.
    pub fn pixel_count(&self) -> usize {
        self.image.pixels().filter(|Luma([p])| *p != 0).count()
    }
}

/// Extract the largest foreground region of `img`.
///
/// When several contours enclose the same largest area, the first one traced (in raster
/// order) wins. Fails with [`Error::NoForegroundRegion`] if the binarized frame is empty.
pub fn extract_mask(img: &GrayImage, range: ThresholdRange) -> Result<Mask, Error> {
    let bin = auto_threshold(img, range);

    let contours = imageproc::contours::find_contours::<i32>(&bin);

    let mut largest: Option<(&Contour<i32>, f64)> = None;
    for contour in contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
    {
        let area = polygon_area(&contour.points);
        if largest.map_or(true, |(_, best)| area > best) {
            largest = Some((contour, area));
        }
    }

    let (contour, area) = largest.ok_or(Error::NoForegroundRegion)?;
    let seed = contour.points.first().ok_or(Error::NoForegroundRegion)?;

    let regions = connected_components(&bin, Connectivity::Eight, Luma([0u8]));
    let Luma([label]) = *regions.get_pixel(seed.x as u32, seed.y as u32);

    let mut image = maskize_region(&regions, label);
    fill_holes(&mut image);

    Ok(Mask { image, area })
}

/// [`extract_mask`] for a colour frame, returning the mask replicated across three channels.
pub fn extract_mask_rgb(frame: &RgbImage, range: ThresholdRange) -> Result<RgbImage, Error> {
    let mask = extract_mask(&to_gray(frame), range)?;
    Ok(DynamicImage::ImageLuma8(mask.into_image()).to_rgb8())
}

/// Counters from a masking pass over a whole video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaskStats {
    pub frames_written: u64,
    /// Frames with no foreground, written as all-zero masks.
    pub empty_frames: u64,
}

/// Replace every frame of `source` with its largest-region mask, writing to `sink`.
///
/// A frame with no foreground does not stop the pass: it is written as an all-zero mask and
/// counted in [`MaskStats::empty_frames`]. Any other failure aborts. The sink is not finished.
pub fn mask_video(
    source: &dyn VideoSource,
    range: ThresholdRange,
    sink: &mut dyn VideoSink,
    progress: Option<&mut dyn ProgressObserver>,
) -> Result<MaskStats, Error> {
    let meta = source.meta();
    let limit = if meta.frame_count == 0 {
        u64::MAX
    } else {
        meta.frame_count
    };

    let mut tracker = ProgressTracker::new(progress, meta.frame_count);
    let mut stats = MaskStats::default();

    for (frame_idx, frame) in (0..limit).zip(source.frames()?) {
        let frame = frame.map_err(|e| e.at_frame(frame_idx))?;

        let masked = match extract_mask_rgb(&frame, range) {
            Ok(masked) => masked,
            Err(Error::NoForegroundRegion) => {
                warn!("No foreground region in frame {frame_idx}, writing an empty mask");
                stats.empty_frames += 1;
                RgbImage::new(frame.width(), frame.height())
            }
            Err(e) => return Err(e.at_frame(frame_idx)),
        };

        sink.write_frame(&masked)
            .map_err(|e| e.at_frame(frame_idx))?;

        stats.frames_written += 1;
        tracker.frame_done(stats.frames_written);
    }

    Ok(stats)
}

// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();

    twice_area.abs() as f64 / 2.0
}

fn maskize_region(regions: &Image<Luma<u32>>, label: u32) -> GrayImage {
    let mut ret = GrayImage::new(regions.width(), regions.height());

    for (&mut Luma([ref mut ret_pix]), &Luma([region_pix])) in
        ret.pixels_mut().zip(regions.pixels())
    {
        if region_pix == label {
            *ret_pix = 255;
        }
    }

    ret
}

// Set every pixel that cannot reach the image border without crossing the mask.
fn fill_holes(mask: &mut GrayImage) {
    let (width, height) = mask.dimensions();

    let mut inverse = mask.clone();
    image::imageops::invert(&mut inverse);

    //background of an 8-connected region is 4-connected.
    let regions = connected_components(&inverse, Connectivity::Four, Luma([0u8]));

    let mut outside = vec![];
    for (x, y, Luma([label])) in regions.enumerate_pixels() {
        let on_border = x == 0 || y == 0 || x + 1 == width || y + 1 == height;
        if on_border && *label != 0 && !outside.contains(label) {
            outside.push(*label);
        }
    }

    for (Luma([mask_pix]), Luma([label])) in mask.pixels_mut().zip(regions.pixels()) {
        if *label != 0 && !outside.contains(label) {
            *mask_pix = 255;
        }
    }
}

#[cfg(test)]
mod test {
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    use super::*;
    use crate::video::{MemorySink, MemoryVideo};

    fn full_range() -> ThresholdRange {
        ThresholdRange::new(50, 255).unwrap()
    }

    fn set_pixels(mask: &GrayImage) -> Vec<(u32, u32)> {
        mask.enumerate_pixels()
            .filter(|(_, _, Luma([p]))| *p == 255)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_keeps_only_largest_region() {
        #[rustfmt::skip]
        let pixs = vec![
            200, 0,   0,   0,   0,   0,
            0,   0,   200, 200, 200, 0,
            0,   0,   200, 200, 200, 0,
            0,   0,   200, 200, 200, 0,
            0,   0,   0,   0,   0,   0,
        ];
        let img = GrayImage::from_vec(6, 5, pixs).unwrap();
        let mask = extract_mask(&img, full_range()).unwrap();

        #[rustfmt::skip]
        let exp = vec![
            0,   0,   0,   0,   0,   0,
            0,   0,   255, 255, 255, 0,
            0,   0,   255, 255, 255, 0,
            0,   0,   255, 255, 255, 0,
            0,   0,   0,   0,   0,   0,
        ];
        assert_eq!(mask.image().as_raw(), &exp);
        assert_eq!(mask.contour_area(), 4.0);
        assert_eq!(mask.pixel_count(), 9);
    }

    #[test]
    fn test_holes_are_filled() {
        #[rustfmt::skip]
        let pixs = vec![
            0,   0,   0,   0,   0,   0,   0,
            0,   200, 200, 200, 200, 200, 0,
            0,   200, 0,   0,   0,   200, 0,
            0,   200, 0,   200, 0,   200, 0,
            0,   200, 0,   0,   0,   200, 0,
            0,   200, 200, 200, 200, 200, 0,
            0,   0,   0,   0,   0,   0,   0,
        ];
        let img = GrayImage::from_vec(7, 7, pixs).unwrap();
        let mask = extract_mask(&img, full_range()).unwrap();

        let filled = set_pixels(mask.image());
        assert_eq!(filled.len(), 25);
        assert!(filled.iter().all(|&(x, y)| (1..=5).contains(&x) && (1..=5).contains(&y)));
    }

    #[test]
    fn test_equal_areas_prefer_first_found() {
        #[rustfmt::skip]
        let pixs = vec![
            0,   0,   0,   0,   0,   0,
            0,   200, 200, 0,   0,   0,
            0,   200, 200, 0,   0,   0,
            0,   0,   0,   0,   200, 200,
            0,   0,   0,   0,   200, 200,
        ];
        let img = GrayImage::from_vec(6, 5, pixs).unwrap();
        let mask = extract_mask(&img, full_range()).unwrap();

        assert_eq!(set_pixels(mask.image()), vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
    }

    #[test]
    fn test_rgb_mask_is_grey() {
        let mut frame = RgbImage::new(8, 8);
        draw_filled_rect_mut(&mut frame, Rect::at(1, 2).of_size(3, 3), image::Rgb([40, 220, 90]));

        let mask = extract_mask_rgb(&frame, full_range()).unwrap();
        let set = mask.enumerate_pixels().filter(|(_, _, p)| p.0 == [255; 3]).count();
        assert_eq!(set, 9);
        assert!(mask.pixels().all(|p| p.0 == [255; 3] || p.0 == [0; 3]));
        assert_eq!(mask.get_pixel(2, 3).0, [255; 3]);
    }

    #[test]
    fn test_empty_frame_has_no_region() {
        let img = GrayImage::new(8, 8);
        assert_eq!(
            extract_mask(&img, full_range()),
            Err(Error::NoForegroundRegion)
        );
    }

    #[test]
    fn test_filled_circle_area() {
        let mut img = GrayImage::new(64, 64);
        draw_filled_circle_mut(&mut img, (32, 32), 15, Luma([220u8]));

        let mask = extract_mask(&img, full_range()).unwrap();
        let expected = std::f64::consts::PI * 15.0 * 15.0;
        assert!((mask.contour_area() - expected).abs() / expected < 0.1);
        assert_eq!(mask.pixel_count(), img.pixels().filter(|p| p.0 == [220]).count());
    }

    #[test]
    fn test_mask_video_writes_empty_frames() {
        let mut with_region = RgbImage::new(10, 10);
        draw_filled_rect_mut(
            &mut with_region,
            Rect::at(2, 2).of_size(4, 4),
            image::Rgb([180, 180, 180]),
        );
        let blank = RgbImage::new(10, 10);
        let vid = MemoryVideo::from_frames(vec![with_region, blank], 25.0).unwrap();

        let mut sink = MemorySink::new(vid.meta());
        let stats = mask_video(&vid, full_range(), &mut sink, None).unwrap();
        assert_eq!(
            stats,
            MaskStats {
                frames_written: 2,
                empty_frames: 1
            }
        );

        let out = sink.into_video();
        let frames = out.frames_slice();
        assert_eq!(frames[0].pixels().filter(|p| p.0 == [255; 3]).count(), 16);
        assert!(frames[1].pixels().all(|p| p.0 == [0; 3]));
    }
}
