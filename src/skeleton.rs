//! Morphological thinning of binary masks.

use image::{GrayImage, Luma};

/// Thin the foreground (non-zero pixels) of `mask` to a skeleton at most one pixel wide,
/// preserving connectivity. Uses the two-subiteration Zhang-Suen scheme; pixels outside
/// the image count as background.
///
/// The result holds 255 on the skeleton and 0 elsewhere.
pub fn thin(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut ret = GrayImage::new(width, height);
    for (Luma([dst]), Luma([src])) in ret.pixels_mut().zip(mask.pixels()) {
        if *src != 0 {
            *dst = 255;
        }
    }

    let mut to_clear = vec![];
    loop {
        let mut changed = false;
        for first_pass in [true, false] {
            to_clear.clear();
            for y in 0..height {
                for x in 0..width {
                    if ret.get_pixel(x, y).0[0] != 0 && is_deletable(&ret, x, y, first_pass) {
                        to_clear.push((x, y));
                    }
                }
            }

            changed |= !to_clear.is_empty();
            for &(x, y) in &to_clear {
                ret.put_pixel(x, y, Luma([0]));
            }
        }

        if !changed {
            break;
        }
    }

    ret
}

/// Coordinates `(x, y)` of every set pixel, in raster order.
pub fn set_pixel_coords(img: &GrayImage) -> Vec<(u32, u32)> {
    img.enumerate_pixels()
        .filter(|(_, _, Luma([p]))| *p != 0)
        .map(|(x, y, _)| (x, y))
        .collect()
}

// Neighbours P2..P9, clockwise from north.
fn neighbours(img: &GrayImage, x: u32, y: u32) -> [bool; 8] {
    let (width, height) = img.dimensions();
    let is_set = |dx: i64, dy: i64| {
        let nx = i64::from(x) + dx;
        let ny = i64::from(y) + dy;
        nx >= 0
            && ny >= 0
            && nx < i64::from(width)
            && ny < i64::from(height)
            && img.get_pixel(nx as u32, ny as u32).0[0] != 0
    };

    [
        is_set(0, -1),
        is_set(1, -1),
        is_set(1, 0),
        is_set(1, 1),
        is_set(0, 1),
        is_set(-1, 1),
        is_set(-1, 0),
        is_set(-1, -1),
    ]
}

fn is_deletable(img: &GrayImage, x: u32, y: u32, first_pass: bool) -> bool {
    let p = neighbours(img, x, y);
    let [p2, _p3, p4, _p5, p6, _p7, p8, _p9] = p;

    let set_count = p.iter().filter(|&&n| n).count();
    if !(2..=6).contains(&set_count) {
        return false;
    }

    let transitions = (0..8).filter(|&i| !p[i] && p[(i + 1) % 8]).count();
    if transitions != 1 {
        return false;
    }

    if first_pass {
        !(p2 && p4 && p6) && !(p4 && p6 && p8)
    } else {
        !(p2 && p4 && p8) && !(p2 && p6 && p8)
    }
}

#[cfg(test)]
mod test {
    use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};

    use super::*;

    #[test]
    fn test_thin_line_is_unchanged() {
        #[rustfmt::skip]
        let pixs = vec![
            0, 0,   0,   0,   0,   0,
            0, 255, 255, 255, 255, 0,
            0, 0,   0,   0,   0,   0,
        ];
        let img = GrayImage::from_vec(6, 3, pixs.clone()).unwrap();
        assert_eq!(thin(&img).into_raw(), pixs);
    }

    #[test]
    fn test_thick_bar_thins_to_one_pixel() {
        let mut img = GrayImage::new(40, 15);
        draw_filled_rect_mut(&mut img, Rect::at(5, 5).of_size(30, 5), Luma([255u8]));

        let skel = thin(&img);
        let coords = set_pixel_coords(&skel);
        assert!(!coords.is_empty());

        //at most one skeleton pixel per column, all near the bar's middle row.
        for x in 0..40 {
            assert!(coords.iter().filter(|(cx, _)| *cx == x).count() <= 1);
        }
        assert!(coords.iter().all(|&(_, y)| (6..=8).contains(&y)));

        //the skeleton spans most of the bar.
        let min_x = coords.iter().map(|c| c.0).min().unwrap();
        let max_x = coords.iter().map(|c| c.0).max().unwrap();
        assert!(max_x - min_x >= 20);
    }

    #[test]
    fn test_empty_mask() {
        let img = GrayImage::new(5, 5);
        assert!(set_pixel_coords(&thin(&img)).is_empty());
    }

    #[test]
    fn test_set_pixel_coords_raster_order() {
        #[rustfmt::skip]
        let pixs = vec![
            0, 9, 0,
            7, 0, 1,
        ];
        let img = GrayImage::from_vec(3, 2, pixs).unwrap();
        assert_eq!(set_pixel_coords(&img), vec![(1, 0), (0, 1), (2, 1)]);
    }
}
