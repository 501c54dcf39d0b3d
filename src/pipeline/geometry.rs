//! Polygon helpers for traced mask boundaries.
//!
//! Boundaries are closed chains of pixel centres; the last point connects
//! back to the first.

use image::GrayImage;
use imageproc::point::Point;

/// Inclusive pixel extent of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn of(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        })
    }

    /// `width / height`
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + (self.width as f32 - 1.0) / 2.0,
            self.y as f32 + (self.height as f32 - 1.0) / 2.0,
        )
    }
}

/// Enclosed area of a closed polygon (shoelace formula)
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

/// Length of the closed polygon outline
pub fn perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| distance(a, b))
        .sum()
}

fn distance(a: &Point<i32>, b: &Point<i32>) -> f64 {
    let dx = (b.x - a.x) as f64;
    let dy = (b.y - a.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Distance from `p` to the segment `a`-`b`
fn segment_distance(p: &Point<i32>, a: &Point<i32>, b: &Point<i32>) -> f64 {
    let (ax, ay) = (a.x as f64, a.y as f64);
    let (dx, dy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let (px, py) = (p.x as f64 - ax, p.y as f64 - ay);

    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return (px * px + py * py).sqrt();
    }
    let t = ((px * dx + py * dy) / len_sq).clamp(0.0, 1.0);
    let (ex, ey) = (px - t * dx, py - t * dy);
    (ex * ex + ey * ey).sqrt()
}

/// Douglas-Peucker simplification of a closed polygon
///
/// The chain is split at the first point and the point farthest from it,
/// and each half is simplified as an open polyline.
pub fn simplify_closed(points: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let start = points[0];
    let (split, _) = points
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, p)| (i, distance(&start, p)))
        .fold((1, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[split] = true;
    mark_open(points, 0, split, epsilon, &mut keep);

    // second half wraps back to the start point
    let mut tail: Vec<Point<i32>> = points[split..].to_vec();
    tail.push(start);
    let mut tail_keep = vec![false; tail.len()];
    mark_open(&tail, 0, tail.len() - 1, epsilon, &mut tail_keep);
    for (i, k) in tail_keep.iter().enumerate().take(tail.len() - 1) {
        if *k {
            keep[split + i] = true;
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

fn mark_open(points: &[Point<i32>], first: usize, last: usize, epsilon: f64, keep: &mut [bool]) {
    let mut stack = vec![(first, last)];
    while let Some((lo, hi)) = stack.pop() {
        if hi <= lo + 1 {
            continue;
        }
        let (index, dist) = (lo + 1..hi)
            .map(|i| (i, segment_distance(&points[i], &points[lo], &points[hi])))
            .fold((lo + 1, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if dist > epsilon {
            keep[index] = true;
            stack.push((lo, index));
            stack.push((index, hi));
        }
    }
}

/// Fill the interior and outline of a closed boundary into `canvas`
///
/// Scanline crossings use half-open edges so shared vertices are counted
/// once; outline pixels are painted explicitly.
pub fn fill_polygon(canvas: &mut GrayImage, points: &[Point<i32>], value: u8) {
    let (width, height) = canvas.dimensions();
    let Some(bounds) = Bounds::of(points) else {
        return;
    };

    let mut put = |x: i32, y: i32| {
        if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
            canvas.put_pixel(x as u32, y as u32, image::Luma([value]));
        }
    };

    let mut crossings: Vec<f64> = Vec::new();
    let y_end = bounds.y + bounds.height as i32;
    for y in bounds.y..y_end {
        crossings.clear();
        let yf = y as f64;
        for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
            let (ya, yb) = (a.y as f64, b.y as f64);
            if (ya <= yf && yf < yb) || (yb <= yf && yf < ya) {
                let t = (yf - ya) / (yb - ya);
                crossings.push(a.x as f64 + t * (b.x - a.x) as f64);
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));

        for pair in crossings.chunks_exact(2) {
            let x0 = pair[0].ceil() as i32;
            let x1 = pair[1].floor() as i32;
            for x in x0..=x1 {
                put(x, y);
            }
        }
    }

    for p in points {
        put(p.x, p.y);
    }
}
