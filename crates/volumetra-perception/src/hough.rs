//! Gradient-directed circular Hough transform.
//!
//! The (x, y, r) parameter space is searched in two stages, as in the
//! classic "Hough gradient" method:
//!
//! 1. **Edges.** Sobel gradients of the blurred image; a pixel is an edge
//!    when its gradient magnitude reaches `edge_threshold` and is a maximum
//!    along the (quantised) gradient direction.
//! 2. **Center votes.** Each edge pixel casts one vote per radius step into a
//!    2-D accumulator, walking both ways along its gradient from
//!    `min_radius_px` to `max_radius_px`. The center of a circle is where
//!    those rays cross.
//! 3. **Radius votes.** For each accumulator peak, edge distances from the
//!    center are histogrammed in 1 px bins; the best-supported radius wins.
//!
//! Steps 1–2 run eagerly in [`CircleDetector::detect`]; step 3 runs lazily
//! as the returned [`Candidates`] iterator is advanced, so a caller that only
//! wants the strongest peaks does not pay for the rest.

use std::f64::consts::PI;

use tracing::{debug, warn};
use volumetra_types::{CircleCandidate, VisionError};

use crate::config::DetectorConfig;
use crate::preprocess::{GrayImage, convolve_separable};

/// Unnormalised Sobel kernels.
const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Edge pixel position and its unit gradient direction.
#[derive(Debug, Clone, Copy)]
struct EdgePoint {
    x: f64,
    y: f64,
    ux: f64,
    uy: f64,
}

#[derive(Debug, Clone, Copy)]
struct Peak {
    votes: u32,
    center_x: f64,
    center_y: f64,
}

/// Circle detector configured once and reused every frame.
#[derive(Debug, Clone)]
pub struct CircleDetector {
    config: DetectorConfig,
}

impl CircleDetector {
    /// # Errors
    ///
    /// Returns [`VisionError::Config`] if `config` fails validation.
    pub fn new(config: DetectorConfig) -> Result<Self, VisionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Search `image` for circles.
    ///
    /// Never fails: an image without circles yields an empty iterator.
    pub fn detect(&self, image: &GrayImage) -> Candidates {
        let edges = self.edge_points(image);
        let peaks = if edges.is_empty() {
            Vec::new()
        } else {
            self.center_peaks(image, &edges)
        };
        debug!(
            edges = edges.len(),
            peaks = peaks.len(),
            "hough accumulation finished"
        );
        Candidates {
            edges,
            peaks,
            next_peak: 0,
            emitted: Vec::new(),
            min_radius: f64::from(self.config.min_radius_px),
            max_radius: f64::from(self.config.max_radius_px),
            min_center_distance: self.config.min_center_distance_px,
            min_coverage: self.config.min_coverage,
        }
    }

    /// Thin edges: gradient magnitude above threshold and not smaller than
    /// either neighbour along the gradient direction.
    fn edge_points(&self, image: &GrayImage) -> Vec<EdgePoint> {
        let w = image.width();
        let h = image.height();
        if w < 3 || h < 3 {
            return Vec::new();
        }
        let gx = convolve_separable(image, &SOBEL_DERIV, &SOBEL_SMOOTH);
        let gy = convolve_separable(image, &SOBEL_SMOOTH, &SOBEL_DERIV);
        let mut magnitude = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                magnitude.set(x, y, gx.get(x, y).hypot(gy.get(x, y)));
            }
        }

        let threshold = self.config.edge_threshold as f32;
        let mut edges = Vec::new();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let m = magnitude.get(x, y);
                if m < threshold || m == 0.0 {
                    continue;
                }
                let (dx, dy) = (gx.get(x, y), gy.get(x, y));
                let (ox, oy) = quantised_direction(dx, dy);
                let ahead = magnitude.get((x as isize + ox) as usize, (y as isize + oy) as usize);
                let behind = magnitude.get((x as isize - ox) as usize, (y as isize - oy) as usize);
                if m > behind && m >= ahead {
                    let norm = f64::from(m);
                    edges.push(EdgePoint {
                        x: x as f64,
                        y: y as f64,
                        ux: f64::from(dx) / norm,
                        uy: f64::from(dy) / norm,
                    });
                }
            }
        }
        edges
    }

    fn center_peaks(&self, image: &GrayImage, edges: &[EdgePoint]) -> Vec<Peak> {
        let dp = self.config.accumulator_resolution;
        let Some((acc_w, acc_h, cells)) = accumulator_shape(image.width(), image.height(), dp)
        else {
            warn!(
                width = image.width(),
                height = image.height(),
                accumulator_resolution = dp,
                "accumulator too large; skipping frame"
            );
            return Vec::new();
        };
        let mut acc = vec![0u32; cells];
        let (w, h) = (image.width() as f64, image.height() as f64);

        for p in edges {
            for sign in [1.0, -1.0] {
                for r in self.config.min_radius_px..=self.config.max_radius_px {
                    let r = f64::from(r) * sign;
                    let px = p.x + r * p.ux;
                    let py = p.y + r * p.uy;
                    if px < -0.5 || py < -0.5 || px >= w - 0.5 || py >= h - 0.5 {
                        break;
                    }
                    let cx = ((px + 0.5) / dp) as usize;
                    let cy = ((py + 0.5) / dp) as usize;
                    if cx < acc_w && cy < acc_h {
                        acc[cy * acc_w + cx] += 1;
                    }
                }
            }
        }

        let mut peaks = Vec::new();
        for cy in 0..acc_h {
            for cx in 0..acc_w {
                let idx = cy * acc_w + cx;
                let votes = acc[idx];
                if votes < self.config.min_votes || !is_local_max(&acc, acc_w, acc_h, cx, cy) {
                    continue;
                }
                let (center_x, center_y) = refine_center(&acc, acc_w, acc_h, cx, cy, dp);
                peaks.push((idx, Peak {
                    votes,
                    center_x,
                    center_y,
                }));
            }
        }
        peaks.sort_by(|(ia, a), (ib, b)| b.votes.cmp(&a.votes).then(ia.cmp(ib)));
        peaks.into_iter().map(|(_, peak)| peak).collect()
    }
}

/// Lazily evaluated circle candidates from one [`CircleDetector::detect`]
/// call, strongest center first.
///
/// Finite and single-pass; call `detect` again for a fresh sequence.
#[derive(Debug)]
pub struct Candidates {
    /// Row-major, so sorted by `y`.
    edges: Vec<EdgePoint>,
    peaks: Vec<Peak>,
    next_peak: usize,
    emitted: Vec<(f64, f64)>,
    min_radius: f64,
    max_radius: f64,
    min_center_distance: f64,
    min_coverage: f64,
}

impl Candidates {
    /// Edge points inside the square of half-side `reach` around
    /// `(cx, cy)`. Rows are found by binary search since `edges` is sorted
    /// by `y`.
    fn edges_within(&self, cx: f64, cy: f64, reach: f64) -> impl Iterator<Item = &EdgePoint> {
        let first = self.edges.partition_point(|p| p.y < cy - reach);
        let last = self.edges.partition_point(|p| p.y <= cy + reach);
        self.edges[first..last.max(first)]
            .iter()
            .filter(move |p| (p.x - cx).abs() <= reach)
    }

    /// Best radius for a center: the 3-bin window with the most edge support,
    /// smallest radius on ties, refined to the mean member distance.
    fn estimate_radius(&self, cx: f64, cy: f64) -> Option<(f64, u32)> {
        let lo = self.min_radius.floor() as usize;
        let hi = self.max_radius.ceil() as usize;
        let mut hist = vec![0u32; hi + 2];
        let mut distances = Vec::new();
        for p in self.edges_within(cx, cy, self.max_radius + 0.5) {
            let d = (p.x - cx).hypot(p.y - cy);
            if d + 0.5 >= self.min_radius && d - 0.5 <= self.max_radius {
                let bin = d.round() as usize;
                if bin < hist.len() {
                    hist[bin] += 1;
                    distances.push(d);
                }
            }
        }

        let mut best: Option<(usize, u32)> = None;
        for r in lo.max(1)..=hi {
            let support = hist[r - 1] + hist[r] + hist[r + 1];
            if support > best.map_or(0, |(_, s)| s) {
                best = Some((r, support));
            }
        }
        let (r, support) = best?;
        let r = r as f64;
        let members: Vec<f64> = distances
            .into_iter()
            .filter(|d| (d - r).abs() <= 1.5)
            .collect();
        let refined = members.iter().sum::<f64>() / members.len() as f64;
        Some((refined, support))
    }
}

impl Iterator for Candidates {
    type Item = CircleCandidate;

    fn next(&mut self) -> Option<CircleCandidate> {
        while let Some(&peak) = self.peaks.get(self.next_peak) {
            self.next_peak += 1;

            let crowded = self.emitted.iter().any(|&(x, y)| {
                (x - peak.center_x).hypot(y - peak.center_y) < self.min_center_distance
            });
            if crowded {
                continue;
            }

            let Some((radius, support)) = self.estimate_radius(peak.center_x, peak.center_y) else {
                continue;
            };
            let score = (f64::from(support) / (2.0 * PI * radius)).min(1.0);
            if score < self.min_coverage {
                continue;
            }

            self.emitted.push((peak.center_x, peak.center_y));
            return Some(CircleCandidate {
                center_x: peak.center_x,
                center_y: peak.center_y,
                radius_px: radius,
                score,
                votes: peak.votes,
            });
        }
        None
    }
}

/// Accumulator width, height and cell count for an image at cell size
/// `dp`. `None` when `dp` is not a usable cell size or the cell count does
/// not fit in memory addressing.
fn accumulator_shape(width: usize, height: usize, dp: f64) -> Option<(usize, usize, usize)> {
    if !(dp.is_finite() && dp >= 1.0) {
        return None;
    }
    let acc_w = (width as f64 / dp).ceil() as usize;
    let acc_h = (height as f64 / dp).ceil() as usize;
    let cells = acc_w.checked_mul(acc_h)?;
    Some((acc_w, acc_h, cells))
}

/// Unit pixel offset closest to the gradient direction.
fn quantised_direction(dx: f32, dy: f32) -> (isize, isize) {
    let angle = dy.atan2(dx).to_degrees();
    let angle = if angle < 0.0 { angle + 180.0 } else { angle };
    if !(22.5..157.5).contains(&angle) {
        (1, 0)
    } else if angle < 67.5 {
        (1, 1)
    } else if angle < 112.5 {
        (0, 1)
    } else {
        (-1, 1)
    }
}

/// Unique 3×3 maximum: strictly above earlier neighbours in scan order and
/// not below later ones, so a plateau yields a single peak.
fn is_local_max(acc: &[u32], w: usize, h: usize, cx: usize, cy: usize) -> bool {
    let v = acc[cy * w + cx];
    for ny in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
        for nx in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
            if (nx, ny) == (cx, cy) {
                continue;
            }
            let n = acc[ny * w + nx];
            let earlier = (ny, nx) < (cy, cx);
            if n > v || (earlier && n == v) {
                return false;
            }
        }
    }
    true
}

/// Vote-weighted centroid of the 3×3 neighbourhood, in pixel coordinates.
fn refine_center(acc: &[u32], w: usize, h: usize, cx: usize, cy: usize, dp: f64) -> (f64, f64) {
    let mut sum = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for ny in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
        for nx in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
            let v = f64::from(acc[ny * w + nx]);
            sum += v;
            sx += v * nx as f64;
            sy += v * ny as f64;
        }
    }
    let (ax, ay) = (sx / sum, sy / sum);
    ((ax + 0.5) * dp - 0.5, (ay + 0.5) * dp - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bright disc on a dark background, already blurred.
    fn disc_image(w: usize, h: usize, discs: &[(f64, f64, f64)]) -> GrayImage {
        let mut img = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let inside = discs.iter().any(|&(cx, cy, r)| {
                    (x as f64 - cx).hypot(y as f64 - cy) <= r
                });
                img.set(x, y, if inside { 220.0 } else { 30.0 });
            }
        }
        let k = crate::preprocess::gaussian_kernel(9, 2.0);
        convolve_separable(&img, &k, &k)
    }

    fn detector(min_r: u32, max_r: u32) -> CircleDetector {
        CircleDetector::new(DetectorConfig {
            min_radius_px: min_r,
            max_radius_px: max_r,
            min_center_distance_px: 20.0,
            ..DetectorConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn finds_single_disc_center_and_radius() {
        let img = disc_image(160, 120, &[(80.0, 60.0, 30.0)]);
        let found: Vec<_> = detector(15, 60).detect(&img).collect();
        assert!(!found.is_empty(), "disc not detected");
        let best = crate::select::select(found.clone()).unwrap();
        assert!((best.center_x - 80.0).abs() < 2.0, "center_x = {}", best.center_x);
        assert!((best.center_y - 60.0).abs() < 2.0, "center_y = {}", best.center_y);
        assert!((best.radius_px - 30.0).abs() < 2.0, "radius = {}", best.radius_px);
        assert!(best.score > 0.5 && best.score <= 1.0, "score = {}", best.score);
        assert!(best.votes >= 30);
    }

    #[test]
    fn flat_image_yields_nothing() {
        let mut img = GrayImage::new(64, 64);
        for y in 0..64 {
            for x in 0..64 {
                img.set(x, y, 90.0);
            }
        }
        assert_eq!(detector(10, 30).detect(&img).count(), 0);
    }

    #[test]
    fn tiny_image_yields_nothing() {
        let img = GrayImage::new(2, 2);
        assert_eq!(detector(1, 5).detect(&img).count(), 0);
    }

    #[test]
    fn two_separated_discs_are_both_reported() {
        let img = disc_image(200, 100, &[(50.0, 50.0, 25.0), (150.0, 50.0, 35.0)]);
        let found: Vec<_> = detector(15, 45).detect(&img).collect();
        let near = |x: f64, r: f64| {
            found
                .iter()
                .any(|c| (c.center_x - x).abs() < 3.0 && (c.radius_px - r).abs() < 3.0)
        };
        assert!(near(50.0, 25.0), "left disc missing: {found:?}");
        assert!(near(150.0, 35.0), "right disc missing: {found:?}");
    }

    #[test]
    fn disc_outside_radius_range_is_ignored() {
        let img = disc_image(160, 120, &[(80.0, 60.0, 40.0)]);
        let found: Vec<_> = detector(10, 20).detect(&img).collect();
        assert!(
            found.iter().all(|c| (c.radius_px - 40.0).abs() > 5.0),
            "out-of-range radius reported: {found:?}"
        );
    }

    #[test]
    fn emitted_centers_respect_min_distance() {
        let img = disc_image(160, 120, &[(80.0, 60.0, 30.0)]);
        let det = CircleDetector::new(DetectorConfig {
            min_radius_px: 15,
            max_radius_px: 60,
            min_center_distance_px: 100.0,
            ..DetectorConfig::default()
        })
        .unwrap();
        let found: Vec<_> = det.detect(&img).collect();
        for (i, a) in found.iter().enumerate() {
            for b in &found[i + 1..] {
                let d = (a.center_x - b.center_x).hypot(a.center_y - b.center_y);
                assert!(d >= 100.0, "centers {d} px apart");
            }
        }
    }

    #[test]
    fn detection_is_deterministic() {
        let img = disc_image(120, 120, &[(60.0, 60.0, 25.0)]);
        let det = detector(15, 40);
        let a: Vec<_> = det.detect(&img).collect();
        let b: Vec<_> = det.detect(&img).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = DetectorConfig {
            blur_kernel: 4,
            ..DetectorConfig::default()
        };
        assert!(CircleDetector::new(cfg).is_err());
    }

    #[test]
    fn accumulator_shape_is_bounded() {
        assert_eq!(accumulator_shape(640, 480, 1.0), Some((640, 480, 307_200)));
        assert_eq!(accumulator_shape(100, 75, 2.0), Some((50, 38, 1_900)));
        assert_eq!(accumulator_shape(40, 40, 1e-9), None);
        assert_eq!(accumulator_shape(40, 40, f64::INFINITY), None);
        assert_eq!(accumulator_shape(usize::MAX, usize::MAX, 1.0), None);
    }

    #[test]
    fn coarse_accumulator_still_finds_disc() {
        let img = disc_image(160, 120, &[(80.0, 60.0, 30.0)]);
        let det = CircleDetector::new(DetectorConfig {
            min_radius_px: 15,
            max_radius_px: 60,
            accumulator_resolution: 2.0,
            min_votes: 15,
            ..DetectorConfig::default()
        })
        .unwrap();
        let best = crate::select::select(det.detect(&img)).expect("disc detected");
        assert!((best.center_x - 80.0).abs() < 3.0, "center_x = {}", best.center_x);
        assert!((best.center_y - 60.0).abs() < 3.0, "center_y = {}", best.center_y);
        assert!((best.radius_px - 30.0).abs() < 3.0, "radius = {}", best.radius_px);
    }

    fn candidates_over(mut edges: Vec<EdgePoint>) -> Candidates {
        edges.sort_by(|a, b| a.y.total_cmp(&b.y));
        Candidates {
            edges,
            peaks: Vec::new(),
            next_peak: 0,
            emitted: Vec::new(),
            min_radius: 5.0,
            max_radius: 20.0,
            min_center_distance: 0.0,
            min_coverage: 0.0,
        }
    }

    #[test]
    fn radius_estimate_only_looks_near_the_center() {
        let ring: Vec<EdgePoint> = (0..64)
            .map(|k| {
                let a = f64::from(k) * 2.0 * PI / 64.0;
                EdgePoint {
                    x: 50.0 + 10.0 * a.cos(),
                    y: 50.0 + 10.0 * a.sin(),
                    ux: a.cos(),
                    uy: a.sin(),
                }
            })
            .collect();
        let far = (0..500).map(|i| EdgePoint {
            x: 300.0 + f64::from(i % 20),
            y: 300.0 + f64::from(i / 20),
            ux: 1.0,
            uy: 0.0,
        });
        let alone = candidates_over(ring.clone());
        let crowded = candidates_over(ring.into_iter().chain(far).collect());

        assert_eq!(crowded.edges_within(50.0, 50.0, 20.5).count(), 64);
        let (radius, support) = crowded.estimate_radius(50.0, 50.0).expect("ring found");
        assert_eq!(Some((radius, support)), alone.estimate_radius(50.0, 50.0));
        assert!((radius - 10.0).abs() < 0.5, "radius = {radius}");
        assert_eq!(support, 64);
    }

    #[test]
    fn quantised_direction_covers_all_octants() {
        assert_eq!(quantised_direction(1.0, 0.0), (1, 0));
        assert_eq!(quantised_direction(-1.0, 0.0), (1, 0));
        assert_eq!(quantised_direction(1.0, 1.0), (1, 1));
        assert_eq!(quantised_direction(0.0, 1.0), (0, 1));
        assert_eq!(quantised_direction(0.0, -1.0), (0, 1));
        assert_eq!(quantised_direction(-1.0, 1.0), (-1, 1));
    }

    #[test]
    fn plateau_produces_single_local_max() {
        let acc = vec![0, 0, 0, 0, 5, 5, 0, 0, 0];
        let peaks: Vec<_> = (0..3)
            .flat_map(|y| (0..3).map(move |x| (x, y)))
            .filter(|&(x, y)| acc[y * 3 + x] > 0 && is_local_max(&acc, 3, 3, x, y))
            .collect();
        assert_eq!(peaks, vec![(1, 1)]);
    }
}
