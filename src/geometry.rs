//! Document boundary detection and perspective rectification.
//!
//! Finds the largest 4-cornered outline in a photograph and warps the
//! enclosed quadrilateral into an axis-aligned rectangle. Pure functions
//! over pixel grids; nothing here touches the network.

use image::{imageops, GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::edges::canny;
use imageproc::filter::separable_filter_equal;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use tracing::debug;

use crate::error::PipelineError;

/// Binomial weights of the 5-tap Gaussian, applied along both axes.
const BLUR_KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];
const CANNY_LOW: f32 = 75.0;
const CANNY_HIGH: f32 = 200.0;
/// Only the largest contours are considered as document candidates.
const CANDIDATE_CONTOURS: usize = 5;
/// Polygon approximation tolerance as a fraction of the contour perimeter.
const APPROX_EPSILON_RATIO: f32 = 0.02;

/// A 2D point with floating-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

fn distance(a: &Point, b: &Point) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Four document corners in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentContour {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl DocumentContour {
    /// Build a contour from exactly four points; any other count is a failed detection.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let corners: [Point; 4] = points.try_into().ok()?;
        Some(canonicalize(corners))
    }

    /// Corners as `[top-left, top-right, bottom-right, bottom-left]`.
    pub fn points(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Output size of the rectified image: the longer of each pair of
    /// opposing edges, truncated to whole pixels.
    pub fn target_size(&self) -> (u32, u32) {
        let width_bottom = distance(&self.bottom_left, &self.bottom_right) as u32;
        let width_top = distance(&self.top_left, &self.top_right) as u32;
        let height_right = distance(&self.top_right, &self.bottom_right) as u32;
        let height_left = distance(&self.top_left, &self.bottom_left) as u32;
        (width_bottom.max(width_top), height_right.max(height_left))
    }
}

/// Order four points by the sum/difference heuristic.
///
/// Smallest `x + y` is top-left, largest is bottom-right; smallest `y - x`
/// is top-right, largest is bottom-left. Ties resolve to the earliest point.
pub fn canonicalize(points: [Point; 4]) -> DocumentContour {
    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;
    DocumentContour {
        top_left: first_extreme(&points, sum, false),
        top_right: first_extreme(&points, diff, false),
        bottom_right: first_extreme(&points, sum, true),
        bottom_left: first_extreme(&points, diff, true),
    }
}

fn first_extreme(points: &[Point; 4], key: impl Fn(&Point) -> f32, largest: bool) -> Point {
    let mut best = points[0];
    let mut best_key = key(&best);
    for p in &points[1..] {
        let k = key(p);
        if (largest && k > best_key) || (!largest && k < best_key) {
            best = *p;
            best_key = k;
        }
    }
    best
}

/// Locate the document outline in a photograph.
///
/// Grayscale, blur, Canny edges, outer contours; the five largest by area
/// are approximated to polygons and the first with four vertices wins.
pub fn find_document_boundary(image: &RgbImage) -> Option<DocumentContour> {
    let gray = imageops::grayscale(image);
    let blurred = blur_5x5(&gray);
    let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);

    let mut contours: Vec<(f32, Vec<Point>)> = find_contours::<i32>(&edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer))
        .map(|c| {
            let points: Vec<Point> = c
                .points
                .iter()
                .map(|p| Point::new(p.x as f32, p.y as f32))
                .collect();
            (polygon_area(&points), points)
        })
        .collect();

    contours.sort_by(|(a, _), (b, _)| b.total_cmp(a));

    for (_, contour) in contours.iter().take(CANDIDATE_CONTOURS) {
        let epsilon = APPROX_EPSILON_RATIO * arc_length(contour);
        let approx = approximate_polygon(contour, epsilon);
        debug!(
            "Contour with {} points approximated to {} vertices",
            contour.len(),
            approx.len()
        );
        if approx.len() == 4 {
            return DocumentContour::from_points(&approx);
        }
    }

    None
}

fn blur_5x5(gray: &GrayImage) -> GrayImage {
    separable_filter_equal(gray, &BLUR_KERNEL)
}

/// Warp the quadrilateral under `contour` into a flat rectangle.
pub fn rectify(image: &RgbImage, contour: &DocumentContour) -> Result<RgbImage, PipelineError> {
    let (width, height) = contour.target_size();
    if width < 2 || height < 2 {
        return Err(PipelineError::DegenerateContour(format!(
            "target size {}x{}",
            width, height
        )));
    }

    let right = (width - 1) as f32;
    let bottom = (height - 1) as f32;
    let from = contour.points().map(|p| (p.x, p.y));
    let to = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];

    let projection = Projection::from_control_points(from, to).ok_or_else(|| {
        PipelineError::DegenerateContour("perspective transform has no solution".to_string())
    })?;

    let mut out = RgbImage::new(width, height);
    warp_into(
        image,
        &projection,
        Interpolation::Bilinear,
        Rgb([0, 0, 0]),
        &mut out,
    );
    Ok(out)
}

/// Detect and rectify in one step.
pub fn scan_document(image: &RgbImage) -> Result<RgbImage, PipelineError> {
    let contour = find_document_boundary(image).ok_or(PipelineError::Detection)?;
    debug!("Document contour: {:?}", contour);
    rectify(image, &contour)
}

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x * q.y - q.x * p.y;
    }
    (twice_area / 2.0).abs()
}

/// Perimeter of a closed polygon.
fn arc_length(points: &[Point]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| distance(a, b))
        .sum()
}

/// Douglas-Peucker simplification of a closed polygon.
///
/// The ring is split at the point farthest from the first point and each
/// half is simplified as an open chain.
fn approximate_polygon(points: &[Point], epsilon: f32) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let start = points[0];
    let mut split = 0;
    let mut max_dist = 0.0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let d = distance(&start, p);
        if d > max_dist {
            max_dist = d;
            split = i;
        }
    }
    if split == 0 {
        return vec![start];
    }

    let mut closing: Vec<Point> = points[split..].to_vec();
    closing.push(start);

    let mut result = Vec::new();
    simplify_chain(&points[..=split], epsilon, &mut result);
    simplify_chain(&closing, epsilon, &mut result);
    result
}

/// Push the kept vertices of an open chain, excluding its last point.
fn simplify_chain(chain: &[Point], epsilon: f32, out: &mut Vec<Point>) {
    let first = chain[0];
    let last = chain[chain.len() - 1];

    let mut max_dist = 0.0;
    let mut index = 0;
    for (i, p) in chain.iter().enumerate().take(chain.len() - 1).skip(1) {
        let d = point_to_segment_distance(p, &first, &last);
        if d > max_dist {
            max_dist = d;
            index = i;
        }
    }

    if max_dist > epsilon {
        simplify_chain(&chain[..=index], epsilon, out);
        simplify_chain(&chain[index..], epsilon, out);
    } else {
        out.push(first);
    }
}

fn point_to_segment_distance(p: &Point, a: &Point, b: &Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return distance(p, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    distance(p, &Point::new(a.x + t * dx, a.y + t * dy))
}
