// Copyright 2025 The Flows Engine Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use float_cmp::approx_eq;

use crate::value::Point;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterpolationMethod {
    #[default]
    Step,
    Linear,
    Cubic,
    Nearest,
}

impl InterpolationMethod {
    pub fn parse(name: &str) -> Option<InterpolationMethod> {
        let method = match name {
            "step" => InterpolationMethod::Step,
            "linear" => InterpolationMethod::Linear,
            "cubic" => InterpolationMethod::Cubic,
            "nearest" => InterpolationMethod::Nearest,
            _ => return None,
        };
        Some(method)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InterpolationMethod::Step => "step",
            InterpolationMethod::Linear => "linear",
            InterpolationMethod::Cubic => "cubic",
            InterpolationMethod::Nearest => "nearest",
        }
    }
}

/// Evaluates the point table at `x`.  `points` must be non-empty and
/// sorted ascending by x (the compiler guarantees both).
pub fn interpolate(points: &[Point], method: InterpolationMethod, x: f64) -> f64 {
    debug_assert!(!points.is_empty());

    if x.is_nan() {
        return f64::NAN;
    }

    match method {
        InterpolationMethod::Step => step(points, x),
        InterpolationMethod::Linear => linear(points, x),
        InterpolationMethod::Cubic => cubic(points, x),
        InterpolationMethod::Nearest => nearest(points, x),
    }
}

/// Index of the last point with `x_i <= x`, or `None` when x precedes
/// the table.
fn segment_start(points: &[Point], x: f64) -> Option<usize> {
    if x < points[0].x {
        return None;
    }
    let mut low = 0;
    let mut high = points.len();
    while low + 1 < high {
        let mid = low + (high - low) / 2;
        if points[mid].x <= x {
            low = mid;
        } else {
            high = mid;
        }
    }
    Some(low)
}

fn step(points: &[Point], x: f64) -> f64 {
    match segment_start(points, x) {
        None => points[0].y,
        Some(i) => points[i].y,
    }
}

fn linear(points: &[Point], x: f64) -> f64 {
    let n = points.len();
    let i = match segment_start(points, x) {
        None => return points[0].y,
        Some(i) => i,
    };
    if i + 1 >= n {
        return points[n - 1].y;
    }
    let (p0, p1) = (points[i], points[i + 1]);
    if approx_eq!(f64, p0.x, p1.x) {
        return p0.y;
    }
    let t = (x - p0.x) / (p1.x - p0.x);
    p0.y + t * (p1.y - p0.y)
}

fn nearest(points: &[Point], x: f64) -> f64 {
    let mut best = points[0];
    let mut best_distance = (x - best.x).abs();
    for point in &points[1..] {
        let distance = (x - point.x).abs();
        // strictly-less keeps the first point on ties
        if distance < best_distance {
            best = *point;
            best_distance = distance;
        }
    }
    best.y
}

fn cubic(points: &[Point], x: f64) -> f64 {
    let n = points.len();
    if n < 3 {
        return linear(points, x);
    }
    // clamp outside the table
    if x <= points[0].x {
        return points[0].y;
    }
    if x >= points[n - 1].x {
        return points[n - 1].y;
    }

    let i = match segment_start(points, x) {
        Some(i) => i.min(n - 2),
        None => 0,
    };
    let p1 = points[i];
    let p2 = points[i + 1];
    // phantom control points reflect the boundary tangent
    let y0 = if i == 0 {
        2.0 * p1.y - p2.y
    } else {
        points[i - 1].y
    };
    let y3 = if i + 2 >= n {
        2.0 * p2.y - p1.y
    } else {
        points[i + 2].y
    };

    if approx_eq!(f64, p1.x, p2.x) {
        return p1.y;
    }
    let t = (x - p1.x) / (p2.x - p1.x);
    let t2 = t * t;
    let t3 = t2 * t;

    // Catmull-Rom basis
    0.5 * ((2.0 * p1.y)
        + (-y0 + p2.y) * t
        + (2.0 * y0 - 5.0 * p1.y + 4.0 * p2.y - y3) * t2
        + (-y0 + 3.0 * p1.y - 3.0 * p2.y + y3) * t3)
}
