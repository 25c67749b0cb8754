//! Upper horizon envelopes in a sector's projection plane
//!
//! Every source point contributes a horizon line: anything past its horizon
//! point and below the line through both is hidden from that source. A
//! region is hidden only if it is hidden from all of its points, so the
//! occluded area of a patch is below the pointwise minimum of the lines and
//! past the furthest horizon point. That minimum is concave, which keeps a
//! chord between two of its points below it: dropping points is
//! conservative.
//!
//! Stored envelopes are `max_occ_pts` fixed-point `[s, z]` pairs
//! ([`FIXED_SCALE`] per cell), `s` non-decreasing, the last point repeated
//! into unused slots. An envelope with no occluded area starts at `i32::MAX`.

/// Fixed-point steps per cell
pub const FIXED_SCALE: f64 = 16.0;

/// Stored form of an envelope that hides nothing
pub const EMPTY_POINT: [i32; 2] = [i32::MAX, i32::MIN];

/// `z = intercept + slope * s`, hiding only for `s >= start`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HorizonLine {
    pub intercept: f64,
    pub slope: f64,
    pub start: f64,
}

impl HorizonLine {
    /// Line through source `(s0, z0)` and horizon point `(s1, z1)`; `None`
    /// when the horizon does not lie ahead of the source
    pub fn through(s0: f64, z0: f64, s1: f64, z1: f64) -> Option<Self> {
        let run = s1 - s0;
        if !(run > 1e-9) {
            return None;
        }
        let slope = (z1 - z0) / run;
        Some(Self {
            intercept: z0 - slope * s0,
            slope,
            start: s1,
        })
    }

    #[inline]
    pub fn at(&self, s: f64) -> f64 {
        self.intercept + self.slope * s
    }
}

/// Breakpoints of the minimum of `lines` over `[max start, max start + extent]`
pub fn lower_envelope(lines: &[HorizonLine], extent: f64) -> Vec<(f64, f64)> {
    let Some(start) = lines.iter().map(|l| l.start).reduce(f64::max) else {
        return Vec::new();
    };
    let end = start + extent.max(0.0);

    let lowest_at = |s: f64| {
        lines
            .iter()
            .copied()
            .min_by(|a, b| a.at(s).total_cmp(&b.at(s)).then(a.slope.total_cmp(&b.slope)))
    };
    let Some(mut current) = lowest_at(start) else {
        return Vec::new();
    };

    let mut points = vec![(start, current.at(start))];
    let mut s = start;
    loop {
        // the next line to take over has a smaller slope and crosses first
        let next = lines
            .iter()
            .filter(|l| l.slope < current.slope)
            .map(|l| ((l.intercept - current.intercept) / (current.slope - l.slope), *l))
            .filter(|(x, _)| *x > s + 1e-12)
            .min_by(|(xa, a), (xb, b)| xa.total_cmp(xb).then(a.slope.total_cmp(&b.slope)));

        match next {
            Some((x, line)) if x < end => {
                points.push((x, current.at(x)));
                current = line;
                s = x;
            }
            _ => break,
        }
    }
    points.push((end, current.at(end)));
    points
}

/// Value of a polyline at `s`, `None` outside its domain
pub fn evaluate(points: &[(f64, f64)], s: f64) -> Option<f64> {
    let first = points.first()?;
    let last = points.last()?;
    if s < first.0 || s > last.0 {
        return None;
    }

    let mut best: Option<f64> = None;
    for w in points.windows(2) {
        let ((s0, z0), (s1, z1)) = (w[0], w[1]);
        if s < s0 || s > s1 {
            continue;
        }
        let z = if s1 - s0 <= 0.0 {
            z0.min(z1)
        } else {
            z0 + (z1 - z0) * (s - s0) / (s1 - s0)
        };
        best = Some(best.map_or(z, |b| b.min(z)));
    }
    best.or(Some(first.1))
}

/// Pointwise minimum of two polylines over the intersection of their domains
pub fn min_polylines(a: &[(f64, f64)], b: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let (Some(a0), Some(a1), Some(b0), Some(b1)) = (a.first(), a.last(), b.first(), b.last()) else {
        return Vec::new();
    };
    let lo = a0.0.max(b0.0);
    let hi = a1.0.min(b1.0);
    if lo > hi {
        return Vec::new();
    }

    let mut xs: Vec<f64> = a
        .iter()
        .chain(b.iter())
        .map(|p| p.0)
        .filter(|s| *s > lo && *s < hi)
        .chain([lo, hi])
        .collect();
    xs.sort_by(f64::total_cmp);
    xs.dedup();

    let value = |poly: &[(f64, f64)], s: f64| evaluate(poly, s).unwrap_or(f64::NEG_INFINITY);
    let mut out = Vec::with_capacity(xs.len() * 2);
    for (i, &x) in xs.iter().enumerate() {
        if i > 0 {
            let px = xs[i - 1];
            let d0 = value(a, px) - value(b, px);
            let d1 = value(a, x) - value(b, x);
            if d0 * d1 < 0.0 {
                let t = d0 / (d0 - d1);
                let cx = px + t * (x - px);
                out.push((cx, value(a, cx).min(value(b, cx))));
            }
        }
        out.push((x, value(a, x).min(value(b, x))));
    }
    out
}

/// Drop interior points that lie on the segment joining their neighbours
pub fn simplify(points: &mut Vec<(f64, f64)>) {
    if points.len() < 3 {
        return;
    }
    let mut kept: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for (i, &p) in points.iter().enumerate() {
        if i + 1 < points.len() {
            if let Some(&prev) = kept.last() {
                let next = points[i + 1];
                let cross = (p.0 - prev.0) * (next.1 - prev.1) - (p.1 - prev.1) * (next.0 - prev.0);
                let scale = (next.0 - prev.0).abs().max(1.0) * (next.1 - prev.1).abs().max(1.0);
                if cross.abs() <= 1e-9 * scale {
                    continue;
                }
            }
        }
        kept.push(p);
    }
    *points = kept;
}

/// Cap to `max_points`: keep the first `max_points - 1` and the last
pub fn compress(points: &mut Vec<(f64, f64)>, max_points: usize) {
    if points.len() <= max_points || max_points < 2 {
        return;
    }
    let last = points[points.len() - 1];
    points.truncate(max_points - 1);
    points.push(last);
}

/// Write a polyline into its fixed-point slots
pub fn store(points: &[(f64, f64)], out: &mut [[i32; 2]]) {
    let Some(&last) = points.last() else {
        out.fill(EMPTY_POINT);
        return;
    };
    let fixed = |(s, z): (f64, f64)| {
        [
            (s * FIXED_SCALE).round() as i32,
            (z * FIXED_SCALE).floor() as i32,
        ]
    };
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = fixed(points.get(i).copied().unwrap_or(last));
    }
}

/// Read stored slots back, dropping the padding repeats
pub fn load(stored: &[[i32; 2]]) -> Vec<(f64, f64)> {
    match stored.first() {
        None => return Vec::new(),
        Some(p) if *p == EMPTY_POINT => return Vec::new(),
        _ => {}
    }
    let mut points: Vec<(f64, f64)> = stored
        .iter()
        .map(|p| (p[0] as f64 / FIXED_SCALE, p[1] as f64 / FIXED_SCALE))
        .collect();
    points.dedup();
    points
}

/// Is `(s, z)` (cell units) inside the occluded area of a stored envelope?
pub fn hides(stored: &[[i32; 2]], s: f64, z: f64) -> bool {
    let (Some(first), Some(last)) = (stored.first(), stored.last()) else {
        return false;
    };
    if *first == EMPTY_POINT {
        return false;
    }

    let s = s * FIXED_SCALE;
    if s < first[0] as f64 || s > last[0] as f64 {
        return false;
    }
    for w in stored.windows(2) {
        let (s0, s1) = (w[0][0] as f64, w[1][0] as f64);
        if s >= s0 && s <= s1 {
            let (z0, z1) = (w[0][1] as f64, w[1][1] as f64);
            let limit = if s1 > s0 { z0 + (z1 - z0) * (s - s0) / (s1 - s0) } else { z0.min(z1) };
            return z * FIXED_SCALE < limit;
        }
    }
    // single distinct point
    s == first[0] as f64 && z * FIXED_SCALE < first[1] as f64
}
