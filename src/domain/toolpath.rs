// Tool path domain model and progress estimation
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveType {
    /// Coordinates without a motion word
    Move,
    Linear,
    Arc,
}

/// One waypoint of a parsed NC program
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(rename = "line")]
    pub line_number: usize,
    #[serde(rename = "type")]
    pub move_type: MoveType,
}

impl PathPoint {
    fn planar_distance(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PathBounds {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl PathBounds {
    pub fn of(points: &[PathPoint]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        points.iter().skip(1).fold(
            Self {
                x_min: first.x,
                x_max: first.x,
                y_min: first.y,
                y_max: first.y,
                z_min: first.z,
                z_max: first.z,
            },
            |b, p| Self {
                x_min: b.x_min.min(p.x),
                x_max: b.x_max.max(p.x),
                y_min: b.y_min.min(p.y),
                y_max: b.y_max.max(p.y),
                z_min: b.z_min.min(p.z),
                z_max: b.z_max.max(p.z),
            },
        )
    }

    pub fn x_range(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn y_range(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn z_range(&self) -> f64 {
        self.z_max - self.z_min
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathProgress {
    pub nearest_index: usize,
    pub traveled_distance: f64,
    pub remaining_distance: f64,
    pub total_distance: f64,
    pub percent_complete: f64,
}

/// A loaded job path with its remaining-distance table precomputed.
///
/// `remaining[i]` is the planar length from point `i` to the last point, so
/// `remaining[0]` is the total length.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPath {
    points: Vec<PathPoint>,
    remaining: Vec<f64>,
    bounds: PathBounds,
}

impl ToolPath {
    pub fn new(points: Vec<PathPoint>) -> Self {
        let mut remaining = vec![0.0; points.len()];
        for i in (0..points.len().saturating_sub(1)).rev() {
            let segment = points[i].planar_distance(points[i + 1].x, points[i + 1].y);
            remaining[i] = remaining[i + 1] + segment;
        }
        let bounds = PathBounds::of(&points);
        Self {
            points,
            remaining,
            bounds,
        }
    }

    pub fn points(&self) -> &[PathPoint] {
        &self.points
    }

    pub fn bounds(&self) -> PathBounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total_distance(&self) -> f64 {
        self.remaining.first().copied().unwrap_or(0.0)
    }

    /// Index of the point closest to `(x, y)`; the first one wins on ties
    pub fn nearest_index(&self, x: f64, y: f64) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, point) in self.points.iter().enumerate() {
            let distance = point.planar_distance(x, y);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((index, distance)),
            }
        }
        best.map(|(index, _)| index)
    }

    /// Progress of the machine at `(x, y)` along this path; `None` for an
    /// empty path.
    pub fn progress_at(&self, x: f64, y: f64) -> Option<PathProgress> {
        let nearest_index = self.nearest_index(x, y)?;
        let total_distance = self.total_distance();
        let remaining_distance = self.remaining[nearest_index];
        let traveled_distance = total_distance - remaining_distance;
        let percent_complete = if total_distance > 0.0 {
            traveled_distance / total_distance * 100.0
        } else {
            0.0
        };

        Some(PathProgress {
            nearest_index,
            traveled_distance,
            remaining_distance,
            total_distance,
            percent_complete,
        })
    }
}
