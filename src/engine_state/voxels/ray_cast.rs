//! Voxel ray casting for block targeting.
//!
//! A 3D digital differential analyzer: the ray steps from voxel to voxel across whichever
//! cell boundary it reaches first, so every voxel it passes through is visited once.

use cgmath::{InnerSpace, Point3, Vector3};

/// Upper bound on visited voxels, regardless of `max_distance`.
const RAY_MAX_STEPS: usize = 1024;
/// Nudge applied to the origin so rays starting on a cell boundary pick a side.
const RAY_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// First non-empty voxel along the ray.
    pub voxel: Point3<i32>,
    /// The empty voxel visited just before the hit, where a placed block would go.
    pub previous_empty: Option<Point3<i32>>,
    /// Distance travelled to the boundary of the hit voxel.
    pub distance: f32,
}

/// Walks the ray until `is_empty` reports a solid voxel.
///
/// `is_empty` returns `None` for voxels whose chunk is not loaded, which ends the walk
/// without a hit.
pub fn cast_ray<F>(
    origin: Point3<f32>,
    direction: Vector3<f32>,
    max_distance: f32,
    mut is_empty: F,
) -> Option<RayHit>
where
    F: FnMut(Point3<i32>) -> Option<bool>,
{
    if direction.magnitude2() <= 1e-8 || max_distance <= 0.0 {
        return None;
    }
    let direction = direction.normalize();
    let origin = origin + direction * RAY_EPSILON;

    let mut cell = Point3::new(
        origin.x.floor() as i32,
        origin.y.floor() as i32,
        origin.z.floor() as i32,
    );
    let mut step = [0i32; 3];
    let mut t_max = [f32::INFINITY; 3];
    let mut t_delta = [f32::INFINITY; 3];
    for axis in 0..3 {
        let d = direction[axis];
        if d > 1e-8 {
            step[axis] = 1;
            t_max[axis] = (cell[axis] as f32 + 1.0 - origin[axis]) / d;
            t_delta[axis] = 1.0 / d;
        } else if d < -1e-8 {
            step[axis] = -1;
            t_max[axis] = (cell[axis] as f32 - origin[axis]) / d;
            t_delta[axis] = -1.0 / d;
        }
    }

    if !is_empty(cell)? {
        return Some(RayHit {
            voxel: cell,
            previous_empty: None,
            distance: 0.0,
        });
    }

    for _ in 0..RAY_MAX_STEPS {
        let mut axis = 0;
        for candidate in 1..3 {
            if t_max[candidate] < t_max[axis] {
                axis = candidate;
            }
        }
        let distance = t_max[axis];
        if distance > max_distance {
            return None;
        }

        let previous = cell;
        cell[axis] += step[axis];
        t_max[axis] += t_delta[axis];

        if !is_empty(cell)? {
            return Some(RayHit {
                voxel: cell,
                previous_empty: Some(previous),
                distance,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_the_floor_below_the_origin() {
        let hit = cast_ray(
            Point3::new(0.5, 5.5, 0.5),
            Vector3::new(0.0, -1.0, 0.0),
            32.0,
            |point| Some(point.y >= 0),
        )
        .unwrap();
        assert_eq!(hit.voxel, Point3::new(0, -1, 0));
        assert_eq!(hit.previous_empty, Some(Point3::new(0, 0, 0)));
        assert!((hit.distance - 5.5).abs() < 1e-3);
    }

    #[test]
    fn stops_at_max_distance_and_unloaded_chunks() {
        let solid_far_away = |point: Point3<i32>| Some(point.x < 100);
        assert!(cast_ray(
            Point3::new(0.5, 0.5, 0.5),
            Vector3::new(1.0, 0.0, 0.0),
            10.0,
            solid_far_away
        )
        .is_none());

        assert!(cast_ray(
            Point3::new(0.5, 0.5, 0.5),
            Vector3::new(1.0, 1.0, 0.0),
            50.0,
            |point| if point.x > 3 { None } else { Some(true) }
        )
        .is_none());
    }

    #[test]
    fn diagonal_rays_visit_face_adjacent_cells() {
        let mut visited = Vec::new();
        cast_ray(
            Point3::new(0.2, 0.5, 0.5),
            Vector3::new(1.0, 0.3, 0.0),
            4.0,
            |point| {
                visited.push(point);
                Some(true)
            },
        );
        for pair in visited.windows(2) {
            let delta = pair[1] - pair[0];
            assert_eq!(delta.x.abs() + delta.y.abs() + delta.z.abs(), 1);
        }
    }
}
