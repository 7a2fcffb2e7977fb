//! # Camera State
//!
//! Tracks where the host's camera is and reports what changed between frames, which is
//! all the active region needs from it.
//!
//! ## Core Components
//! - `CameraState`: position and orientation of the camera
//! - `CameraModifiedFlags`: what changed since the last update

use cgmath::{Angle, InnerSpace, Point3, Rad, Vector3};

use super::grid::{ChunkCoordinate, ChunkDimensions};

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = std::f32::consts::FRAC_PI_2 - 0.0001;

/// What changed about the camera since the previous frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraModifiedFlags {
    pub position: bool,
    pub look_direction: bool,
    /// Recompute the active set even if the camera stayed in the same chunk
    pub force_refresh: bool,
}

impl CameraModifiedFlags {
    pub const NONE: Self = Self {
        position: false,
        look_direction: false,
        force_refresh: false,
    };

    pub const FORCE_REFRESH: Self = Self {
        position: false,
        look_direction: false,
        force_refresh: true,
    };

    pub fn any(&self) -> bool {
        self.position || self.look_direction || self.force_refresh
    }
}

/// The camera's position and orientation.
///
/// # Fields
/// - `position`: world-space position in voxels
/// - `yaw`: horizontal rotation (around the Y axis)
/// - `pitch`: vertical rotation (around the X axis), clamped short of straight up/down
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraState {
    pub position: Point3<f32>,
    pub yaw: Rad<f32>,
    pub pitch: Rad<f32>,
}

impl CameraState {
    pub fn new<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(position: Point3<f32>, yaw: Y, pitch: P) -> Self {
        let mut camera = Self {
            position,
            yaw: yaw.into(),
            pitch: Rad(0.0),
        };
        camera.pitch = clamp_pitch(pitch.into());
        camera
    }

    /// Moves the camera.
    ///
    /// # Returns
    /// Flags with `position` set if the position actually changed
    pub fn move_to(&mut self, position: Point3<f32>) -> CameraModifiedFlags {
        let changed = self.position != position;
        self.position = position;
        CameraModifiedFlags {
            position: changed,
            ..CameraModifiedFlags::NONE
        }
    }

    /// Turns the camera.
    ///
    /// # Returns
    /// Flags with `look_direction` set if the orientation actually changed
    pub fn look<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(&mut self, yaw: Y, pitch: P) -> CameraModifiedFlags {
        let yaw = yaw.into();
        let pitch = clamp_pitch(pitch.into());
        let changed = self.yaw != yaw || self.pitch != pitch;
        self.yaw = yaw;
        self.pitch = pitch;
        CameraModifiedFlags {
            look_direction: changed,
            ..CameraModifiedFlags::NONE
        }
    }

    /// Unit vector the camera looks along.
    pub fn look_direction(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    pub fn chunk_coordinate(&self, dimensions: ChunkDimensions) -> ChunkCoordinate {
        ChunkCoordinate::containing_position(self.position, dimensions)
    }
}

fn clamp_pitch(pitch: Rad<f32>) -> Rad<f32> {
    Rad(pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Deg;

    #[test]
    fn flags_report_only_real_changes() {
        let mut camera = CameraState::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
        assert!(!camera.move_to(Point3::new(0.0, 0.0, 0.0)).any());
        assert!(camera.move_to(Point3::new(1.0, 0.0, 0.0)).position);
        assert!(!camera.look(Deg(0.0), Deg(0.0)).any());
        assert!(camera.look(Deg(90.0), Deg(0.0)).look_direction);
    }

    #[test]
    fn pitch_is_clamped() {
        let camera = CameraState::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(120.0));
        assert!(camera.pitch.0 < std::f32::consts::FRAC_PI_2);
        assert!(camera.look_direction().y > 0.99);
    }

    #[test]
    fn negative_positions_fall_in_negative_chunks() {
        let camera = CameraState::new(Point3::new(-0.5, 17.0, 3.0), Deg(0.0), Deg(0.0));
        assert_eq!(
            camera.chunk_coordinate(ChunkDimensions::cube(16)),
            ChunkCoordinate::new(-1, 1, 0)
        );
    }
}
