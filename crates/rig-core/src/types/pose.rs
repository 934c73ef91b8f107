//! Pose and world frame definitions

use glam::{Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Pose as written in a URDF `<origin>` element
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub xyz: [f32; 3],
    pub rpy: [f32; 3], // roll, pitch, yaw in radians
}

impl Pose {
    pub fn new(xyz: [f32; 3], rpy: [f32; 3]) -> Self {
        Self { xyz, rpy }
    }

    pub fn from_position(xyz: [f32; 3]) -> Self {
        Self { xyz, rpy: [0.0; 3] }
    }

    /// Rotation as a quaternion (fixed-axis roll, then pitch, then yaw)
    pub fn to_quat(&self) -> Quat {
        rpy_to_quat(self.rpy)
    }

    /// Get position as Vec3
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.xyz)
    }

    pub fn is_identity(&self) -> bool {
        self.xyz == [0.0; 3] && self.rpy == [0.0; 3]
    }
}

impl From<&urdf_rs::Pose> for Pose {
    fn from(urdf_pose: &urdf_rs::Pose) -> Self {
        Self {
            xyz: [
                urdf_pose.xyz.0[0] as f32,
                urdf_pose.xyz.0[1] as f32,
                urdf_pose.xyz.0[2] as f32,
            ],
            rpy: [
                urdf_pose.rpy.0[0] as f32,
                urdf_pose.rpy.0[1] as f32,
                urdf_pose.rpy.0[2] as f32,
            ],
        }
    }
}

/// URDF roll/pitch/yaw to quaternion: `Rz(yaw) * Ry(pitch) * Rx(roll)`
pub fn rpy_to_quat(rpy: [f32; 3]) -> Quat {
    Quat::from_rotation_z(rpy[2]) * Quat::from_rotation_y(rpy[1]) * Quat::from_rotation_x(rpy[0])
}

/// Inverse of [`rpy_to_quat`], returned as `[roll, pitch, yaw]` in radians
pub fn quat_to_rpy(rotation: Quat) -> [f32; 3] {
    let m = Mat3::from_quat(rotation);
    // m = Rz * Ry * Rx, so m[0][2] (row 2, col 0) = -sin(pitch)
    let sin_pitch = (-m.x_axis.z).clamp(-1.0, 1.0);
    let pitch = sin_pitch.asin();
    if sin_pitch.abs() < 0.999_999 {
        let roll = m.y_axis.z.atan2(m.z_axis.z);
        let yaw = m.x_axis.y.atan2(m.x_axis.x);
        [roll, pitch, yaw]
    } else {
        // Gimbal lock: fold everything into yaw
        let yaw = (-m.y_axis.x).atan2(m.y_axis.y);
        [0.0, pitch, yaw]
    }
}

/// Position and rotation in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Frame {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Frame {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Compose a local URDF offset onto this frame.
    ///
    /// The offset translation is divided by `unit_scale` and expressed in this
    /// frame's axes; its rotation is applied after this frame's rotation.
    /// A missing offset leaves the frame unchanged.
    pub fn compose(&self, local: Option<&Pose>, unit_scale: f32) -> Frame {
        match local {
            Some(pose) => Frame {
                position: self.position + self.rotation * (pose.position() / unit_scale),
                rotation: (self.rotation * pose.to_quat()).normalize(),
            },
            None => *self,
        }
    }

    /// Map a point from this frame's local coordinates to world space
    pub fn to_world(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * point
    }
}
