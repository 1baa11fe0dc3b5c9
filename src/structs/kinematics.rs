//! # Drivetrain Kinematics Structs
//!
//! Chassis velocity and swerve module state/position.

use bytes::{Buf, BufMut};

use super::geometry::{Rotation2d, ROTATION2D_SCHEMA};
use super::{ensure_remaining, StructSchema, TelemetryStruct};
use crate::error::Result;

pub static CHASSIS_SPEEDS_SCHEMA: StructSchema = StructSchema {
    type_name: "ChassisSpeeds",
    schema: "double vx;double vy;double omega",
    size: 24,
    nested: &[],
};

pub static SWERVE_MODULE_STATE_SCHEMA: StructSchema = StructSchema {
    type_name: "SwerveModuleState",
    schema: "double speed;Rotation2d angle",
    size: 16,
    nested: &[&ROTATION2D_SCHEMA],
};

pub static SWERVE_MODULE_POSITION_SCHEMA: StructSchema = StructSchema {
    type_name: "SwerveModulePosition",
    schema: "double distance;Rotation2d angle",
    size: 16,
    nested: &[&ROTATION2D_SCHEMA],
};

/// Robot-relative chassis velocity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChassisSpeeds {
    /// Forward velocity in m/s
    pub vx: f64,
    /// Sideways velocity in m/s
    pub vy: f64,
    /// Angular velocity in rad/s
    pub omega: f64,
}

impl ChassisSpeeds {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }
}

impl TelemetryStruct for ChassisSpeeds {
    fn schema() -> &'static StructSchema {
        &CHASSIS_SPEEDS_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.vx);
        buf.put_f64_le(self.vy);
        buf.put_f64_le(self.omega);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &CHASSIS_SPEEDS_SCHEMA)?;
        let vx = buf.get_f64_le();
        let vy = buf.get_f64_le();
        let omega = buf.get_f64_le();
        Ok(Self { vx, vy, omega })
    }
}

/// Wheel speed and steering angle of one swerve module.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModuleState {
    /// Wheel speed in m/s
    pub speed: f64,
    pub angle: Rotation2d,
}

impl SwerveModuleState {
    pub fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }
}

impl TelemetryStruct for SwerveModuleState {
    fn schema() -> &'static StructSchema {
        &SWERVE_MODULE_STATE_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.speed);
        self.angle.pack(buf);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &SWERVE_MODULE_STATE_SCHEMA)?;
        let speed = buf.get_f64_le();
        let angle = Rotation2d::unpack(buf)?;
        Ok(Self { speed, angle })
    }
}

/// Distance travelled and steering angle of one swerve module.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SwerveModulePosition {
    /// Distance in meters
    pub distance: f64,
    pub angle: Rotation2d,
}

impl SwerveModulePosition {
    pub fn new(distance: f64, angle: Rotation2d) -> Self {
        Self { distance, angle }
    }
}

impl TelemetryStruct for SwerveModulePosition {
    fn schema() -> &'static StructSchema {
        &SWERVE_MODULE_POSITION_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.distance);
        self.angle.pack(buf);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &SWERVE_MODULE_POSITION_SCHEMA)?;
        let distance = buf.get_f64_le();
        let angle = Rotation2d::unpack(buf)?;
        Ok(Self { distance, angle })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::pack_value;

    #[test]
    fn test_chassis_speeds_layout() {
        let bytes = pack_value(&ChassisSpeeds::new(1.5, -0.25, 3.0));
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..8], &1.5f64.to_le_bytes());
        assert_eq!(&bytes[8..16], &(-0.25f64).to_le_bytes());
        assert_eq!(&bytes[16..24], &3.0f64.to_le_bytes());
    }

    #[test]
    fn test_module_state_nests_rotation() {
        let state = SwerveModuleState::new(2.5, Rotation2d::from_degrees(90.0));
        let bytes = pack_value(&state);
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..8], &2.5f64.to_le_bytes());

        let decoded = SwerveModuleState::unpack(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.speed, 2.5);
        assert!((decoded.angle.degrees() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_module_position_unpack_too_short() {
        let raw = [0u8; 8];
        assert!(SwerveModulePosition::unpack(&mut &raw[..]).is_err());
    }

    #[test]
    fn test_default_module_state_is_zeroed() {
        let bytes = pack_value(&SwerveModuleState::default());
        assert!(bytes.iter().all(|&b| b == 0));
    }
}
