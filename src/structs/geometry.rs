//! # Planar Geometry Structs
//!
//! `Rotation2d`, `Translation2d` and `Pose2d` with their packed layouts.

use bytes::{Buf, BufMut};

use super::{ensure_remaining, StructSchema, TelemetryStruct};
use crate::error::Result;

pub static ROTATION2D_SCHEMA: StructSchema = StructSchema {
    type_name: "Rotation2d",
    schema: "double value",
    size: 8,
    nested: &[],
};

pub static TRANSLATION2D_SCHEMA: StructSchema = StructSchema {
    type_name: "Translation2d",
    schema: "double x;double y",
    size: 16,
    nested: &[],
};

pub static POSE2D_SCHEMA: StructSchema = StructSchema {
    type_name: "Pose2d",
    schema: "Translation2d translation;Rotation2d rotation",
    size: 24,
    nested: &[&TRANSLATION2D_SCHEMA, &ROTATION2D_SCHEMA],
};

/// A planar rotation, stored in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation2d {
    radians: f64,
}

impl Rotation2d {
    pub fn from_radians(radians: f64) -> Self {
        Self { radians }
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self { radians: degrees.to_radians() }
    }

    pub fn radians(&self) -> f64 {
        self.radians
    }

    pub fn degrees(&self) -> f64 {
        self.radians.to_degrees()
    }
}

impl TelemetryStruct for Rotation2d {
    fn schema() -> &'static StructSchema {
        &ROTATION2D_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.radians);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &ROTATION2D_SCHEMA)?;
        Ok(Self::from_radians(buf.get_f64_le()))
    }
}

/// A planar position in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl TelemetryStruct for Translation2d {
    fn schema() -> &'static StructSchema {
        &TRANSLATION2D_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.x);
        buf.put_f64_le(self.y);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &TRANSLATION2D_SCHEMA)?;
        let x = buf.get_f64_le();
        let y = buf.get_f64_le();
        Ok(Self { x, y })
    }
}

/// Robot pose on the field: translation plus heading.
///
/// # Examples
///
/// ```
/// use telemetry_logger::structs::Pose2d;
///
/// let pose = Pose2d::new(13.9732, 3.99347, 0.000575243);
/// assert_eq!(pose.x(), 13.9732);
/// assert_eq!(pose.rotation.radians(), 0.000575243);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose2d {
    pub translation: Translation2d,
    pub rotation: Rotation2d,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, rotation_radians: f64) -> Self {
        Self {
            translation: Translation2d::new(x, y),
            rotation: Rotation2d::from_radians(rotation_radians),
        }
    }

    pub fn x(&self) -> f64 {
        self.translation.x
    }

    pub fn y(&self) -> f64 {
        self.translation.y
    }
}

impl TelemetryStruct for Pose2d {
    fn schema() -> &'static StructSchema {
        &POSE2D_SCHEMA
    }

    fn pack<B: BufMut>(&self, buf: &mut B) {
        self.translation.pack(buf);
        self.rotation.pack(buf);
    }

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self> {
        ensure_remaining(buf.remaining(), &POSE2D_SCHEMA)?;
        let translation = Translation2d::unpack(buf)?;
        let rotation = Rotation2d::unpack(buf)?;
        Ok(Self { translation, rotation })
    }
}
