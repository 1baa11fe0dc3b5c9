//! # Struct Codec Module
//!
//! Fixed-layout binary definitions for the small numeric aggregates that
//! travel as structured payloads.
//!
//! This module handles:
//! - Schema descriptors (type name, field layout, packed size, nested types)
//! - Little-endian pack/unpack per type via [`TelemetryStruct`]
//! - The closed set of struct payloads ([`StructValue`], [`StructValues`])
//!
//! Layouts match the WPILib struct convention, so a packed `Pose2d` is
//! `x`, `y`, `rotation` as three little-endian `f64`s.

pub mod geometry;
pub mod kinematics;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TelemetryError};

pub use geometry::{Pose2d, Rotation2d, Translation2d};
pub use kinematics::{ChassisSpeeds, SwerveModulePosition, SwerveModuleState};

/// Describes the packed layout of one struct type.
#[derive(Debug, PartialEq, Eq)]
pub struct StructSchema {
    /// Type name, e.g. `Pose2d`
    pub type_name: &'static str,
    /// Field declarations, e.g. `Translation2d translation;Rotation2d rotation`
    pub schema: &'static str,
    /// Packed size in bytes
    pub size: usize,
    /// Struct types referenced by `schema`
    pub nested: &'static [&'static StructSchema],
}

impl StructSchema {
    /// Writer type tag for a single value, e.g. `struct:Pose2d`
    pub fn type_tag(&self) -> String {
        format!("struct:{}", self.type_name)
    }

    /// Writer type tag for an array of values, e.g. `struct:Pose2d[]`
    pub fn array_type_tag(&self) -> String {
        format!("struct:{}[]", self.type_name)
    }

    /// This schema followed by every schema it depends on, dependencies first.
    pub fn with_dependencies(&'static self) -> Vec<&'static StructSchema> {
        let mut ordered = Vec::new();
        self.collect_dependencies(&mut ordered);
        ordered
    }

    fn collect_dependencies(&'static self, ordered: &mut Vec<&'static StructSchema>) {
        for nested in self.nested {
            nested.collect_dependencies(ordered);
        }
        if !ordered.iter().any(|s| s.type_name == self.type_name) {
            ordered.push(self);
        }
    }
}

/// Pack/unpack adapter implemented by every struct payload type.
pub trait TelemetryStruct: Sized {
    fn schema() -> &'static StructSchema;

    fn pack<B: BufMut>(&self, buf: &mut B);

    fn unpack<B: Buf>(buf: &mut B) -> Result<Self>;
}

/// Fails with a codec error if fewer than `schema.size` bytes remain.
pub(crate) fn ensure_remaining(remaining: usize, schema: &StructSchema) -> Result<()> {
    if remaining < schema.size {
        return Err(TelemetryError::StructCodec(format!(
            "{} needs {} bytes, {} remaining",
            schema.type_name,
            schema.size,
            remaining
        )));
    }
    Ok(())
}

/// Pack one value into a fresh buffer.
pub fn pack_value<T: TelemetryStruct>(value: &T) -> Bytes {
    let mut buf = BytesMut::with_capacity(T::schema().size);
    value.pack(&mut buf);
    buf.freeze()
}

/// Pack a slice of values back to back.
pub fn pack_slice<T: TelemetryStruct>(values: &[T]) -> Bytes {
    let mut buf = BytesMut::with_capacity(T::schema().size * values.len());
    for value in values {
        value.pack(&mut buf);
    }
    buf.freeze()
}

/// Unpack as many whole values as `bytes` holds.
///
/// # Errors
///
/// Returns [`TelemetryError::StructCodec`] if the length is not a multiple of
/// the packed size.
pub fn unpack_slice<T: TelemetryStruct>(mut bytes: &[u8]) -> Result<Vec<T>> {
    let size = T::schema().size;
    if bytes.len() % size != 0 {
        return Err(TelemetryError::StructCodec(format!(
            "{} bytes is not a whole number of {} ({} bytes each)",
            bytes.len(),
            T::schema().type_name,
            size
        )));
    }
    let mut values = Vec::with_capacity(bytes.len() / size);
    while bytes.has_remaining() {
        values.push(T::unpack(&mut bytes)?);
    }
    Ok(values)
}

/// A single structured payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StructValue {
    Rotation2d(Rotation2d),
    Translation2d(Translation2d),
    Pose2d(Pose2d),
    ChassisSpeeds(ChassisSpeeds),
    SwerveModuleState(SwerveModuleState),
    SwerveModulePosition(SwerveModulePosition),
}

impl StructValue {
    pub fn schema(&self) -> &'static StructSchema {
        match self {
            StructValue::Rotation2d(_) => Rotation2d::schema(),
            StructValue::Translation2d(_) => Translation2d::schema(),
            StructValue::Pose2d(_) => Pose2d::schema(),
            StructValue::ChassisSpeeds(_) => ChassisSpeeds::schema(),
            StructValue::SwerveModuleState(_) => SwerveModuleState::schema(),
            StructValue::SwerveModulePosition(_) => SwerveModulePosition::schema(),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            StructValue::Rotation2d(v) => pack_value(v),
            StructValue::Translation2d(v) => pack_value(v),
            StructValue::Pose2d(v) => pack_value(v),
            StructValue::ChassisSpeeds(v) => pack_value(v),
            StructValue::SwerveModuleState(v) => pack_value(v),
            StructValue::SwerveModulePosition(v) => pack_value(v),
        }
    }

    /// Decode a packed value of the named type.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::StructCodec`] for an unknown type name or a
    /// short buffer.
    pub fn decode(type_name: &str, mut bytes: &[u8]) -> Result<Self> {
        let value = match type_name {
            "Rotation2d" => StructValue::Rotation2d(Rotation2d::unpack(&mut bytes)?),
            "Translation2d" => StructValue::Translation2d(Translation2d::unpack(&mut bytes)?),
            "Pose2d" => StructValue::Pose2d(Pose2d::unpack(&mut bytes)?),
            "ChassisSpeeds" => StructValue::ChassisSpeeds(ChassisSpeeds::unpack(&mut bytes)?),
            "SwerveModuleState" => {
                StructValue::SwerveModuleState(SwerveModuleState::unpack(&mut bytes)?)
            }
            "SwerveModulePosition" => {
                StructValue::SwerveModulePosition(SwerveModulePosition::unpack(&mut bytes)?)
            }
            other => {
                return Err(TelemetryError::StructCodec(format!("unknown struct type: {}", other)))
            }
        };
        Ok(value)
    }
}

/// A homogeneous array of structured payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum StructValues {
    Pose2d(Vec<Pose2d>),
    ChassisSpeeds(Vec<ChassisSpeeds>),
    SwerveModuleStates(Vec<SwerveModuleState>),
    SwerveModulePositions(Vec<SwerveModulePosition>),
}

impl StructValues {
    /// Schema of one element.
    pub fn schema(&self) -> &'static StructSchema {
        match self {
            StructValues::Pose2d(_) => Pose2d::schema(),
            StructValues::ChassisSpeeds(_) => ChassisSpeeds::schema(),
            StructValues::SwerveModuleStates(_) => SwerveModuleState::schema(),
            StructValues::SwerveModulePositions(_) => SwerveModulePosition::schema(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StructValues::Pose2d(v) => v.len(),
            StructValues::ChassisSpeeds(v) => v.len(),
            StructValues::SwerveModuleStates(v) => v.len(),
            StructValues::SwerveModulePositions(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Bytes {
        match self {
            StructValues::Pose2d(v) => pack_slice(v),
            StructValues::ChassisSpeeds(v) => pack_slice(v),
            StructValues::SwerveModuleStates(v) => pack_slice(v),
            StructValues::SwerveModulePositions(v) => pack_slice(v),
        }
    }
}
