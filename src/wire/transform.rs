//! Fixed-point field transforms
//!
//! Integer fields often carry a scaled floating value, e.g. a position in
//! hundredths. A [`Transform`] is an ordered chain of operations. Reading
//! applies them in declared order; writing applies each inverse in reverse
//! declared order and converts back to the field's integer type.

use crate::core::error::TransformError;
use crate::wire::value::{FieldType, FieldValue};

/// One step of a transform chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformOp {
    /// Divide on read, multiply on write
    Divide(f64),
    /// Remainder on read and on write
    Modulo(f64),
}

/// Ordered transform chain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    ops: Vec<TransformOp>,
}

impl Transform {
    /// Empty chain (identity)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a divide step
    pub fn divide(mut self, divisor: f64) -> Self {
        self.ops.push(TransformOp::Divide(divisor));
        self
    }

    /// Append a modulo step
    pub fn modulo(mut self, modulus: f64) -> Self {
        self.ops.push(TransformOp::Modulo(modulus));
        self
    }

    /// Operations in declared order
    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// Wire value to scaled float
    pub fn read(&self, value: &FieldValue) -> Result<f64, TransformError> {
        let mut x = value
            .to_f64()
            .ok_or_else(|| TransformError::NotNumeric(value.field_type().to_string()))?;

        for op in &self.ops {
            x = match *op {
                TransformOp::Divide(d) => {
                    check_operand(d)?;
                    x / d
                }
                TransformOp::Modulo(m) => {
                    check_operand(m)?;
                    x % m
                }
            };
        }
        Ok(x)
    }

    /// Scaled float back to a wire value of type `target`.
    ///
    /// Integer targets are rounded to nearest; values outside the target's
    /// range are rejected.
    pub fn write(&self, value: f64, target: &FieldType) -> Result<FieldValue, TransformError> {
        let mut x = value;

        for op in self.ops.iter().rev() {
            x = match *op {
                TransformOp::Divide(d) => {
                    check_operand(d)?;
                    x * d
                }
                TransformOp::Modulo(m) => {
                    check_operand(m)?;
                    x % m
                }
            };
        }

        if let FieldType::Float64 = target {
            return Ok(FieldValue::Float64(x));
        }
        if !target.is_integer() {
            return Err(TransformError::NotNumeric(target.to_string()));
        }

        let rounded = x.round();
        let out_of_range = || TransformError::OutOfRange {
            value: x,
            target: target.to_string(),
        };

        macro_rules! convert {
            ($ty:ty, $variant:ident) => {{
                if !rounded.is_finite() || rounded < <$ty>::MIN as f64 || rounded > <$ty>::MAX as f64 {
                    return Err(out_of_range());
                }
                FieldValue::$variant(rounded as $ty)
            }};
        }

        let converted = match target {
            FieldType::UInt8 => convert!(u8, UInt8),
            FieldType::UInt16 => convert!(u16, UInt16),
            FieldType::UInt32 => convert!(u32, UInt32),
            FieldType::UInt64 => convert!(u64, UInt64),
            FieldType::Int8 => convert!(i8, Int8),
            FieldType::Int16 => convert!(i16, Int16),
            FieldType::Int32 => convert!(i32, Int32),
            FieldType::Int64 => convert!(i64, Int64),
            _ => return Err(TransformError::NotNumeric(target.to_string())),
        };
        Ok(converted)
    }
}

fn check_operand(operand: f64) -> Result<(), TransformError> {
    if operand == 0.0 {
        return Err(TransformError::ZeroOperand);
    }
    Ok(())
}
