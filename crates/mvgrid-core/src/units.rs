//! Compile-time unit safety for cable and grid quantities.
//!
//! Prevents mixing incompatible quantities such as a subsection length (km)
//! and a conductor cross-section (mm²), or a nominal voltage and a
//! temperature.
//!
//! All types use `#[repr(transparent)]` so they share the memory layout of
//! `f64` and serialize as plain numbers.
//!
//! ```
//! use mvgrid_core::units::Kilometers;
//!
//! let run: Kilometers = [Kilometers(1.2), Kilometers(3.4)].iter().sum();
//! assert!((run.value() - 4.6).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Macro to implement common arithmetic operations for unit types
macro_rules! impl_unit_ops {
    ($type:ty, $unit_name:literal) => {
        impl Add for $type {
            type Output = Self;
            fn add(self, rhs: Self) -> Self::Output {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $type {
            type Output = Self;
            fn sub(self, rhs: Self) -> Self::Output {
                Self(self.0 - rhs.0)
            }
        }

        impl Neg for $type {
            type Output = Self;
            fn neg(self) -> Self::Output {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $type {
            type Output = Self;
            fn mul(self, rhs: f64) -> Self::Output {
                Self(self.0 * rhs)
            }
        }

        impl Div<f64> for $type {
            type Output = Self;
            fn div(self, rhs: f64) -> Self::Output {
                Self(self.0 / rhs)
            }
        }

        impl Div<$type> for $type {
            type Output = f64;
            fn div(self, rhs: $type) -> Self::Output {
                self.0 / rhs.0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:.3} {}", self.0, $unit_name)
            }
        }

        impl $type {
            /// Create a new value
            #[inline]
            pub const fn new(value: f64) -> Self {
                Self(value)
            }

            /// Get the raw numeric value
            #[inline]
            pub const fn value(self) -> f64 {
                self.0
            }

            /// Check if value is finite
            #[inline]
            pub fn is_finite(self) -> bool {
                self.0.is_finite()
            }
        }

        impl std::iter::Sum for $type {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }

        impl<'a> std::iter::Sum<&'a $type> for $type {
            fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
                Self(iter.map(|x| x.0).sum())
            }
        }
    };
}

/// Route length in kilometres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilometers(pub f64);

impl_unit_ops!(Kilometers, "km");

/// Nominal voltage in kilovolts.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Kilovolts(pub f64);

impl_unit_ops!(Kilovolts, "kV");

/// Conductor cross-section in square millimetres.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SquareMillimeters(pub f64);

impl_unit_ops!(SquareMillimeters, "mm²");

/// Air or soil temperature in degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Celsius(pub f64);

impl_unit_ops!(Celsius, "°C");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kilometer_sum_of_empty_is_zero() {
        let empty: Vec<Kilometers> = Vec::new();
        let total: Kilometers = empty.into_iter().sum();
        assert_eq!(total, Kilometers(0.0));
    }

    #[test]
    fn test_display_uses_unit_suffix() {
        assert_eq!(Kilovolts(20.0).to_string(), "20.000 kV");
        assert_eq!(Kilometers(1.25).to_string(), "1.250 km");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Kilometers(3.4)).unwrap();
        assert_eq!(json, "3.4");
        let back: Celsius = serde_json::from_str("-12.5").unwrap();
        assert_eq!(back, Celsius(-12.5));
    }

    #[test]
    fn test_ratio_of_same_unit() {
        assert!((Kilometers(3.0) / Kilometers(1.5) - 2.0).abs() < 1e-12);
    }
}
