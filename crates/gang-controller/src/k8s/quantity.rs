//! Kubernetes resource quantity arithmetic.
//!
//! The API server hands quantities around as strings ("500m", "2Gi", "1").
//! Aggregating a group's resource floor needs them added and scaled, so they
//! are normalized into milli-units here and formatted back on the way out.

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::k8s::types::KubernetesError;

/// A resource quantity held in milli-units (1 unit == 1000 millis), the same
/// granularity the platform uses for CPU. Milli-units keep "100m" + "0.9"
/// exact without carrying a decimal type around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct MilliQuantity(i128);

impl MilliQuantity {
    /// Parse a quantity string, supporting plain and decimal numbers, the
    /// milli suffix "m", decimal suffixes "k"/"M"/"G"/"T"/"P"/"E" and binary
    /// suffixes "Ki"/"Mi"/"Gi"/"Ti"/"Pi"/"Ei".
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::QuantityParseError`] if the value format or the
    ///   unit suffix is invalid
    pub(crate) fn parse(value: &str) -> Result<Self, Report<KubernetesError>> {
        let value = value.trim();

        // Find the numeric part and unit part
        let (numeric_part, unit) = match value.find(|c: char| c.is_alphabetic()) {
            Some(pos) => (&value[..pos], &value[pos..]),
            None => (value, ""),
        };

        let numeric_value: f64 =
            numeric_part
                .parse::<f64>()
                .change_context(KubernetesError::QuantityParseError {
                    message: format!("Invalid numeric part in quantity: {value}"),
                })?;

        let millis_per_unit: f64 = match unit {
            "" => 1e3,
            "m" => 1.0,
            "k" => 1e6,
            "M" => 1e9,
            "G" => 1e12,
            "T" => 1e15,
            "P" => 1e18,
            "E" => 1e21,
            "Ki" => 1024.0 * 1e3,
            "Mi" => 1024.0 * 1024.0 * 1e3,
            "Gi" => 1024.0 * 1024.0 * 1024.0 * 1e3,
            "Ti" => 1024f64.powi(4) * 1e3,
            "Pi" => 1024f64.powi(5) * 1e3,
            "Ei" => 1024f64.powi(6) * 1e3,
            _ => {
                return Err(Report::new(KubernetesError::QuantityParseError {
                    message: format!("Unsupported quantity unit: {unit}"),
                }));
            }
        };

        Ok(Self((numeric_value * millis_per_unit).round() as i128))
    }

    pub(crate) fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub(crate) fn scale(self, factor: i32) -> Self {
        Self(self.0.saturating_mul(i128::from(factor)))
    }

    /// Format back into the platform's string form: bare integers for whole
    /// units, the "m" suffix otherwise. Only "m"-suffixed or decimal inputs
    /// produce fractions, so round-tripping is lossless.
    pub(crate) fn to_quantity(self) -> Quantity {
        if self.0 % 1000 == 0 {
            Quantity((self.0 / 1000).to_string())
        } else {
            Quantity(format!("{}m", self.0))
        }
    }
}
