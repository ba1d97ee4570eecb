//! Demo compute logic guarded against the failures the healer remediates.

use crate::error::ValidationError;

/// Divide `numerator` by `denominator`, rejecting missing or zero operands.
pub fn compute_ratio(numerator: Option<f64>, denominator: Option<f64>) -> Result<f64, ValidationError> {
    let (Some(numerator), Some(denominator)) = (numerator, denominator) else {
        return Err(ValidationError::MissingOperand);
    };
    if denominator == 0.0 {
        return Err(ValidationError::ZeroDenominator);
    }
    Ok(numerator / denominator)
}
