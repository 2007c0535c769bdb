use nalgebra::Vector3;

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Round every component to 3 decimals and convert to a plain array
pub fn round3(v: &Vector3<f64>) -> [f64; 3] {
    [round_to(v.x, 3), round_to(v.y, 3), round_to(v.z, 3)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-0.0004, 3), -0.0);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_round3() {
        let v = Vector3::new(1.00049, 2.0, -3.12345);
        assert_eq!(round3(&v), [1.0, 2.0, -3.123]);
    }
}
