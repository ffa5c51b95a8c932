const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Renders nanoseconds as seconds with three decimals and grouped thousands, `1,234.500s`.
pub fn unit_time(nanos: u64) -> String {
    format!("{}s", group_thousands(&format!("{:.3}", nanos as f64 / NANOS_PER_SEC)))
}

/// Renders a byte count with a decimal unit: `G`, `M` and `K` with two decimals, plain `B`
/// otherwise.
pub fn unit_size(bytes: u64) -> String {
    let (divisor, unit) = match bytes {
        b if b > 1_000_000_000 => (1_000_000_000.0, "G"),
        b if b > 1_000_000 => (1_000_000.0, "M"),
        b if b > 1_000 => (1_000.0, "K"),
        b => return format!("{b}B"),
    };

    format!(
        "{}{unit}",
        group_thousands(&format!("{:.2}", bytes as f64 / divisor))
    )
}

fn group_thousands(number: &str) -> String {
    let (integer, fraction) = match number.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (number, None),
    };

    let mut grouped = String::with_capacity(number.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if let Some(fraction) = fraction {
        grouped.push('.');
        grouped.push_str(fraction);
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_time() {
        assert_eq!(unit_time(1_500_000_000), "1.500s");
        assert_eq!(unit_time(0), "0.000s");
        assert_eq!(unit_time(12_345), "0.000s");
        assert_eq!(unit_time(3_723_000_000_000), "3,723.000s");
    }

    #[test]
    fn formats_size() {
        assert_eq!(unit_size(2_500_000), "2.50M");
        assert_eq!(unit_size(999), "999B");
        assert_eq!(unit_size(1_000), "1000B");
        assert_eq!(unit_size(1_536), "1.54K");
        assert_eq!(unit_size(3_000_000_001), "3.00G");
        assert_eq!(unit_size(2_500_000_000_000), "2,500.00G");
    }
}
