//! Reading and printing byte sizes.
//!
//! Cache budgets appear in two places: in the config, where humans write them ("2k",
//! "64m"), and in log lines, where humans read them back. Both directions live here so
//! that a budget always round-trips through the same units.

/// Renders a byte count in the largest binary unit which keeps the number readable.
///
/// Counts below one KiB are printed exactly; everything above is shown with three
/// significant digits.
///
/// # Examples
///
/// ```
/// assert_eq!(callisto::fmt::format_size(0), "0 bytes");
/// assert_eq!(callisto::fmt::format_size(1), "1 byte");
/// assert_eq!(callisto::fmt::format_size(512), "512 bytes");
/// assert_eq!(callisto::fmt::format_size(2048), "2.00 KiB");
/// assert_eq!(callisto::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(callisto::fmt::format_size(3 * 1024 * 1024 * 1024), "3.00 GiB");
/// ```
pub fn format_size(bytes: usize) -> String {
    if bytes == 1 {
        return "1 byte".to_owned();
    }
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = "KiB";
    for next in ["KiB", "MiB", "GiB", "TiB", "PiB"] {
        value /= 1024.;
        unit = next;
        if value < 1024. {
            break;
        }
    }

    if value < 10. {
        format!("{:.2} {}", value, unit)
    } else if value < 100. {
        format!("{:.1} {}", value, unit)
    } else {
        format!("{:.0} {}", value, unit)
    }
}

/// Parses a human readable byte size as used for the cache budgets in the config.
///
/// A plain number is taken as bytes. The suffixes `k`, `m`, `g` and `t` (either case,
/// whitespace before them is fine) scale by powers of 1024, and a trailing `b` is accepted
/// as an explicit "bytes" marker. Fractions, negative values and unknown suffixes are
/// rejected.
///
/// # Examples
///
/// ```
/// assert_eq!(callisto::fmt::parse_size("2048").unwrap(), 2048);
/// assert_eq!(callisto::fmt::parse_size("2k").unwrap(), 2048);
/// assert_eq!(callisto::fmt::parse_size("2 K").unwrap(), 2048);
/// assert_eq!(callisto::fmt::parse_size("64m").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(callisto::fmt::parse_size("1g").unwrap(), 1024 * 1024 * 1024);
/// assert_eq!(callisto::fmt::parse_size("100b").unwrap(), 100);
///
/// assert_eq!(callisto::fmt::parse_size("3x").is_err(), true);
/// assert_eq!(callisto::fmt::parse_size("1.5g").is_err(), true);
/// assert_eq!(callisto::fmt::parse_size("-1k").is_err(), true);
/// assert_eq!(callisto::fmt::parse_size("k").is_err(), true);
/// ```
pub fn parse_size(input: impl AsRef<str>) -> anyhow::Result<usize> {
    let input = input.as_ref();
    let trimmed = input.trim();

    // Split the leading digits from whatever follows them.
    let digits_end = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(digits_end);

    let number = number.parse::<usize>().map_err(|_| {
        anyhow::anyhow!("'{}' does not start with a positive number of bytes.", input)
    })?;

    let multiplier = match suffix.trim_start() {
        "" | "b" | "B" => 1,
        "k" | "K" => 1 << 10,
        "m" | "M" => 1 << 20,
        "g" | "G" => 1 << 30,
        "t" | "T" => 1usize << 40,
        other => {
            return Err(anyhow::anyhow!(
                "'{}' is not a known size suffix. Use 'b', 'k', 'm', 'g' or 't'.",
                other
            ));
        }
    };

    Ok(number * multiplier)
}

#[cfg(test)]
mod tests {
    use super::{format_size, parse_size};

    #[test]
    fn suffixes_scale_by_powers_of_1024() {
        assert_eq!(parse_size("2k").unwrap(), 2048);
        assert_eq!(parse_size("64m").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_size("2t").unwrap(), 2 * 1024 * 1024 * 1024 * 1024);
    }

    #[test]
    fn formatting_picks_the_unit_a_human_would() {
        assert_eq!(format_size(1023), "1023 bytes");
        assert_eq!(format_size(1024), "1.00 KiB");
        assert_eq!(format_size(500 * 1024 * 1024), "500 MiB");
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert_eq!(parse_size("  8 k  ").unwrap(), 8192);
        assert_eq!(parse_size(" 100 ").unwrap(), 100);
    }

    #[test]
    fn garbage_is_rejected_with_a_helpful_message() {
        assert_eq!(parse_size("").is_err(), true);
        assert_eq!(parse_size("lots").is_err(), true);
        assert_eq!(parse_size("12 kb").is_err(), true);
    }
}
