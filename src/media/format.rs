/// Label for a position in seconds: `m:ss`, or `h:mm:ss` from one hour on.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(42.0), "0:42");
        assert_eq!(format_timestamp(59.99), "0:59");
        assert_eq!(format_timestamp(605.0), "10:05");
        assert_eq!(format_timestamp(3600.0), "1:00:00");
        assert_eq!(format_timestamp(3725.4), "1:02:05");
    }

    #[test]
    fn test_format_timestamp_guards_bad_input() {
        assert_eq!(format_timestamp(-3.0), "0:00");
        assert_eq!(format_timestamp(f64::NAN), "0:00");
        assert_eq!(format_timestamp(f64::INFINITY), "0:00");
    }
}
