//! Human-readable number formatting.

/// Format bytes per second.
pub fn format_throughput(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.1} GiB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MiB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KiB/s", bytes_per_sec / KB)
    } else {
        format!("{bytes_per_sec:.0} B/s")
    }
}

/// Format operations per second.
pub fn format_ops(ops_per_sec: f64) -> String {
    if ops_per_sec >= 1_000_000.0 {
        format!("{:.1}M ops/s", ops_per_sec / 1_000_000.0)
    } else if ops_per_sec >= 1_000.0 {
        format!("{:.1}k ops/s", ops_per_sec / 1_000.0)
    } else {
        format!("{ops_per_sec:.1} ops/s")
    }
}

/// Format a throughput in the unit of its operation family.
pub fn format_rate(value: f64, metadata: bool) -> String {
    if metadata { format_ops(value) } else { format_throughput(value) }
}

/// Format a latency given in seconds.
pub fn format_latency(secs: f64) -> String {
    if secs >= 1.0 {
        format!("{secs:.2} s")
    } else if secs >= 1e-3 {
        format!("{:.2} ms", secs * 1e3)
    } else if secs >= 1e-6 {
        format!("{:.2} us", secs * 1e6)
    } else {
        format!("{:.0} ns", secs * 1e9)
    }
}

/// Format a byte count with a binary unit.
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else if value.fract() == 0.0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_throughput() {
        assert_eq!(format_throughput(512.0), "512 B/s");
        assert_eq!(format_throughput(2048.0), "2.0 KiB/s");
        assert_eq!(format_throughput(3.5 * 1024.0 * 1024.0), "3.5 MiB/s");
    }

    #[test]
    fn test_format_ops() {
        assert_eq!(format_ops(12.34), "12.3 ops/s");
        assert_eq!(format_ops(4_500.0), "4.5k ops/s");
        assert_eq!(format_ops(2_000_000.0), "2.0M ops/s");
        assert_eq!(format_rate(10.0, true), "10.0 ops/s");
        assert_eq!(format_rate(10.0, false), "10 B/s");
    }

    #[test]
    fn test_format_latency() {
        assert_eq!(format_latency(2.5), "2.50 s");
        assert_eq!(format_latency(0.0125), "12.50 ms");
        assert_eq!(format_latency(0.000_004), "4.00 us");
        assert_eq!(format_latency(0.000_000_5), "500 ns");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(100), "100 B");
        assert_eq!(format_size(4096), "4 KiB");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(1 << 20), "1 MiB");
    }
}
