//! Human readable formatting of byte counts, speeds, ratios and durations.
//!
//! These strings show up verbatim in the UI columns, the RPC statistics log
//! line and the web pages, so their exact shape is part of the contract.

use chrono::{Local, TimeZone};

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const TIB: f64 = 1024.0 * 1024.0 * 1024.0 * 1024.0;

/// Format a byte count with one decimal, e.g. `109.6 KiB`.
pub fn fsize(bytes: u64) -> String {
    fsize_with(bytes, 1, false)
}

/// Format a byte count using KiB/MiB/GiB/TiB (or K/M/G/T when `shortform`).
///
/// Values below 1 KiB are printed as an integer count of bytes.
pub fn fsize_with(bytes: u64, precision: usize, shortform: bool) -> String {
    let b = bytes as f64;
    let (value, long, short) = if b >= TIB {
        (b / TIB, "TiB", "T")
    } else if b >= GIB {
        (b / GIB, "GiB", "G")
    } else if b >= MIB {
        (b / MIB, "MiB", "M")
    } else if b >= KIB {
        (b / KIB, "KiB", "K")
    } else {
        return format!("{} B", bytes);
    };
    let unit = if shortform { short } else { long };
    format!("{:.*} {}", precision, value, unit)
}

/// Format a ratio in `[0.0, 1.0]` as a percentage with two decimals.
pub fn fpcnt(ratio: f64) -> String {
    fpcnt_with(ratio, 2)
}

/// Percentage formatting; 0% and 100% never carry decimals.
pub fn fpcnt_with(ratio: f64, precision: usize) -> String {
    let pcnt = ratio * 100.0;
    let precision = if pcnt == 0.0 || pcnt == 100.0 { 0 } else { precision };
    format!("{:.*}%", precision, pcnt)
}

/// Format a transfer speed in bytes per second, e.g. `42.1 KiB/s`.
pub fn fspeed(bps: f64) -> String {
    fspeed_with(bps, 1, false)
}

pub fn fspeed_with(bps: f64, precision: usize, shortform: bool) -> String {
    let (value, long, short) = if bps < MIB {
        (bps / KIB, "KiB/s", "K/s")
    } else if bps < GIB {
        (bps / MIB, "MiB/s", "M/s")
    } else if bps < TIB {
        (bps / GIB, "GiB/s", "G/s")
    } else {
        (bps / TIB, "TiB/s", "T/s")
    };
    let unit = if shortform { short } else { long };
    format!("{:.*} {}", precision, value, unit)
}

/// `num (total)`, or just `num` when the total is unknown (negative).
pub fn fpeer(num_peers: i64, total_peers: i64) -> String {
    if total_peers > -1 {
        format!("{} ({})", num_peers, total_peers)
    } else {
        format!("{}", num_peers)
    }
}

/// Two most significant units of a duration: `1m 40s`, `6h 23m`, `1y 46w`.
///
/// Zero seconds yields an empty string so ETA cells stay blank.
pub fn ftime(secs: u64) -> String {
    match secs {
        0 => String::new(),
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m {}s", s / 60, s % 60),
        s if s < 86_400 => format!("{}h {}m", s / 3_600, s / 60 % 60),
        s if s < 604_800 => format!("{}d {}h", s / 86_400, s / 3_600 % 24),
        s if s < 31_449_600 => format!("{}w {}d", s / 604_800, s / 86_400 % 7),
        s => format!("{}y {}w", s / 31_449_600, s / 604_800 % 52),
    }
}

/// Local date/time for a Unix timestamp; empty for negative input.
pub fn fdate(seconds: f64, date_only: bool, precision_secs: bool) -> String {
    if seconds < 0.0 {
        return String::new();
    }
    let secs = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    let Some(dt) = Local.timestamp_opt(secs, nanos).single() else {
        return String::new();
    };
    let fmt = match (date_only, precision_secs) {
        (true, _) => "%x",
        (false, true) => "%x %X",
        (false, false) => "%x %H:%M",
    };
    dt.format(fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsize() {
        assert_eq!(fsize(0), "0 B");
        assert_eq!(fsize(100), "100 B");
        assert_eq!(fsize(1023), "1023 B");
        assert_eq!(fsize(1024), "1.0 KiB");
        assert_eq!(fsize(1048575), "1024.0 KiB");
        assert_eq!(fsize(1048576), "1.0 MiB");
        assert_eq!(fsize(1073741823), "1024.0 MiB");
        assert_eq!(fsize(1073741824), "1.0 GiB");
        assert_eq!(fsize(112245), "109.6 KiB");
        assert_eq!(fsize(110723441824), "103.1 GiB");
        assert_eq!(fsize(1099511627775), "1024.0 GiB");
        assert_eq!(fsize(1099511627777), "1.0 TiB");
        assert_eq!(fsize(766148267453245), "696.8 TiB");
    }

    #[test]
    fn test_fsize_precision_and_shortform() {
        assert_eq!(fsize_with(112245, 0, false), "110 KiB");
        assert_eq!(fsize_with(1048576, 1, true), "1.0 M");
        assert_eq!(fsize_with(512, 2, true), "512 B");
    }

    #[test]
    fn test_fpcnt() {
        assert_eq!(fpcnt(0.9311), "93.11%");
        assert_eq!(fpcnt_with(0.9311, 0), "93%");
        assert_eq!(fpcnt(0.0), "0%");
        assert_eq!(fpcnt(1.0), "100%");
    }

    #[test]
    fn test_fspeed() {
        assert_eq!(fspeed(43134.0), "42.1 KiB/s");
        assert_eq!(fspeed(0.0), "0.0 KiB/s");
        assert_eq!(fspeed_with(2.0 * MIB, 1, true), "2.0 M/s");
        assert_eq!(fspeed(3.0 * GIB), "3.0 GiB/s");
    }

    #[test]
    fn test_fpeer() {
        assert_eq!(fpeer(10, 20), "10 (20)");
        assert_eq!(fpeer(10, -1), "10");
    }

    #[test]
    fn test_ftime() {
        assert_eq!(ftime(0), "");
        assert_eq!(ftime(5), "5s");
        assert_eq!(ftime(100), "1m 40s");
        assert_eq!(ftime(3789), "1h 3m");
        assert_eq!(ftime(23011), "6h 23m");
        assert_eq!(ftime(391187), "4d 12h");
        assert_eq!(ftime(604800), "1w 0d");
        assert_eq!(ftime(13893086), "22w 6d");
        assert_eq!(ftime(59740269), "1y 46w");
    }

    #[test]
    fn test_fdate() {
        assert_eq!(fdate(-1.0, false, false), "");
        assert!(!fdate(0.0, false, false).is_empty());
        let date_only = fdate(86_400.0 * 365.0, true, false);
        assert!(!date_only.contains(':'));
    }
}
