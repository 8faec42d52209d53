//! Segment file names: `broadcast_<YYYYMMDD_HHMMSS>.mp3`, local time.

use chrono::{DateTime, Local};

const PREFIX: &str = "broadcast_";
const EXTENSION: &str = ".mp3";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Hands out segment names, suffixing `_<n>` when several segments start
/// within the same second so a process never reuses a name.
#[derive(Debug, Default)]
pub struct SegmentNamer {
    last_stamp: Option<String>,
    repeats: u32,
}

impl SegmentNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&mut self, at: DateTime<Local>) -> String {
        let stamp = at.format(STAMP_FORMAT).to_string();

        if self.last_stamp.as_deref() == Some(stamp.as_str()) {
            self.repeats += 1;
            format!("{}{}_{}{}", PREFIX, stamp, self.repeats, EXTENSION)
        } else {
            self.repeats = 0;
            let name = format!("{}{}{}", PREFIX, stamp, EXTENSION);
            self.last_stamp = Some(stamp);
            name
        }
    }
}

/// `broadcast_x.mp3` with `n = 2` becomes `broadcast_x_2.mp3`.
pub fn with_suffix(file_name: &str, n: u32) -> String {
    match file_name.strip_suffix(EXTENSION) {
        Some(stem) => format!("{}_{}{}", stem, n, EXTENSION),
        None => format!("{}_{}", file_name, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, h, m, s).single().unwrap()
    }

    #[test]
    fn test_name_format() {
        let mut namer = SegmentNamer::new();
        assert_eq!(namer.next_name(at(7, 5, 3)), "broadcast_20240309_070503.mp3");
    }

    #[test]
    fn test_same_second_gets_suffix() {
        let mut namer = SegmentNamer::new();
        assert_eq!(namer.next_name(at(12, 0, 0)), "broadcast_20240309_120000.mp3");
        assert_eq!(namer.next_name(at(12, 0, 0)), "broadcast_20240309_120000_1.mp3");
        assert_eq!(namer.next_name(at(12, 0, 0)), "broadcast_20240309_120000_2.mp3");
    }

    #[test]
    fn test_new_second_resets_suffix() {
        let mut namer = SegmentNamer::new();
        namer.next_name(at(12, 0, 0));
        namer.next_name(at(12, 0, 0));
        assert_eq!(namer.next_name(at(12, 0, 1)), "broadcast_20240309_120001.mp3");
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix("broadcast_20240309_120000.mp3", 2),
            "broadcast_20240309_120000_2.mp3"
        );
        assert_eq!(with_suffix("raw", 1), "raw_1");
    }
}
