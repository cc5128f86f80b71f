/// ProDOS date and time stamps

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

/// Packed ProDOS timestamp as stored on disk
///
/// `date` is `year % 100 << 9 | month << 5 | day`, `time` is
/// `hour << 8 | minute`. Raw values are always kept so that unknown or
/// invalid stamps survive a decode/encode cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    /// Packed date word
    pub date: u16,
    /// Packed time word
    pub time: u16,
}

impl Timestamp {
    /// Create a timestamp from its raw words
    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Decode from the 4 on-disk bytes (date LE, time LE)
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            date: u16::from_le_bytes([bytes[0], bytes[1]]),
            time: u16::from_le_bytes([bytes[2], bytes[3]]),
        }
    }

    /// Encode into the 4 on-disk bytes
    pub fn to_bytes(&self) -> [u8; 4] {
        let date = self.date.to_le_bytes();
        let time = self.time.to_le_bytes();
        [date[0], date[1], time[0], time[1]]
    }

    /// Pack a calendar time; seconds are dropped
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        let year = (dt.year().rem_euclid(100)) as u16;
        Self {
            date: (year << 9) | ((dt.month() as u16) << 5) | dt.day() as u16,
            time: ((dt.hour() as u16) << 8) | dt.minute() as u16,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        Self::from_datetime(chrono::Local::now().naive_local())
    }

    /// Whether no timestamp was recorded
    pub fn is_unset(&self) -> bool {
        self.date == 0 && self.time == 0
    }

    /// Unpack into a calendar time; `None` for unset or invalid stamps
    ///
    /// Two-digit years below 40 are taken as 20xx.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        if self.date == 0 {
            return None;
        }
        let yy = i32::from(self.date >> 9);
        let year = if yy < 40 { 2000 + yy } else { 1900 + yy };
        let month = u32::from((self.date >> 5) & 0x0F);
        let day = u32::from(self.date & 0x1F);
        let hour = u32::from((self.time >> 8) & 0xFF);
        let minute = u32::from(self.time & 0xFF);
        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, 0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%d-%b-%y %H:%M")),
            None => f.write_str("<NO DATE>"),
        }
    }
}
