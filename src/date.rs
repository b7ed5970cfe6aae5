// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::consts::{AMIGA_EPOCH_OFFSET, SECONDS_PER_DAY, SECONDS_PER_MINUTE, TICKS_PER_SECOND};

/// An AmigaDOS timestamp: days since 1 Jan 1978, minutes within the day,
/// ticks (1/50 s) within the minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AmigaDate {
    pub days: u32,
    pub mins: u32,
    pub ticks: u32,
}

impl AmigaDate {
    pub fn new(days: u32, mins: u32, ticks: u32) -> Self {
        Self { days, mins, ticks }
    }

    /// Current time, clamped to the Amiga epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self::from_unix(secs)
    }

    /// Unix seconds for this timestamp. Sub-second ticks are truncated.
    pub fn to_unix(self) -> i64 {
        self.days as i64 * SECONDS_PER_DAY
            + self.mins as i64 * SECONDS_PER_MINUTE
            + (self.ticks / TICKS_PER_SECOND) as i64
            + AMIGA_EPOCH_OFFSET
    }

    /// Decompose Unix seconds into an Amiga timestamp. Times before the
    /// Amiga epoch collapse to it.
    pub fn from_unix(secs: i64) -> Self {
        let rel = (secs - AMIGA_EPOCH_OFFSET).max(0);
        let days = rel / SECONDS_PER_DAY;
        let rem = rel % SECONDS_PER_DAY;
        let mins = rem / SECONDS_PER_MINUTE;
        let ticks = (rem % SECONDS_PER_MINUTE) as u32 * TICKS_PER_SECOND;
        Self {
            days: days as u32,
            mins: mins as u32,
            ticks,
        }
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.to_unix().max(0) as u64)
    }
}
