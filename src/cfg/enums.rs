// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Data collection level enumeration
///
/// Controls which record kinds the SDK may produce. `Off` restricts the
/// beacon to session-start records, `Performance` adds timing data
/// (actions, web requests), `UserBehavior` enables everything including
/// user identification and reported values.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataCollectionLevel {
    #[serde(rename = "Off", alias = "off", alias = "OFF", alias = "0")]
    Off,
    #[serde(
        rename = "Performance",
        alias = "performance",
        alias = "PERFORMANCE",
        alias = "1"
    )]
    Performance,
    #[serde(
        rename = "UserBehavior",
        alias = "userBehavior",
        alias = "user_behavior",
        alias = "2"
    )]
    UserBehavior,
}

impl fmt::Display for DataCollectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataCollectionLevel::Off => "Off",
            DataCollectionLevel::Performance => "Performance",
            DataCollectionLevel::UserBehavior => "UserBehavior",
        })
    }
}

impl DataCollectionLevel {
    /// Numeric value sent in the beacon basic data (`dl` key).
    pub fn as_beacon_value(self) -> i32 {
        match self {
            DataCollectionLevel::Off => 0,
            DataCollectionLevel::Performance => 1,
            DataCollectionLevel::UserBehavior => 2,
        }
    }

    /// Actions, session-end and web requests need at least `Performance`.
    pub fn allows_timing_data(self) -> bool {
        self >= DataCollectionLevel::Performance
    }

    /// Events, values, errors and user tags need `UserBehavior`.
    pub fn allows_user_data(self) -> bool {
        self == DataCollectionLevel::UserBehavior
    }
}

/// Crash reporting level enumeration
///
/// Independent of the data collection level; crashes are only recorded
/// when the user opted in.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashReportingLevel {
    #[serde(rename = "Off", alias = "off", alias = "OFF", alias = "0")]
    Off,
    #[serde(
        rename = "OptOutCrashes",
        alias = "optOutCrashes",
        alias = "opt_out_crashes",
        alias = "1"
    )]
    OptOutCrashes,
    #[serde(
        rename = "OptInCrashes",
        alias = "optInCrashes",
        alias = "opt_in_crashes",
        alias = "2"
    )]
    OptInCrashes,
}

impl fmt::Display for CrashReportingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrashReportingLevel::Off => "Off",
            CrashReportingLevel::OptOutCrashes => "OptOutCrashes",
            CrashReportingLevel::OptInCrashes => "OptInCrashes",
        })
    }
}

impl CrashReportingLevel {
    /// Numeric value sent in the beacon basic data (`cl` key).
    pub fn as_beacon_value(self) -> i32 {
        match self {
            CrashReportingLevel::Off => 0,
            CrashReportingLevel::OptOutCrashes => 1,
            CrashReportingLevel::OptInCrashes => 2,
        }
    }

    pub fn allows_crash_reporting(self) -> bool {
        matches!(self, CrashReportingLevel::OptInCrashes)
    }
}
