//! Named ventilation commands and their RMI payloads.
//!
//! Commands are sent to the ventilation unit as `CnRmiRequest` messages
//! addressed to node group [`COMMAND_GROUP`].  Each payload is a fixed byte
//! string: `0x84 0x15` sets a schedule entry, `0x85 0x15` clears one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// ComfoNet node group that accepts ventilation commands.
pub const COMMAND_GROUP: u32 = 1;

/// Returned when a command name matches nothing in [`Command::ALL`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

/// Every command the unit understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    FanModeAway,
    FanModeLow,
    FanModeMedium,
    FanModeHigh,
    FanBoost10m,
    FanBoost20m,
    FanBoost30m,
    FanBoostEnd,
    ModeAuto,
    ModeManual,
    VentModeSupply,
    VentModeBalance,
    TempProfileNormal,
    TempProfileCool,
    TempProfileWarm,
    BypassOn,
    BypassOff,
    BypassAuto,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::FanModeAway,
        Command::FanModeLow,
        Command::FanModeMedium,
        Command::FanModeHigh,
        Command::FanBoost10m,
        Command::FanBoost20m,
        Command::FanBoost30m,
        Command::FanBoostEnd,
        Command::ModeAuto,
        Command::ModeManual,
        Command::VentModeSupply,
        Command::VentModeBalance,
        Command::TempProfileNormal,
        Command::TempProfileCool,
        Command::TempProfileWarm,
        Command::BypassOn,
        Command::BypassOff,
        Command::BypassAuto,
    ];

    /// Upper-snake name used by the gateway tooling, e.g. `FAN_MODE_AWAY`.
    pub fn device_name(self) -> &'static str {
        match self {
            Command::FanModeAway => "FAN_MODE_AWAY",
            Command::FanModeLow => "FAN_MODE_LOW",
            Command::FanModeMedium => "FAN_MODE_MEDIUM",
            Command::FanModeHigh => "FAN_MODE_HIGH",
            Command::FanBoost10m => "FAN_BOOST_10M",
            Command::FanBoost20m => "FAN_BOOST_20M",
            Command::FanBoost30m => "FAN_BOOST_30M",
            Command::FanBoostEnd => "FAN_BOOST_END",
            Command::ModeAuto => "MODE_AUTO",
            Command::ModeManual => "MODE_MANUAL",
            Command::VentModeSupply => "VENTMODE_SUPPLY",
            Command::VentModeBalance => "VENTMODE_BALANCE",
            Command::TempProfileNormal => "TEMPPROF_NORMAL",
            Command::TempProfileCool => "TEMPPROF_COOL",
            Command::TempProfileWarm => "TEMPPROF_WARM",
            Command::BypassOn => "BYPASS_ON",
            Command::BypassOff => "BYPASS_OFF",
            Command::BypassAuto => "BYPASS_AUTO",
        }
    }

    /// Consumer-facing name accepted by `send_command`, e.g. `fanModeAway`.
    pub fn name(self) -> &'static str {
        match self {
            Command::FanModeAway => "fanModeAway",
            Command::FanModeLow => "fanModeLow",
            Command::FanModeMedium => "fanModeMedium",
            Command::FanModeHigh => "fanModeHigh",
            Command::FanBoost10m => "fanBoost10m",
            Command::FanBoost20m => "fanBoost20m",
            Command::FanBoost30m => "fanBoost30m",
            Command::FanBoostEnd => "fanBoostEnd",
            Command::ModeAuto => "modeAuto",
            Command::ModeManual => "modeManual",
            Command::VentModeSupply => "ventmodeSupply",
            Command::VentModeBalance => "ventmodeBalance",
            Command::TempProfileNormal => "tempprofNormal",
            Command::TempProfileCool => "tempprofCool",
            Command::TempProfileWarm => "tempprofWarm",
            Command::BypassOn => "bypassOn",
            Command::BypassOff => "bypassOff",
            Command::BypassAuto => "bypassAuto",
        }
    }

    /// RMI bytes sent to the unit.
    pub fn payload(self) -> &'static [u8] {
        match self {
            Command::FanModeAway => &[0x84, 0x15, 0x01, 0x01, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x00],
            Command::FanModeLow => &[0x84, 0x15, 0x01, 0x01, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x01],
            Command::FanModeMedium => &[0x84, 0x15, 0x01, 0x01, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x02],
            Command::FanModeHigh => &[0x84, 0x15, 0x01, 0x01, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x03],
            Command::FanBoost10m => &[0x84, 0x15, 0x01, 0x06, 0, 0, 0, 0, 0x58, 0x02, 0, 0, 0x03],
            Command::FanBoost20m => &[0x84, 0x15, 0x01, 0x06, 0, 0, 0, 0, 0xb0, 0x04, 0, 0, 0x03],
            Command::FanBoost30m => &[0x84, 0x15, 0x01, 0x06, 0, 0, 0, 0, 0x08, 0x07, 0, 0, 0x03],
            Command::FanBoostEnd => &[0x85, 0x15, 0x01, 0x06],
            Command::ModeAuto => &[0x85, 0x15, 0x08, 0x01],
            Command::ModeManual => &[0x84, 0x15, 0x08, 0x01, 0, 0, 0, 0, 0x01, 0, 0, 0, 0x01],
            Command::VentModeSupply => {
                &[0x84, 0x15, 0x06, 0x01, 0, 0, 0, 0, 0x10, 0x0e, 0, 0, 0x01]
            }
            Command::VentModeBalance => &[0x85, 0x15, 0x06, 0x01],
            Command::TempProfileNormal => {
                &[0x84, 0x15, 0x03, 0x01, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0x00]
            }
            Command::TempProfileCool => {
                &[0x84, 0x15, 0x03, 0x01, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0x01]
            }
            Command::TempProfileWarm => {
                &[0x84, 0x15, 0x03, 0x01, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0x02]
            }
            Command::BypassOn => &[0x84, 0x15, 0x02, 0x01, 0, 0, 0, 0, 0x10, 0x0e, 0, 0, 0x01],
            Command::BypassOff => &[0x84, 0x15, 0x02, 0x01, 0, 0, 0, 0, 0x10, 0x0e, 0, 0, 0x02],
            Command::BypassAuto => &[0x85, 0x15, 0x02, 0x01],
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = UnknownCommand;

    /// Exact match on [`Command::name`] or [`Command::device_name`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.name() == s || c.device_name() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
