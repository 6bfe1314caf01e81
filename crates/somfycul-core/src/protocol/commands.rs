//! Somfy RTS commands
//!
//! Defines the RTS control codes and the CUL `Ys` send command that carries them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CulError;

/// CUL command prefix for a Somfy RTS frame
const SOMFY_SEND_PREFIX: &str = "Ys";

/// Encryption key byte; the CUL firmware expects `A1` for RTS frames
const ENCRYPTION_KEY: &str = "A1";

/// Checksum placeholder, filled in by the CUL firmware
const CHECKSUM_PLACEHOLDER: &str = "0";

/// Build the CUL wire string for one RTS frame.
///
/// The arguments are concatenated as given; the caller owns the format of
/// the action key, rolling code and address.
pub fn encode(action: &str, rolling_code: &str, address: &str) -> String {
    let mut out = String::with_capacity(
        SOMFY_SEND_PREFIX.len()
            + ENCRYPTION_KEY.len()
            + action.len()
            + CHECKSUM_PLACEHOLDER.len()
            + rolling_code.len()
            + address.len(),
    );
    out.push_str(SOMFY_SEND_PREFIX);
    out.push_str(ENCRYPTION_KEY);
    out.push_str(action);
    out.push_str(CHECKSUM_PLACEHOLDER);
    out.push_str(rolling_code);
    out.push_str(address);
    out
}

/// RTS control codes understood by Somfy receivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SomfyCommand {
    /// Stop, or move to the "my" position when idle
    My,
    /// Open / raise
    Up,
    /// "my" and up pressed together
    MyUp,
    /// Close / lower
    Down,
    /// "my" and down pressed together
    MyDown,
    /// Up and down pressed together
    UpDown,
    /// Pair with (or unpair from) a receiver
    Prog,
    /// Sun sensor on
    SunFlag,
    /// Sun sensor off
    Flag,
}

impl SomfyCommand {
    /// Every command, in control-code order
    pub const ALL: [SomfyCommand; 9] = [
        SomfyCommand::My,
        SomfyCommand::Up,
        SomfyCommand::MyUp,
        SomfyCommand::Down,
        SomfyCommand::MyDown,
        SomfyCommand::UpDown,
        SomfyCommand::Prog,
        SomfyCommand::SunFlag,
        SomfyCommand::Flag,
    ];

    /// Get the single hex digit sent as the action key
    pub fn action_key(&self) -> char {
        match self {
            SomfyCommand::My => '1',
            SomfyCommand::Up => '2',
            SomfyCommand::MyUp => '3',
            SomfyCommand::Down => '4',
            SomfyCommand::MyDown => '5',
            SomfyCommand::UpDown => '6',
            SomfyCommand::Prog => '8',
            SomfyCommand::SunFlag => '9',
            SomfyCommand::Flag => 'A',
        }
    }

    /// Upper-case name, as accepted by `FromStr` and used by serde
    pub fn name(&self) -> &'static str {
        match self {
            SomfyCommand::My => "MY",
            SomfyCommand::Up => "UP",
            SomfyCommand::MyUp => "MY_UP",
            SomfyCommand::Down => "DOWN",
            SomfyCommand::MyDown => "MY_DOWN",
            SomfyCommand::UpDown => "UP_DOWN",
            SomfyCommand::Prog => "PROG",
            SomfyCommand::SunFlag => "SUN_FLAG",
            SomfyCommand::Flag => "FLAG",
        }
    }
}

impl fmt::Display for SomfyCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SomfyCommand {
    type Err = CulError;

    /// Accepts the command name in any case, with `-` or `_` separators
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        SomfyCommand::ALL
            .into_iter()
            .find(|cmd| cmd.name() == normalized)
            .ok_or_else(|| CulError::UnknownCommand(s.to_string()))
    }
}

/// One RTS frame addressed to a single actuator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CulCommand {
    /// What the actuator should do
    pub action: SomfyCommand,
    /// Caller-managed anti-replay counter, as hex digits
    pub rolling_code: String,
    /// Target actuator address, as hex digits
    pub address: String,
}

impl CulCommand {
    /// Create a command for one actuator
    pub fn new(
        action: SomfyCommand,
        rolling_code: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            action,
            rolling_code: rolling_code.into(),
            address: address.into(),
        }
    }

    /// Encode to the CUL wire string (without line terminator)
    pub fn encode(&self) -> String {
        let mut key = [0u8; 4];
        encode(
            self.action.action_key().encode_utf8(&mut key),
            &self.rolling_code,
            &self.address,
        )
    }

    /// Convert to bytes, appending newline for transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.encode().into_bytes();
        bytes.push(b'\n');
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_concatenates_fields() {
        assert_eq!(encode("1", "0myRolling", "myAddr"), "YsA1100myRollingmyAddr");
        assert_eq!(encode("1", "00myRolling", "myAddr"), "YsA11000myRollingmyAddr");
        assert_eq!(encode("2", "0A1B", "123456"), "YsA1200A1B123456");
    }

    #[test]
    fn test_encode_does_not_touch_content() {
        // Anything goes; validation is the caller's job.
        assert_eq!(encode("xy", " z ", "\t"), "YsA1xy0 z \t");
        assert_eq!(encode("", "", ""), "YsA10");
    }

    #[test]
    fn test_action_keys() {
        assert_eq!(SomfyCommand::My.action_key(), '1');
        assert_eq!(SomfyCommand::Up.action_key(), '2');
        assert_eq!(SomfyCommand::Down.action_key(), '4');
        assert_eq!(SomfyCommand::Prog.action_key(), '8');
        assert_eq!(SomfyCommand::Flag.action_key(), 'A');
    }

    #[test]
    fn test_command_from_str() {
        assert_eq!("up".parse::<SomfyCommand>().unwrap(), SomfyCommand::Up);
        assert_eq!("My-Down".parse::<SomfyCommand>().unwrap(), SomfyCommand::MyDown);
        assert_eq!(" SUN_FLAG ".parse::<SomfyCommand>().unwrap(), SomfyCommand::SunFlag);
        assert!(matches!(
            "sideways".parse::<SomfyCommand>(),
            Err(CulError::UnknownCommand(s)) if s == "sideways"
        ));
    }

    #[test]
    fn test_command_serde_names() {
        let json = serde_json::to_string(&SomfyCommand::MyUp).unwrap();
        assert_eq!(json, "\"MY_UP\"");
        let back: SomfyCommand = serde_json::from_str("\"DOWN\"").unwrap();
        assert_eq!(back, SomfyCommand::Down);
    }

    #[test]
    fn test_cul_command_to_bytes() {
        let cmd = CulCommand::new(SomfyCommand::Down, "0012", "ABCDEF");
        assert_eq!(cmd.encode(), "YsA1400012ABCDEF");
        assert_eq!(cmd.to_bytes(), b"YsA1400012ABCDEF\n".to_vec());
    }
}
