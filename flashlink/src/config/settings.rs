use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing and retry bounds of all sequences.
///
/// Every field has a default, so a settings file only has to mention the
/// values it changes. Durations are given in milliseconds:
///
/// ```yaml
/// halt:
///   poll_limit: 20000
/// mailbox:
///   settle_delay: 50
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Bounds of the halt sequence.
    pub halt: HaltConfig,
    /// Bounds and delays of the debug mailbox handshake.
    pub mailbox: MailboxConfig,
    /// Bounds used while running the flash algorithm.
    pub flash: FlashConfig,
}

impl Settings {
    /// Reads settings from YAML.
    pub fn from_yaml_reader<R: std::io::Read>(reader: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(reader)
    }

    /// Reads settings from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Bounds of the halt sequence used to enter programming mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HaltConfig {
    /// How often enabling debug is attempted before giving up. A reset
    /// pulse is issued between two attempts.
    pub enable_debug_attempts: u32,
    /// How long reset is asserted, and how long to wait after releasing it.
    #[serde(with = "milliseconds")]
    pub reset_pulse: Duration,
    /// Maximum number of DHCSR reads while waiting for the core to halt.
    pub poll_limit: u32,
}

impl Default for HaltConfig {
    fn default() -> Self {
        Self {
            enable_debug_attempts: 2,
            reset_pulse: Duration::from_millis(2),
            poll_limit: 100_000,
        }
    }
}

/// Bounds and delays of the debug mailbox handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxConfig {
    /// Maximum number of reads for each of the CSW and RET polls.
    pub poll_limit: u32,
    /// Delay after each command written to the mailbox.
    #[serde(with = "milliseconds")]
    pub command_delay: Duration,
    /// Delay after the debug session was acknowledged.
    #[serde(with = "milliseconds")]
    pub settle_delay: Duration,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            poll_limit: 100_000,
            command_delay: Duration::from_millis(5),
            settle_delay: Duration::from_millis(100),
        }
    }
}

/// Bounds used while calling into the flash algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashConfig {
    /// Maximum number of DHCSR reads while waiting for `S_REGRDY` after a
    /// core register transfer.
    pub register_ready_poll_limit: u32,
    /// Maximum number of DHCSR reads while waiting for a routine to hit the
    /// breakpoint.
    pub routine_poll_limit: u32,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            register_ready_poll_limit: 100,
            routine_poll_limit: 1_000_000,
        }
    }
}

mod milliseconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_yaml_str("{}").unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.halt.enable_debug_attempts, 2);
        assert_eq!(settings.mailbox.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn partial_override() {
        let yaml = "halt:\n  poll_limit: 20\nmailbox:\n  command_delay: 1\n";

        let settings = Settings::from_yaml_str(yaml).unwrap();

        assert_eq!(
            settings.halt,
            HaltConfig {
                poll_limit: 20,
                ..Default::default()
            }
        );
        assert_eq!(settings.mailbox.command_delay, Duration::from_millis(1));
        assert_eq!(settings.mailbox.poll_limit, 100_000);
        assert_eq!(settings.flash, FlashConfig::default());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(Settings::from_yaml_str("halt:\n  retries: 3\n").is_err());
    }

    #[test]
    fn durations_are_written_in_milliseconds() {
        let yaml = serde_yaml::to_string(&Settings::default()).unwrap();

        assert!(yaml.contains("reset_pulse: 2\n"));
        assert!(yaml.contains("settle_delay: 100\n"));
    }
}
