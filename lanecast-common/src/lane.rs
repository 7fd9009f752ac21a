//! Lane identity
//!
//! A lane is one (community, voice-room) pair. Every piece of queue and
//! playback state is sharded by it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Composite key for one guild + voice channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneKey {
    guild_id: String,
    channel_id: String,
}

impl LaneKey {
    /// Build a lane key, validating both identifiers as platform snowflakes.
    ///
    /// There is no fallback guild; callers that cannot name the guild get a
    /// validation error.
    pub fn new(guild_id: impl Into<String>, channel_id: impl Into<String>) -> Result<Self> {
        let guild_id = guild_id.into().trim().to_string();
        let channel_id = channel_id.into().trim().to_string();

        if !is_snowflake(&guild_id) {
            return Err(Error::InvalidInput(format!(
                "invalid guild id {:?} (must be a snowflake)",
                guild_id
            )));
        }
        if !is_snowflake(&channel_id) {
            return Err(Error::InvalidInput(format!(
                "invalid voice channel id {:?} (must be a snowflake)",
                channel_id
            )));
        }

        Ok(Self {
            guild_id,
            channel_id,
        })
    }

    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Storage form, `guild:channel`
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.guild_id, self.channel_id)
    }
}

impl FromStr for LaneKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (guild, channel) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("lane key {:?} is not guild:channel", s)))?;
        Self::new(guild, channel)
    }
}

/// Platform snowflake: 17 to 20 ASCII digits
pub fn is_snowflake(id: &str) -> bool {
    (17..=20).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: &str = "123456789012345678";
    const CHANNEL: &str = "876543210987654321";

    #[test]
    fn test_lane_key_display_round_trip() {
        let lane = LaneKey::new(GUILD, CHANNEL).unwrap();
        assert_eq!(lane.to_string(), format!("{}:{}", GUILD, CHANNEL));

        let parsed: LaneKey = lane.storage_key().parse().unwrap();
        assert_eq!(parsed, lane);
    }

    #[test]
    fn test_lane_key_trims_whitespace() {
        let lane = LaneKey::new(format!(" {} ", GUILD), CHANNEL).unwrap();
        assert_eq!(lane.guild_id(), GUILD);
    }

    #[test]
    fn test_lane_key_rejects_missing_guild() {
        assert!(matches!(
            LaneKey::new("", CHANNEL),
            Err(Error::InvalidInput(_))
        ));
        assert!(LaneKey::new("simplified", CHANNEL).is_err());
    }

    #[test]
    fn test_lane_key_rejects_bad_channel() {
        assert!(LaneKey::new(GUILD, "12345").is_err());
        assert!(LaneKey::new(GUILD, "12345678901234567a").is_err());
    }

    #[test]
    fn test_parse_requires_separator() {
        assert!("123456789012345678".parse::<LaneKey>().is_err());
    }

    #[test]
    fn test_is_snowflake_bounds() {
        assert!(is_snowflake("12345678901234567"));
        assert!(is_snowflake("12345678901234567890"));
        assert!(!is_snowflake("1234567890123456"));
        assert!(!is_snowflake("123456789012345678901"));
    }
}
