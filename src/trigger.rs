//! Hardware-style trigger events
//!
//! Button and knob drivers send [`TriggerEvent`]s on an mpsc channel that the
//! daemon consumes. The stdin driver stands in for the hardware on a desk.

use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::Error;
use crate::audio::MAX_VOLUME;

/// Capacity of the trigger channel
pub const TRIGGER_CHANNEL_CAPACITY: usize = 16;

/// Something the user did to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// "Is it raining?" button
    Ask,
    /// Hidden reset gesture
    SecretReset,
    /// Volume knob moved to 0..=10
    VolumeChanged(u8),
}

impl FromStr for TriggerEvent {
    type Err = Error;

    /// Empty line or `ask` asks, `reset` resets, `vol N` sets the volume
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim().to_lowercase();
        let mut parts = line.split_whitespace();

        match (parts.next(), parts.next(), parts.next()) {
            (None | Some("ask"), None, None) => Ok(Self::Ask),
            (Some("reset"), None, None) => Ok(Self::SecretReset),
            (Some("vol" | "volume"), Some(level), None) => level
                .parse::<u8>()
                .ok()
                .filter(|l| *l <= MAX_VOLUME)
                .map(Self::VolumeChanged)
                .ok_or_else(|| Error::Config(format!("volume must be 0-{MAX_VOLUME}: {level}"))),
            _ => Err(Error::Config(format!("unknown command: {}", s.trim()))),
        }
    }
}

/// Create the trigger channel
#[must_use]
pub fn channel() -> (mpsc::Sender<TriggerEvent>, mpsc::Receiver<TriggerEvent>) {
    mpsc::channel(TRIGGER_CHANNEL_CAPACITY)
}

/// Forward lines from stdin as trigger events until EOF
pub async fn drive_stdin(tx: mpsc::Sender<TriggerEvent>) {
    drive_lines(BufReader::new(tokio::io::stdin()), tx).await;
}

/// Forward lines from `reader` as trigger events until EOF or the receiver closes
pub async fn drive_lines<R>(reader: R, tx: mpsc::Sender<TriggerEvent>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.parse::<TriggerEvent>() {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ignoring input"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read trigger input");
                break;
            }
        }
    }

    tracing::debug!("trigger input closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("".parse::<TriggerEvent>().unwrap(), TriggerEvent::Ask);
        assert_eq!("  ASK ".parse::<TriggerEvent>().unwrap(), TriggerEvent::Ask);
        assert_eq!("reset".parse::<TriggerEvent>().unwrap(), TriggerEvent::SecretReset);
        assert_eq!("vol 7".parse::<TriggerEvent>().unwrap(), TriggerEvent::VolumeChanged(7));
        assert!("vol 11".parse::<TriggerEvent>().is_err());
        assert!("vol".parse::<TriggerEvent>().is_err());
        assert!("dance".parse::<TriggerEvent>().is_err());
    }

    #[tokio::test]
    async fn test_drive_lines_skips_bad_input() {
        let input: &[u8] = b"\nnonsense\nvol 3\nreset\n";
        let (tx, mut rx) = channel();

        drive_lines(input, tx).await;

        assert_eq!(rx.recv().await, Some(TriggerEvent::Ask));
        assert_eq!(rx.recv().await, Some(TriggerEvent::VolumeChanged(3)));
        assert_eq!(rx.recv().await, Some(TriggerEvent::SecretReset));
        assert_eq!(rx.recv().await, None);
    }
}
