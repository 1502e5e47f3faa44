use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Active guild/channel selection plus the per-channel unread counters.
///
/// The input loop and the gateway event tasks both touch this, so every read
/// and write goes through the same lock. Empty ids mean "nothing selected".
#[derive(Debug, Default)]
pub struct ClientState {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    active_guild: String,
    active_channel: String,
    // guild id -> channel id -> unread count
    unread: HashMap<String, HashMap<String, u64>>,
}

impl Inner {
    fn add_unread(&mut self, guild_id: &str, channel_id: &str, count: u64) {
        let counter = self
            .unread
            .entry(guild_id.to_string())
            .or_default()
            .entry(channel_id.to_string())
            .or_default();
        *counter = counter.saturating_add(count);
    }
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_guild(&self) -> String {
        self.lock().active_guild.clone()
    }

    pub fn active_channel(&self) -> String {
        self.lock().active_channel.clone()
    }

    pub fn set_guild(&self, id: &str) {
        self.lock().active_guild = id.to_string();
    }

    pub fn set_channel(&self, id: &str) {
        self.lock().active_channel = id.to_string();
    }

    pub fn mark_unread(&self, guild_id: &str, channel_id: &str, count: u64) {
        self.lock().add_unread(guild_id, channel_id, count);
    }

    /// Counts one unread message unless `channel_id` is the active channel.
    /// Returns true when it is active and the message should be shown
    /// instead. The check and the increment share one lock, so a concurrent
    /// channel switch cannot leave the message both unshown and uncounted.
    pub fn mark_unread_unless_active(&self, guild_id: &str, channel_id: &str) -> bool {
        let mut inner = self.lock();
        if inner.active_channel == channel_id {
            return true;
        }
        inner.add_unread(guild_id, channel_id, 1);
        false
    }

    pub fn mark_read(&self, guild_id: &str, channel_id: &str) {
        let mut inner = self.lock();
        inner
            .unread
            .entry(guild_id.to_string())
            .or_default()
            .insert(channel_id.to_string(), 0);
    }

    pub fn channel_unread(&self, guild_id: &str, channel_id: &str) -> u64 {
        self.lock()
            .unread
            .get(guild_id)
            .and_then(|channels| channels.get(channel_id))
            .copied()
            .unwrap_or(0)
    }

    pub fn guild_unread(&self, guild_id: &str) -> u64 {
        self.lock()
            .unread
            .get(guild_id)
            .map(|channels| channels.values().sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the maps half-updated,
        // so a poisoned guard is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn unknown_keys_read_as_zero() {
        let state = ClientState::new();
        assert_eq!(state.channel_unread("g", "c"), 0);
        assert_eq!(state.guild_unread("g"), 0);

        state.mark_unread("g", "c", 1);
        assert_eq!(state.channel_unread("g", "other"), 0);
        assert_eq!(state.guild_unread("other"), 0);
    }

    #[test]
    fn mark_unread_accumulates_and_mark_read_resets_one_channel() {
        let state = ClientState::new();
        for _ in 0..5 {
            state.mark_unread("g1", "c1", 1);
        }
        state.mark_unread("g1", "c2", 2);
        state.mark_unread("g2", "c1", 3);
        assert_eq!(state.channel_unread("g1", "c1"), 5);

        state.mark_read("g1", "c1");
        assert_eq!(state.channel_unread("g1", "c1"), 0);
        assert_eq!(state.channel_unread("g1", "c2"), 2);
        assert_eq!(state.channel_unread("g2", "c1"), 3);
    }

    #[test]
    fn unread_is_skipped_for_the_active_channel() {
        let state = ClientState::new();
        state.set_guild("g");
        state.set_channel("c1");

        assert!(state.mark_unread_unless_active("g", "c1"));
        assert!(!state.mark_unread_unless_active("g", "c2"));
        assert_eq!(state.channel_unread("g", "c1"), 0);
        assert_eq!(state.channel_unread("g", "c2"), 1);

        state.set_channel("");
        assert!(!state.mark_unread_unless_active("g", "c1"));
        assert_eq!(state.channel_unread("g", "c1"), 1);
    }

    #[test]
    fn guild_total_is_sum_of_channels() {
        let state = ClientState::new();
        state.mark_unread("g", "a", 4);
        state.mark_unread("g", "b", 1);
        state.mark_read("g", "c");
        state.mark_unread("h", "a", 9);

        let sum: u64 = ["a", "b", "c"]
            .iter()
            .map(|channel| state.channel_unread("g", channel))
            .sum();
        assert_eq!(state.guild_unread("g"), sum);
        assert_eq!(sum, 5);
    }

    #[test]
    fn mark_read_creates_entry_for_unseen_channel() {
        let state = ClientState::new();
        state.mark_read("g", "c");
        assert_eq!(state.channel_unread("g", "c"), 0);
        state.mark_unread("g", "c", 1);
        assert_eq!(state.channel_unread("g", "c"), 1);
    }

    #[test]
    fn selection_round_trips() {
        let state = ClientState::new();
        assert_eq!(state.active_guild(), "");
        assert_eq!(state.active_channel(), "");

        state.set_guild("g");
        state.set_channel("c");
        assert_eq!(state.active_guild(), "g");
        assert_eq!(state.active_channel(), "c");

        state.set_channel("");
        assert_eq!(state.active_channel(), "");
        assert_eq!(state.active_guild(), "g");
    }

    #[test]
    fn concurrent_marks_are_not_lost() {
        let state = Arc::new(ClientState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..250 {
                        state.mark_unread("g", "c", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("marking thread");
        }
        assert_eq!(state.channel_unread("g", "c"), 2000);
    }
}
