//! Fire-and-forget external process dispatch for named sound/speech
//! events. Never blocks the reactor; stdout/stderr are discarded and
//! the child is left to exit on its own.

use std::collections::HashMap;
use std::process::{Command, Stdio};

/// Maps a named event (`"new"`, `"traffic"`, `"junktraffic"`,
/// `"gpslock"`, `"gpslost"`) to the player invocation for it.
pub struct SoundDispatcher {
    player: Option<String>,
    sounds: HashMap<String, String>,
    speech: Option<String>,
    enabled: bool,
}

impl SoundDispatcher {
    pub fn new(player: Option<String>, speech: Option<String>) -> Self {
        Self {
            enabled: player.is_some(),
            player,
            sounds: HashMap::new(),
            speech,
        }
    }

    pub fn bind(&mut self, event: impl Into<String>, path: impl Into<String>) {
        self.sounds.insert(event.into(), path.into());
    }

    /// Spawn the player for `event` if both a player and a sound path
    /// are configured. Spawn failures are swallowed: a missing sound
    /// player must never interrupt capture.
    pub fn play(&self, event: &str) {
        if !self.enabled {
            return;
        }
        let Some(player) = &self.player else { return };
        let Some(path) = self.sounds.get(event) else { return };
        spawn_detached(player, path);
    }

    /// Speak `text` through the configured TTS command, if any.
    pub fn say(&self, text: &str) {
        let Some(speech) = &self.speech else { return };
        spawn_detached(speech, text);
    }
}

fn spawn_detached(program: &str, arg: &str) {
    let _ = Command::new(program)
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_dispatcher_never_spawns() {
        let dispatcher = SoundDispatcher::new(None, None);
        dispatcher.play("new");
        dispatcher.say("hello");
    }

    #[test]
    fn play_is_a_noop_for_unbound_event() {
        let mut dispatcher = SoundDispatcher::new(Some("/bin/true".to_string()), None);
        dispatcher.bind("new", "/tmp/new.wav");
        dispatcher.play("traffic");
    }
}
