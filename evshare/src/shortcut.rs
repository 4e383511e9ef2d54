use crate::bus::{Notification, Observer, Subject};
use input::{Direction, InputEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    FocusSwitchLeft,
    FocusSwitchRight,
}

/// A modifier+key chord bound to an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortcut {
    pub name: Action,
    pub modifier: u16,
    pub key: u16,
}

impl Shortcut {
    /// Left Ctrl with the left and right arrows.
    pub fn defaults() -> Vec<Shortcut> {
        vec![
            Shortcut {
                name: Action::FocusSwitchLeft,
                modifier: 29,
                key: 105,
            },
            Shortcut {
                name: Action::FocusSwitchRight,
                modifier: 29,
                key: 106,
            },
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    ModifierHeld(u16),
}

/// Recognizes chords in the key stream. The action fires when the modifier is
/// let go, so the remote end still sees a complete press and release.
pub struct ShortcutDetector {
    bindings: HashMap<(u16, u16), Action>,
    state: State,
    staged: Option<Action>,
    subject: Subject,
}

impl ShortcutDetector {
    pub fn new(shortcuts: &[Shortcut], subject: Subject) -> Self {
        let bindings = shortcuts
            .iter()
            .map(|shortcut| ((shortcut.modifier, shortcut.key), shortcut.name))
            .collect();

        Self {
            bindings,
            state: State::Idle,
            staged: None,
            subject,
        }
    }

    fn is_modifier(&self, code: u16) -> bool {
        self.bindings.keys().any(|(modifier, _)| *modifier == code)
    }

    pub fn feed(&mut self, event: &InputEvent) -> Option<Action> {
        let (code, direction) = event.key()?;

        match self.state {
            State::Idle => {
                if direction == Direction::Down && self.is_modifier(code) {
                    self.state = State::ModifierHeld(code);
                    self.staged = None;
                }

                None
            }
            State::ModifierHeld(modifier) if code == modifier => {
                if direction == Direction::Up {
                    self.state = State::Idle;
                    return self.staged.take();
                }

                None
            }
            State::ModifierHeld(modifier) => {
                if let Some(action) = self.bindings.get(&(modifier, code)) {
                    self.staged = Some(*action);
                }

                None
            }
        }
    }
}

impl Observer for ShortcutDetector {
    fn on_notification(&mut self, notification: Notification) {
        let batch = match notification {
            Notification::Device(batch) => batch,
            _ => return,
        };

        for event in &batch.events {
            if let Some(action) = self.feed(event) {
                log::debug!("Shortcut {:?} on {:?}", action, batch.device);
                self.subject.notify(Notification::Shortcut(action));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use input::{EV_KEY, EV_REL};

    const CTRL: u16 = 29;
    const LEFT: u16 = 105;
    const RIGHT: u16 = 106;

    fn key(code: u16, value: i32) -> InputEvent {
        InputEvent::new(EV_KEY, code, value)
    }

    fn run(events: &[InputEvent]) -> Vec<Action> {
        let mut detector = ShortcutDetector::new(&Shortcut::defaults(), Subject::new());
        events.iter().filter_map(|event| detector.feed(event)).collect()
    }

    #[test]
    fn chord_fires_once_on_modifier_release() {
        let actions = run(&[key(CTRL, 1), key(RIGHT, 1), key(RIGHT, 0), key(CTRL, 0)]);
        assert_eq!(actions, vec![Action::FocusSwitchRight]);
    }

    #[test]
    fn lone_modifier_fires_nothing() {
        assert!(run(&[key(CTRL, 1), key(CTRL, 0)]).is_empty());
    }

    #[test]
    fn key_without_modifier_fires_nothing() {
        assert!(run(&[key(LEFT, 1), key(LEFT, 0), key(CTRL, 1), key(CTRL, 0)]).is_empty());
    }

    #[test]
    fn last_chord_key_wins() {
        let actions = run(&[key(CTRL, 1), key(RIGHT, 1), key(LEFT, 1), key(CTRL, 0)]);
        assert_eq!(actions, vec![Action::FocusSwitchLeft]);
    }

    #[test]
    fn autorepeat_and_other_events_are_ignored() {
        let actions = run(&[
            key(CTRL, 1),
            key(CTRL, 2),
            InputEvent::new(EV_REL, 0, 4),
            key(LEFT, 1),
            key(LEFT, 2),
            key(CTRL, 0),
        ]);
        assert_eq!(actions, vec![Action::FocusSwitchLeft]);
    }

    #[test]
    fn staged_action_does_not_leak_into_next_hold() {
        let actions = run(&[
            key(CTRL, 1),
            key(LEFT, 1),
            key(CTRL, 0),
            key(CTRL, 1),
            key(CTRL, 0),
        ]);
        assert_eq!(actions, vec![Action::FocusSwitchLeft]);
    }

    #[test]
    fn detector_publishes_on_the_bus() {
        use crate::bus::testing::{recorder, wait_for};
        use crate::bus::{self, DeviceBatch};

        let subject = Subject::new();
        let (recording, receiver) = recorder(&subject);
        let detector = bus::spawn(
            "shortcut",
            ShortcutDetector::new(&Shortcut::defaults(), subject.clone()),
        )
        .unwrap();
        subject.attach(&detector);

        subject.notify(Notification::Device(DeviceBatch {
            device: "keyboard".to_owned(),
            events: vec![key(CTRL, 1), key(LEFT, 1), key(LEFT, 0), key(CTRL, 0)],
        }));

        let action = wait_for(&receiver, |notification| match notification {
            Notification::Shortcut(action) => Some(action),
            _ => None,
        });
        assert_eq!(action, Action::FocusSwitchLeft);

        detector.stop(&subject);
        recording.stop(&subject);
    }
}
