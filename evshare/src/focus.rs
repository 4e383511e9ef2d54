use crate::bus::{Connection, Notification, Observer, Subject};
use crate::shortcut::Action;
use net::Message;
use std::fmt::{self, Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Identification of the sentinel standing for this machine.
pub const LOCAL: &str = "local";

static NEXT_TRANSPORT: AtomicUsize = AtomicUsize::new(0);

/// The outgoing queue of one connection.
#[derive(Clone)]
pub struct Transport {
    id: usize,
    sender: UnboundedSender<Message>,
}

impl Transport {
    pub fn new(sender: UnboundedSender<Message>) -> Self {
        Self {
            id: NEXT_TRANSPORT.fetch_add(1, Ordering::Relaxed),
            sender,
        }
    }

    /// Returns false once the connection is gone.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

impl PartialEq for Transport {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transport {}

impl Debug for Transport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Transport({})", self.id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub identification: String,
    pub transport: Option<Transport>,
}

/// Who receives input now. The sentinel has no transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Focus {
    pub identification: String,
    pub transport: Option<Transport>,
}

impl Focus {
    pub fn is_local(&self) -> bool {
        self.transport.is_none()
    }
}

/// Connected clients in connection order behind the local sentinel, and the
/// one holding focus. Every mutation returning `Some` moved the focus index.
#[derive(Debug)]
pub struct FocusState {
    clients: Vec<Client>,
    index: usize,
}

impl FocusState {
    pub fn new() -> Self {
        Self {
            clients: vec![Client {
                identification: LOCAL.to_owned(),
                transport: None,
            }],
            index: 0,
        }
    }

    pub fn focus(&self) -> Focus {
        let client = &self.clients[self.index];
        Focus {
            identification: client.identification.clone(),
            transport: client.transport.clone(),
        }
    }

    #[cfg(test)]
    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    #[cfg(test)]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Appends a client. A known identification only gets its transport
    /// replaced; if that client holds focus the new focus is returned.
    pub fn register(&mut self, identification: &str, transport: Transport) -> Option<Focus> {
        if identification == LOCAL {
            log::warn!("Refusing to register a client named {:?}", LOCAL);
            return None;
        }

        match self
            .clients
            .iter()
            .position(|client| client.identification == identification)
        {
            Some(position) => {
                self.clients[position].transport = Some(transport);
                if position == self.index {
                    return Some(self.focus());
                }
            }
            None => self.clients.push(Client {
                identification: identification.to_owned(),
                transport: Some(transport),
            }),
        }

        None
    }

    /// Removes a client. Losing the focus holder hands focus to the last
    /// client left, which is the sentinel if no one is.
    pub fn forget(&mut self, identification: &str) -> Option<Focus> {
        let position = self
            .clients
            .iter()
            .skip(1)
            .position(|client| client.identification == identification)?
            + 1;

        self.clients.remove(position);
        if position == self.index {
            self.index = self.clients.len() - 1;
        } else if position < self.index {
            self.index -= 1;
        } else {
            return None;
        }

        Some(self.focus())
    }

    /// Moves one step, stopping at either end.
    pub fn shift(&mut self, action: Action) -> Option<Focus> {
        let index = match action {
            Action::FocusSwitchLeft => self.index.saturating_sub(1),
            Action::FocusSwitchRight => (self.index + 1).min(self.clients.len() - 1),
        };

        if index == self.index {
            return None;
        }

        self.index = index;
        Some(self.focus())
    }

    fn transport_of(&self, identification: &str) -> Option<&Transport> {
        self.clients
            .iter()
            .find(|client| client.identification == identification)
            .and_then(|client| client.transport.as_ref())
    }
}

impl Default for FocusState {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the focus state and publishes every change of it.
pub struct FocusManager {
    state: FocusState,
    subject: Subject,
}

impl FocusManager {
    pub fn new(subject: Subject) -> Self {
        Self {
            state: FocusState::new(),
            subject,
        }
    }
}

impl Observer for FocusManager {
    fn on_notification(&mut self, notification: Notification) {
        let focus = match notification {
            Notification::Shortcut(action) => self.state.shift(action),
            Notification::Connection(Connection::Made {
                identification,
                transport,
            }) => {
                log::info!("{}: registered", identification);
                self.state.register(&identification, transport)
            }
            Notification::Connection(Connection::Lost {
                identification,
                transport,
            }) => {
                // A reconnect may have replaced the transport already.
                if self.state.transport_of(&identification) != Some(&transport) {
                    return;
                }

                log::info!("{}: forgotten", identification);
                self.state.forget(&identification)
            }
            _ => return,
        };

        if let Some(focus) = focus {
            log::info!("Focus on {}", focus.identification);
            self.subject.notify(Notification::Focus(focus));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn transport() -> Transport {
        let (sender, _) = mpsc::unbounded_channel();
        Transport::new(sender)
    }

    fn with_clients(names: &[&str]) -> FocusState {
        let mut state = FocusState::new();
        for name in names {
            assert_eq!(state.register(name, transport()), None);
        }
        state
    }

    #[test]
    fn starts_local() {
        let state = FocusState::new();
        assert!(state.focus().is_local());
        assert_eq!(state.focus().identification, LOCAL);
    }

    #[test]
    fn shifting_right_clamps_at_the_end() {
        let mut state = with_clients(&["a", "b"]);

        assert_eq!(state.shift(Action::FocusSwitchRight).unwrap().identification, "a");
        assert_eq!(state.shift(Action::FocusSwitchRight).unwrap().identification, "b");
        assert_eq!(state.shift(Action::FocusSwitchRight), None);
        assert_eq!(state.focus().identification, "b");
    }

    #[test]
    fn shifting_left_clamps_at_the_sentinel() {
        let mut state = with_clients(&["a"]);
        assert_eq!(state.shift(Action::FocusSwitchLeft), None);

        state.shift(Action::FocusSwitchRight);
        assert!(state.shift(Action::FocusSwitchLeft).unwrap().is_local());
    }

    #[test]
    fn alone_there_is_nowhere_to_go() {
        let mut state = FocusState::new();
        assert_eq!(state.shift(Action::FocusSwitchRight), None);
        assert_eq!(state.shift(Action::FocusSwitchLeft), None);
    }

    #[test]
    fn forgetting_the_holder_keeps_a_valid_index() {
        let mut state = with_clients(&["a", "b", "c"]);
        state.shift(Action::FocusSwitchRight);
        state.shift(Action::FocusSwitchRight);
        assert_eq!(state.focus().identification, "b");

        let focus = state.forget("b").unwrap();
        assert_eq!(focus.identification, "c");
        assert!(state.index() < state.clients().len());

        let focus = state.forget("c").unwrap();
        assert_eq!(focus.identification, "a");
        let focus = state.forget("a").unwrap();
        assert!(focus.is_local());
        assert_eq!(state.index(), 0);
    }

    #[test]
    fn forgetting_before_the_holder_keeps_the_holder() {
        let mut state = with_clients(&["a", "b"]);
        state.shift(Action::FocusSwitchRight);
        state.shift(Action::FocusSwitchRight);

        let focus = state.forget("a").unwrap();
        assert_eq!(focus.identification, "b");
        assert_eq!(state.index(), 1);
    }

    #[test]
    fn forgetting_after_the_holder_changes_nothing() {
        let mut state = with_clients(&["a", "b"]);
        state.shift(Action::FocusSwitchRight);

        assert_eq!(state.forget("b"), None);
        assert_eq!(state.focus().identification, "a");
    }

    #[test]
    fn unknown_and_sentinel_cannot_be_forgotten() {
        let mut state = with_clients(&["a"]);
        assert_eq!(state.forget("nobody"), None);
        assert_eq!(state.forget(LOCAL), None);
        assert_eq!(state.clients().len(), 2);
    }

    #[test]
    fn reregistering_replaces_the_transport() {
        let mut state = with_clients(&["a"]);
        state.shift(Action::FocusSwitchRight);

        let replacement = transport();
        let focus = state.register("a", replacement.clone()).unwrap();
        assert_eq!(focus.transport, Some(replacement));
        assert_eq!(state.clients().len(), 2);
    }

    #[test]
    fn stale_loss_is_ignored() {
        use crate::bus::testing::{recorder, wait_for};
        use crate::bus;

        let subject = Subject::new();
        let (recording, receiver) = recorder(&subject);
        let manager = bus::spawn("focus", FocusManager::new(subject.clone())).unwrap();
        subject.attach(&manager);

        let old = transport();
        let new = transport();
        for transport in [old.clone(), new.clone()] {
            subject.notify(Notification::Connection(Connection::Made {
                identification: "a".to_owned(),
                transport,
            }));
        }
        subject.notify(Notification::Shortcut(Action::FocusSwitchRight));
        subject.notify(Notification::Connection(Connection::Lost {
            identification: "a".to_owned(),
            transport: old,
        }));

        let focus = wait_for(&receiver, |notification| match notification {
            Notification::Focus(focus) => Some(focus),
            _ => None,
        });
        assert_eq!(focus.transport, Some(new));

        manager.stop(&subject);
        recording.stop(&subject);
        let later: Vec<_> = receiver
            .try_iter()
            .filter(|notification| matches!(notification, Notification::Focus(_)))
            .collect();
        assert!(later.is_empty());
    }
}
