use crate::bus::{Notification, Remote, Subject};
use anyhow::{Context, Error};
use net::{
    self, Announcement, AnnouncementResponse, CreateDevice, DeviceEvent, Message, PROTOCOL_VERSION,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum SessionError {
    #[error("Rejected by the server")]
    Rejected,

    #[error("Cannot emulate remote devices: {0:#}")]
    Emulation(Error),

    #[error(transparent)]
    Connection(#[from] Error),
}

/// Talks to one connected server until it goes away. Everything it announces
/// is published for the emulator.
async fn session<T>(
    mut stream: T,
    identification: &str,
    subject: &Subject,
    failures: &mut UnboundedReceiver<Error>,
) -> Result<(), SessionError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let announcement = Message::Announcement(Announcement {
        identification: identification.to_owned(),
        version: PROTOCOL_VERSION,
    });
    time::timeout(net::MESSAGE_TIMEOUT, net::write_message(&mut stream, &announcement))
        .await
        .context("Write timeout")?
        .context("Cannot announce")?;

    loop {
        // Losing a half read frame is fine here: both ways out end the session.
        let message = tokio::select! {
            failure = failures.recv() => {
                return Err(match failure {
                    Some(err) => SessionError::Emulation(err),
                    None => SessionError::Emulation(anyhow::anyhow!("Emulator stopped")),
                });
            }
            message = net::read_message(&mut stream) => message,
        };

        let message = match message {
            Ok(message) => message,
            Err(err) if !err.is_fatal() => {
                log::warn!("Dropping frame: {}", err);
                continue;
            }
            Err(err) => return Err(Error::new(err).context("Connection lost").into()),
        };

        match message {
            Message::CreateDevice(CreateDevice { devices }) => {
                log::debug!("Server offers {} devices", devices.len());
                subject.notify(Notification::Remote(Remote::CreateDevices(devices)));
            }
            Message::AnnouncementResponse(AnnouncementResponse { status: false, .. }) => {
                return Err(SessionError::Rejected);
            }
            Message::AnnouncementResponse(AnnouncementResponse { devices, .. }) => {
                log::info!("Accepted by the server");
                subject.notify(Notification::Remote(Remote::CreateDevices(devices)));
            }
            Message::DeviceEvent(DeviceEvent { device, events }) => {
                subject.notify(Notification::Remote(Remote::Events { device, events }));
            }
            Message::Announcement(_) => log::warn!("Unexpected ANNOUNCEMENT from the server"),
        }
    }
}

/// Keeps a connection to the server, reconnecting whenever it drops. Only a
/// rejection or being unable to emulate anything ends it.
pub async fn run_client(
    address: String,
    port: u16,
    identification: String,
    subject: Subject,
    mut failures: UnboundedReceiver<Error>,
) -> Result<Infallible, Error> {
    loop {
        match TcpStream::connect((address.as_str(), port)).await {
            Ok(stream) => {
                log::info!("Connected to {}:{}", address, port);
                if let Err(err) = stream.set_nodelay(true) {
                    log::debug!("Cannot disable Nagle: {}", err);
                }

                let result = session(stream, &identification, &subject, &mut failures).await;
                subject.notify(Notification::Remote(Remote::Closed));

                match result {
                    Ok(()) => log::info!("Disconnected from {}:{}", address, port),
                    Err(SessionError::Connection(err)) => {
                        log::error!("Disconnected from {}:{}: {:#}", address, port, err)
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Err(err) => log::error!("Cannot connect to {}:{}: {}", address, port, err),
        }

        log::info!("Retrying in {} seconds", RETRY_INTERVAL.as_secs());
        time::sleep(RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::{recorder, wait_for};
    use input::{DeviceDescriptor, InputEvent, EV_KEY};
    use tokio::io;
    use tokio::sync::mpsc;

    fn keyboard() -> DeviceDescriptor {
        DeviceDescriptor {
            name: "keyboard".to_owned(),
            ..DeviceDescriptor::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_messages_are_published() {
        let subject = Subject::new();
        let (recording, notifications) = recorder(&subject);
        let (_failure_sender, mut failures) = mpsc::unbounded_channel();
        let (client, mut server) = io::duplex(64 * 1024);

        let session_subject = subject.clone();
        let task = tokio::spawn(async move {
            session(client, "laptop", &session_subject, &mut failures).await
        });

        match net::read_message(&mut server).await.unwrap() {
            Message::Announcement(announcement) => {
                assert_eq!(announcement.identification, "laptop");
                assert_eq!(announcement.version, PROTOCOL_VERSION);
            }
            other => panic!("unexpected message: {:?}", other),
        }

        let messages = [
            Message::CreateDevice(CreateDevice {
                devices: vec![keyboard()],
            }),
            Message::AnnouncementResponse(AnnouncementResponse {
                status: true,
                devices: vec![keyboard()],
            }),
            Message::DeviceEvent(DeviceEvent {
                device: "keyboard".to_owned(),
                events: vec![InputEvent::new(EV_KEY, 30, 1)],
            }),
        ];
        for message in &messages {
            net::write_message(&mut server, message).await.unwrap();
        }
        drop(server);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SessionError::Connection(_))));

        let remote = tokio::task::spawn_blocking(move || {
            (0..3)
                .map(|_| {
                    wait_for(&notifications, |notification| match notification {
                        Notification::Remote(remote) => Some(remote),
                        _ => None,
                    })
                })
                .collect::<Vec<_>>()
        })
        .await
        .unwrap();

        assert!(matches!(&remote[0], Remote::CreateDevices(devices) if devices.len() == 1));
        assert!(matches!(&remote[1], Remote::CreateDevices(devices) if devices.len() == 1));
        assert!(matches!(
            &remote[2],
            Remote::Events { device, events } if device == "keyboard" && events.len() == 1
        ));

        recording.stop(&subject);
    }

    #[tokio::test]
    async fn rejection_ends_the_session() {
        let subject = Subject::new();
        let (_failure_sender, mut failures) = mpsc::unbounded_channel();
        let (client, mut server) = io::duplex(64 * 1024);

        let rejection = Message::AnnouncementResponse(AnnouncementResponse {
            status: false,
            devices: Vec::new(),
        });
        net::write_message(&mut server, &rejection).await.unwrap();

        let result = session(client, "laptop", &subject, &mut failures).await;
        assert!(matches!(result, Err(SessionError::Rejected)));
    }

    #[tokio::test]
    async fn emulation_failure_ends_the_session() {
        let subject = Subject::new();
        let (failure_sender, mut failures) = mpsc::unbounded_channel();
        let (client, _server) = io::duplex(64 * 1024);

        failure_sender
            .send(anyhow::anyhow!("cannot open /dev/uinput"))
            .unwrap();

        let result = session(client, "laptop", &subject, &mut failures).await;
        assert!(matches!(result, Err(SessionError::Emulation(_))));
    }
}
