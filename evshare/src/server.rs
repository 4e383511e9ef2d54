use crate::bus::{Connection, Notification, Subject};
use crate::focus::Transport;
use anyhow::{Context, Error};
use input::DeviceDescriptor;
use net::{self, AnnouncementResponse, CreateDevice, Message, PROTOCOL_VERSION};
use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

async fn send<T>(stream: &mut T, message: &Message) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    time::timeout(net::MESSAGE_TIMEOUT, net::write_message(stream, message))
        .await
        .context("Write timeout")?
        .with_context(|| format!("Cannot send {}", message.name()))
}

async fn forward<T>(
    writer: &mut T,
    receiver: &mut mpsc::UnboundedReceiver<Message>,
    watcher: &mut JoinHandle<net::Error>,
) -> Result<(), Error>
where
    T: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            message = receiver.recv() => match message {
                Some(message) => send(writer, &message).await?,
                None => return Ok(()),
            },
            err = &mut *watcher => {
                return Err(Error::new(err?)).context("Connection lost");
            }
        }
    }
}

/// Runs one connection: handshake, registration with the focus manager, then
/// forwarding whatever is queued on its transport until either side hangs up.
async fn handle_connection<T>(
    stream: T,
    address: SocketAddr,
    devices: Arc<Vec<DeviceDescriptor>>,
    subject: Subject,
) -> Result<(), Error>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let message = Message::CreateDevice(CreateDevice {
        devices: devices.to_vec(),
    });
    send(&mut writer, &message).await?;

    let announcement = match time::timeout(net::MESSAGE_TIMEOUT, net::read_message(&mut reader))
        .await
        .context("Announcement timeout")??
    {
        Message::Announcement(announcement) => announcement,
        other => return Err(anyhow::anyhow!("Expected ANNOUNCEMENT, got {}", other.name())),
    };

    if announcement.version != PROTOCOL_VERSION {
        let response = Message::AnnouncementResponse(AnnouncementResponse {
            status: false,
            devices: Vec::new(),
        });
        send(&mut writer, &response).await?;
        writer.shutdown().await?;

        return Err(anyhow::anyhow!(
            "Incompatible protocol version (got {}, expecting {})",
            announcement.version,
            PROTOCOL_VERSION
        ));
    }

    let response = Message::AnnouncementResponse(AnnouncementResponse {
        status: true,
        devices: devices.to_vec(),
    });
    send(&mut writer, &response).await?;

    let identification = format!("{}@{}", announcement.identification, address);
    log::info!("{}: announced", identification);

    let (sender, mut receiver) = mpsc::unbounded_channel();
    let transport = Transport::new(sender);
    subject.notify(Notification::Connection(Connection::Made {
        identification: identification.clone(),
        transport: transport.clone(),
    }));

    // Clients have nothing to say after the announcement, but a read is the
    // only way to notice them going away while no input flows.
    let label = identification.clone();
    let mut watcher = tokio::spawn(async move {
        loop {
            match net::read_message(&mut reader).await {
                Ok(message) => log::warn!("{}: unexpected {}", label, message.name()),
                Err(err) if !err.is_fatal() => log::warn!("{}: dropping frame: {}", label, err),
                Err(err) => return err,
            }
        }
    });

    let result = forward(&mut writer, &mut receiver, &mut watcher).await;
    watcher.abort();
    subject.notify(Notification::Connection(Connection::Lost {
        identification,
        transport,
    }));

    result
}

/// Accepts clients forever, offering each of them `devices`.
pub async fn run_server(
    listen_address: (String, u16),
    devices: Vec<DeviceDescriptor>,
    subject: Subject,
) -> Result<Infallible, Error> {
    let listener = TcpListener::bind((listen_address.0.as_str(), listen_address.1))
        .await
        .with_context(|| format!("Cannot listen on {}:{}", listen_address.0, listen_address.1))?;

    log::info!("Listening on {}", listener.local_addr()?);

    let listener = &listener;
    let accept = move || async move {
        let (stream, address) = listener.accept().await?;
        if let Err(err) = stream.set_nodelay(true) {
            log::debug!("{}: cannot disable Nagle: {}", address, err);
        }

        Ok::<_, io::Error>((stream, address))
    };

    Ok(accept_loop(accept, Arc::new(devices), subject).await)
}

/// Failing to accept one client (file descriptors running out, say) leaves
/// the others alone; the loop waits a moment and carries on.
async fn accept_loop<F, A, T>(
    mut accept: F,
    devices: Arc<Vec<DeviceDescriptor>>,
    subject: Subject,
) -> Infallible
where
    F: FnMut() -> A,
    A: Future<Output = io::Result<(T, SocketAddr)>>,
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    loop {
        let (stream, address) = match accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::error!("Cannot accept connection: {}", err);
                time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let devices = devices.clone();
        let subject = subject.clone();
        tokio::spawn(async move {
            log::info!("{}: connected", address);
            let message = handle_connection(stream, address, devices, subject)
                .await
                .err()
                .map(|err| format!(" ({:#})", err))
                .unwrap_or_else(String::new);
            log::info!("{}: disconnected{}", address, message);
        });
    }
}
