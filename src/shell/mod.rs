//! Live SSH handle abstraction.
//!
//! The connection layer owns the actual SSH client and shell channel. It hands
//! both over to the suspension subsystem as a [`ShellHandles`] pair when the
//! browser transport goes away, and gets them back on resume.
//!
//! Each handle publishes its events to exactly one subscriber. Calling
//! `subscribe` replaces whoever was listening before, which is how a new owner
//! makes sure nobody else still reacts to the handle.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events emitted by an interactive shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Output produced by the remote shell
    Data(Vec<u8>),
    /// Channel closed
    Close,
    /// Remote side sent EOF
    End,
    /// Remote process exited
    Exit {
        code: Option<u32>,
        signal: Option<String>,
    },
    /// Channel-level failure
    Error(String),
}

/// Events emitted by the SSH client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Transport-level failure
    Error(String),
    /// Connection ended
    End,
}

impl ChannelEvent {
    /// Human-readable reason for a liveness signal, `None` for data.
    pub fn disconnect_reason(&self) -> Option<String> {
        match self {
            ChannelEvent::Data(_) => None,
            ChannelEvent::Close => Some("SSH channel closed".to_string()),
            ChannelEvent::End => Some("SSH channel ended".to_string()),
            ChannelEvent::Exit { code, signal } => Some(match (code, signal) {
                (_, Some(signal)) => format!("Remote shell terminated by signal {}", signal),
                (Some(code), None) => format!("Remote shell exited with code {}", code),
                (None, None) => "Remote shell exited".to_string(),
            }),
            ChannelEvent::Error(message) => Some(format!("SSH channel error: {}", message)),
        }
    }
}

impl ClientEvent {
    /// Human-readable reason for a liveness signal.
    pub fn disconnect_reason(&self) -> String {
        match self {
            ClientEvent::Error(message) => format!("SSH connection error: {}", message),
            ClientEvent::End => "SSH connection ended".to_string(),
        }
    }
}

/// Errors raised by shell handle operations
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// Handle already closed
    #[error("Handle already closed")]
    Closed,

    /// Failure reported by the underlying SSH library
    #[error("{0}")]
    Other(String),
}

/// A live SSH client connection.
#[async_trait]
pub trait ShellClient: Send + Sync {
    /// Become the only listener for client events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ClientEvent>;

    /// Drop the current listener, if any.
    fn unsubscribe(&self);

    /// Tear down the connection.
    async fn close(&self) -> Result<(), ShellError>;
}

/// A live interactive shell channel on top of a [`ShellClient`].
#[async_trait]
pub trait ShellChannel: Send + Sync {
    fn is_readable(&self) -> bool;

    fn is_writable(&self) -> bool;

    /// Become the only listener for channel events.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ChannelEvent>;

    /// Drop the current listener, if any.
    ///
    /// The sender must be dropped so the receiver yields the events already
    /// queued and then ends.
    fn unsubscribe(&self);

    /// Close the channel.
    async fn close(&self) -> Result<(), ShellError>;
}

/// The owned pair of live handles transferred between owners.
pub struct ShellHandles {
    pub client: Box<dyn ShellClient>,
    pub channel: Box<dyn ShellChannel>,
}

impl ShellHandles {
    pub fn new(client: Box<dyn ShellClient>, channel: Box<dyn ShellChannel>) -> Self {
        Self { client, channel }
    }

    /// True when the channel can still carry traffic both ways.
    pub fn is_usable(&self) -> bool {
        self.channel.is_readable() && self.channel.is_writable()
    }

    /// Stop delivering events to whoever subscribed last.
    pub fn detach_listeners(&self) {
        self.channel.unsubscribe();
        self.client.unsubscribe();
    }
}

impl std::fmt::Debug for ShellHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellHandles")
            .field("readable", &self.channel.is_readable())
            .field("writable", &self.channel.is_writable())
            .finish()
    }
}
