//! Local node identity and connection factory.

use crate::config::{ConnectionConfig, DistConfig};
use crate::core::flags::DistFlags;
use crate::error::{DistError, Result};
use crate::protocol::handshake;
use crate::service::connection::Connection;
use crate::transport::{websocket, Transport};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_timeout_error;
use std::fmt;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Shared secret. Wiped on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Cookie(String);

impl Cookie {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self(cookie.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cookie(<redacted>)")
    }
}

/// Read-only identity shared by a node and every connection it opens.
#[derive(Debug)]
pub struct NodeIdentity {
    pub(crate) name: String,
    pub(crate) cookie: Cookie,
    pub(crate) flags: DistFlags,
    pub(crate) creation: u32,
}

impl NodeIdentity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> DistFlags {
        self.flags
    }

    pub fn creation(&self) -> u32 {
        self.creation
    }
}

/// A named, cookie-authenticated participant.
///
/// Cheap to clone; clones share the same identity.
#[derive(Debug, Clone)]
pub struct Node {
    identity: Arc<NodeIdentity>,
    settings: ConnectionConfig,
}

/// Wall-clock seconds truncated to 32 bits.
fn current_creation() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_else(|_| rand::random())
}

impl Node {
    /// Node advertising the fixed capability set, with a creation taken from
    /// the current time.
    pub fn new(name: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self::with_creation(name, cookie, current_creation())
    }

    pub fn with_creation(name: impl Into<String>, cookie: impl Into<String>, creation: u32) -> Self {
        Self {
            identity: Arc::new(NodeIdentity {
                name: name.into(),
                cookie: Cookie::new(cookie),
                flags: DistFlags::ADVERTISED,
                creation,
            }),
            settings: ConnectionConfig::default(),
        }
    }

    /// Build a node from configuration, resolving its cookie.
    ///
    /// # Errors
    /// `ConfigError` if validation fails or no cookie can be found
    pub fn from_config(config: &DistConfig) -> Result<Self> {
        config.validate_strict()?;
        let cookie = config.node.resolve_cookie()?;
        Ok(Self::new(config.node.name.clone(), cookie).with_settings(config.connection.clone()))
    }

    /// Replace the settings used for connections opened from now on.
    pub fn with_settings(mut self, settings: ConnectionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn flags(&self) -> DistFlags {
        self.identity.flags()
    }

    pub fn creation(&self) -> u32 {
        self.identity.creation()
    }

    pub fn settings(&self) -> &ConnectionConfig {
        &self.settings
    }

    /// Open a WebSocket to `peer` and authenticate it as `expected_peer_name`.
    ///
    /// `peer` is `host:port` or a full `ws://`/`wss://` URL. Opening and the
    /// whole handshake share `connect_timeout`. Dropping the returned future
    /// releases the socket.
    ///
    /// # Errors
    /// `SocketError` if the socket cannot be opened, `Timeout`, or any
    /// handshake failure
    #[instrument(skip(self), fields(node = %self.name()))]
    pub async fn connect(&self, peer: &str, expected_peer_name: &str) -> Result<Connection> {
        let attempt = async {
            let transport = websocket::connect(
                peer,
                &self.settings.scheme,
                self.settings.max_buffered_frames,
            )
            .await
            .inspect_err(|e| {
                global_metrics().connection_error();
                warn!(error = %e, "Transport failed to open");
            })?;
            self.establish(transport, expected_peer_name).await
        };
        with_timeout_error(attempt, self.settings.connect_timeout).await
    }

    /// Run the handshake over a transport the caller opened.
    ///
    /// # Errors
    /// `Timeout` or any handshake failure
    #[instrument(skip(self, transport), fields(node = %self.name(), peer = %transport.peer()))]
    pub async fn connect_with(
        &self,
        transport: Transport,
        expected_peer_name: &str,
    ) -> Result<Connection> {
        with_timeout_error(
            self.establish(transport, expected_peer_name),
            self.settings.connect_timeout,
        )
        .await
    }

    async fn establish(&self, transport: Transport, expected_peer_name: &str) -> Result<Connection> {
        let peer = handshake::perform(&transport, &self.identity, expected_peer_name)
            .await
            .inspect_err(|e| {
                if matches!(e, DistError::SocketError(_)) {
                    global_metrics().connection_error();
                }
            })?;
        info!(peer_name = %peer.name, "Connection established");
        Ok(Connection::new(
            Arc::clone(&self.identity),
            transport,
            peer,
            self.settings.receive_timeout,
        ))
    }
}
