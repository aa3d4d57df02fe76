// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Registry of locally offered services (§4.H): a service is just an
//! `Identifier` (scoped under a network prefix via
//! `network::scoped_service_id`) that incoming `CONNECT` requests name.
//! Whoever registers it is handed every resulting stream as it opens.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;

use crate::{error::OverlayError, id::Identifier};

/// Handed to a service's registrant each time a `CONNECT` handshake
/// completes against its service id.
#[derive(Debug, Clone, Copy)]
pub struct IncomingConnection {
    pub peer_id: Identifier,
    pub stream_id: Identifier,
}

/// §6 "Service handler contract": `allow_connection(peer) → bool`,
/// evaluated synchronously in the event loop (§5 forbids blocking calls
/// inside handlers, so this cannot be an async round trip out to the
/// registrant) before the handshake is allowed to complete. No filter
/// means every peer is allowed, matching a registrant that never
/// overrides the default.
pub type ConnectionFilter = Arc<dyn Fn(Identifier) -> bool + Send + Sync>;

struct Handler {
    tx: mpsc::UnboundedSender<IncomingConnection>,
    filter: Option<ConnectionFilter>,
}

#[derive(Default)]
pub struct ServiceRegistry {
    handlers: HashMap<Identifier, Handler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry::default()
    }

    pub fn register(
        &mut self,
        service_id: Identifier,
        tx: mpsc::UnboundedSender<IncomingConnection>,
        filter: Option<ConnectionFilter>,
    ) -> Result<(), OverlayError> {
        if self.handlers.contains_key(&service_id) {
            return Err(OverlayError::ServiceAlreadyRegistered(service_id.to_base32()));
        }
        self.handlers.insert(service_id, Handler { tx, filter });
        Ok(())
    }

    pub fn unregister(&mut self, service_id: &Identifier) {
        self.handlers.remove(service_id);
    }

    /// §6 `allow_connection(peer) → bool`: `true` if the service has no
    /// filter, or its filter accepts `peer`. Called before the
    /// responder half of the handshake is allowed to proceed.
    pub fn allow_connection(&self, service_id: &Identifier, peer: Identifier) -> bool {
        match self.handlers.get(service_id) {
            Some(handler) => handler.filter.as_ref().is_none_or(|f| f(peer)),
            None => false,
        }
    }

    /// Notify a service's registrant; a closed channel (registrant
    /// dropped) is treated the same as unregistering.
    pub fn notify(&mut self, service_id: &Identifier, incoming: IncomingConnection) -> bool {
        let Some(handler) = self.handlers.get(service_id) else {
            return false;
        };
        if handler.tx.send(incoming).is_err() {
            self.handlers.remove(service_id);
            return false;
        }
        true
    }

    pub fn is_registered(&self, service_id: &Identifier) -> bool {
        self.handlers.contains_key(service_id)
    }
}
