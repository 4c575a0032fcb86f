//! Packet dispatch.
//!
//! Validated payloads are routed through an ordered list of handler
//! bundles. A bundle covers a contiguous range of message types
//! starting at `start`; individual slots may be empty. Bundles are
//! scanned in registration order and the first handler that returns
//! [`HandlerOutcome::Used`] consumes the packet; a handler returning
//! [`HandlerOutcome::NotUsed`] lets the scan continue.
//!
//! Every session owns a default bundle covering types 1-100 with
//! handlers for the transport-generic messages (DISCONNECT, IGNORE,
//! UNIMPLEMENTED, DEBUG); protocol sub-layers (key exchange,
//! authentication methods, channels) register specialised bundles that
//! fill the empty slots.
//!
//! When no bundle consumes a packet, an UNIMPLEMENTED reply carrying
//! the offending sequence number is sent and processing continues.

use bytes::Buf;
use skiff_platform::SkiffResult;
use tracing::{debug, trace, warn};

use crate::ssh::session::SessionState;

/// Outcome of one handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler consumed the packet.
    Used,
    /// The handler declined; scanning continues.
    NotUsed,
}

/// Packet handler capability.
///
/// Receives the session state, the message type and the payload view
/// (type byte stripped). Handlers must not drive reassembly.
pub type PacketHandler = Box<dyn FnMut(&mut SessionState, u8, &[u8]) -> HandlerOutcome + Send>;

/// A contiguous range of handler slots.
pub struct HandlerBundle {
    start: u8,
    handlers: Vec<Option<PacketHandler>>,
}

impl std::fmt::Debug for HandlerBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerBundle")
            .field("start", &self.start)
            .field("length", &self.handlers.len())
            .finish()
    }
}

impl HandlerBundle {
    /// Creates a bundle covering `length` types starting at `start`,
    /// all slots empty.
    pub fn new(start: u8, length: usize) -> Self {
        assert!(
            start as usize + length <= 256,
            "Handler bundle range exceeds the message type space"
        );
        let mut handlers = Vec::with_capacity(length);
        handlers.resize_with(length, || None);
        Self { start, handlers }
    }

    /// Installs a handler for message type `ty`.
    ///
    /// # Panics
    ///
    /// Panics if `ty` is outside the bundle's range.
    pub fn set_handler<F>(&mut self, ty: u8, handler: F)
    where
        F: FnMut(&mut SessionState, u8, &[u8]) -> HandlerOutcome + Send + 'static,
    {
        assert!(self.covers(ty), "Message type {} outside bundle range", ty);
        self.handlers[(ty - self.start) as usize] = Some(Box::new(handler));
    }

    fn covers(&self, ty: u8) -> bool {
        ty >= self.start && (ty as usize) < self.start as usize + self.handlers.len()
    }

    fn slot_mut(&mut self, ty: u8) -> Option<&mut PacketHandler> {
        if !self.covers(ty) {
            return None;
        }
        self.handlers[(ty - self.start) as usize].as_mut()
    }
}

/// Priority-ordered list of handler bundles.
#[derive(Debug, Default)]
pub struct Dispatcher {
    bundles: Vec<HandlerBundle>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bundle. Earlier registrations take precedence; later
    /// bundles fire only where earlier ones have no handler or decline.
    pub fn register(&mut self, bundle: HandlerBundle) {
        self.bundles.push(bundle);
    }

    /// Dispatches a validated packet of type `ty`.
    ///
    /// Emits an UNIMPLEMENTED reply when no bundle consumes the packet.
    pub fn dispatch(
        &mut self,
        state: &mut SessionState,
        ty: u8,
        payload: &[u8],
    ) -> SkiffResult<()> {
        debug!("dispatching handler for packet type {}", ty);

        for bundle in &mut self.bundles {
            let Some(handler) = bundle.slot_mut(ty) else {
                continue;
            };
            if handler(state, ty, payload) == HandlerOutcome::Used {
                return Ok(());
            }
        }

        warn!("no handler consumed packet type {}", ty);
        state.send_unimplemented(state.recv_seq().wrapping_sub(1))
    }
}

/// The default handler bundle owned by every session: transport-generic
/// messages for types 1-100, all other slots empty.
pub fn default_bundle() -> HandlerBundle {
    let mut bundle = HandlerBundle::new(1, 100);

    // SSH_MSG_DISCONNECT
    bundle.set_handler(1, |state, _ty, payload| {
        let mut buf = payload;
        let code = if buf.remaining() >= 4 { buf.get_u32() } else { 0 };
        let message = if buf.remaining() >= 4 {
            let len = (buf.get_u32() as usize).min(buf.remaining());
            String::from_utf8_lossy(&buf[..len]).into_owned()
        } else {
            String::new()
        };
        state.fail(format!(
            "Received SSH_MSG_DISCONNECT: {} ({})",
            code, message
        ));
        HandlerOutcome::Used
    });

    // SSH_MSG_IGNORE
    bundle.set_handler(2, |_state, _ty, _payload| {
        trace!("received SSH_MSG_IGNORE");
        HandlerOutcome::Used
    });

    // SSH_MSG_UNIMPLEMENTED
    bundle.set_handler(3, |_state, _ty, payload| {
        let mut buf = payload;
        if buf.remaining() >= 4 {
            debug!(
                "received SSH_MSG_UNIMPLEMENTED for sequence number {}",
                buf.get_u32()
            );
        } else {
            warn!("could not parse SSH_MSG_UNIMPLEMENTED packet");
        }
        HandlerOutcome::Used
    });

    // SSH_MSG_DEBUG
    bundle.set_handler(4, |_state, _ty, _payload| {
        trace!("received SSH_MSG_DEBUG");
        HandlerOutcome::Used
    });

    bundle
}
