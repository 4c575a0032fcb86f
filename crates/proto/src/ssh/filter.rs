//! Incoming packet filter.
//!
//! Before a reassembled packet reaches the dispatcher, the filter
//! checks its type against the current session, key-exchange and
//! authentication phases and classifies it:
//!
//! - [`FilterVerdict::Allowed`] - dispatch the packet
//! - [`FilterVerdict::Denied`] - protocol violation; the session is
//!   aborted
//! - [`FilterVerdict::Unknown`] - unknown type; reply UNIMPLEMENTED and
//!   continue
//!
//! Role rejection is part of the same check: messages whose semantics
//! are server-only are denied on a client and vice versa.
//!
//! The classification is deterministic for every (phase-tuple, type)
//! pair.

use tracing::trace;

use crate::ssh::message::MessageType;
use crate::ssh::session::{
    AuthPhase, AuthServicePhase, GlobalRequestPhase, KexPhase, Role, SessionPhase, SessionState,
};

/// Filter classification for one incoming packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    /// The packet is expected in the current phase.
    Allowed,
    /// The packet arrived in the wrong phase or on the wrong role.
    Denied,
    /// The packet type is not known to the filter.
    Unknown,
}

/// Classifies the packet currently held in the session against the
/// session phases.
pub fn incoming_filter(state: &SessionState) -> FilterVerdict {
    let ty = state.in_packet().ty;
    trace!("filtering packet type {}", ty);

    let msg = match MessageType::from_u8(ty) {
        Some(msg) => msg,
        None => return FilterVerdict::Unknown,
    };

    let session = state.session_phase();
    let kex = state.kex_phase();
    let auth = state.auth_phase();

    let allowed = match msg {
        // Always allowed, in any phase.
        MessageType::Disconnect
        | MessageType::Ignore
        | MessageType::Unimplemented
        | MessageType::Debug => true,

        // Server only; transport must be established.
        MessageType::ServiceRequest => {
            state.role() == Role::Server
                && matches!(
                    session,
                    SessionPhase::Authenticating | SessionPhase::Authenticated
                )
                && kex == KexPhase::Finished
        }

        // As SERVICE_REQUEST, plus our request must be outstanding.
        MessageType::ServiceAccept => {
            matches!(
                session,
                SessionPhase::Authenticating | SessionPhase::Authenticated
            ) && kex == KexPhase::Finished
                && state.auth_service() == AuthServicePhase::Sent
        }

        MessageType::ExtInfo => {
            session == SessionPhase::Authenticating && kex == KexPhase::Finished
        }

        // Initial exchange, or a re-exchange once authenticated.
        MessageType::KexInit => {
            matches!(
                session,
                SessionPhase::InitialKex | SessionPhase::Authenticated
            ) && matches!(kex, KexPhase::Init | KexPhase::Finished)
        }

        MessageType::NewKeys => session == SessionPhase::Dh && kex == KexPhase::NewkeysSent,

        // Server only.
        MessageType::KexdhInit => {
            state.role() == Role::Server && session == SessionPhase::Dh && kex == KexPhase::Init
        }

        MessageType::KexdhReply => session == SessionPhase::Dh && kex == KexPhase::InitSent,

        // Group-exchange variants are confined to the DH phase.
        MessageType::KexDhGexInit | MessageType::KexDhGexReply | MessageType::KexDhGexRequest => {
            session == SessionPhase::Dh
        }

        // Server only.
        MessageType::UserauthRequest => {
            state.role() == Role::Server
                && kex == KexPhase::Finished
                && session == SessionPhase::Authenticating
        }

        // Client only.
        MessageType::UserauthFailure => {
            state.role() == Role::Client
                && kex == KexPhase::Finished
                && session == SessionPhase::Authenticating
        }

        // Client only; an authentication request must be outstanding.
        MessageType::UserauthSuccess => {
            state.role() == Role::Client
                && kex == KexPhase::Finished
                && session == SessionPhase::Authenticating
                && matches!(
                    auth,
                    AuthPhase::KbdintSent
                        | AuthPhase::PubkeyAuthSent
                        | AuthPhase::PasswordAuthSent
                        | AuthPhase::GssapiMicSent
                        | AuthPhase::NoneSent
                )
        }

        // Client only.
        MessageType::UserauthBanner => {
            state.role() == Role::Client && session == SessionPhase::Authenticating
        }

        // Type 60 is PK_OK / PASSWD_CHANGEREQ / INFO_REQUEST /
        // GSSAPI_RESPONSE, disambiguated by the auth sub-phase.
        MessageType::UserauthPkOk => {
            session == SessionPhase::Authenticating
                && matches!(
                    auth,
                    AuthPhase::KbdintSent
                        | AuthPhase::PubkeyOfferSent
                        | AuthPhase::GssapiRequestSent
                )
        }

        // Type 61 is INFO_RESPONSE / GSSAPI_TOKEN.
        MessageType::UserauthInfoResponse => {
            session == SessionPhase::Authenticating
                && matches!(auth, AuthPhase::Info | AuthPhase::GssapiToken)
        }

        // Not filtered.
        MessageType::UserauthGssapiExchangeComplete
        | MessageType::UserauthGssapiError
        | MessageType::UserauthGssapiErrtok => true,

        // Server only.
        MessageType::UserauthGssapiMic => {
            state.role() == Role::Server
                && kex == KexPhase::Finished
                && session == SessionPhase::Authenticating
        }

        MessageType::GlobalRequest => session == SessionPhase::Authenticated,

        // Our global request must be outstanding.
        MessageType::RequestSuccess | MessageType::RequestFailure => {
            session == SessionPhase::Authenticated
                && state.global_request() == GlobalRequestPhase::Pending
        }

        MessageType::ChannelOpen
        | MessageType::ChannelOpenConfirmation
        | MessageType::ChannelOpenFailure
        | MessageType::ChannelWindowAdjust
        | MessageType::ChannelData
        | MessageType::ChannelExtendedData
        | MessageType::ChannelEof
        | MessageType::ChannelClose
        | MessageType::ChannelRequest
        | MessageType::ChannelSuccess
        | MessageType::ChannelFailure => session == SessionPhase::Authenticated,
    };

    if allowed {
        FilterVerdict::Allowed
    } else {
        FilterVerdict::Denied
    }
}
