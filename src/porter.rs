// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The contract between this crate's services and the stanza router.
//!
//! The porter owns the stream: it stamps ids on outgoing iq requests,
//! matches replies back to them, and walks its handler table for every
//! inbound stanza. This crate only consumes the trait; the concrete
//! implementation lives with the connection machinery.

use std::fmt;
use std::io;

use futures::future::LocalBoxFuture;
use jid::{FullJid, Jid};
use minidom::Element;
use tokio_util::sync::CancellationToken;

/// Transport-level failure reported by the porter.
#[derive(Debug)]
pub enum PorterError {
    /// The underlying stream is gone.
    Disconnected,
    /// The operation's cancellation token fired.
    Cancelled,
    /// I/O error on the stream.
    Io(io::Error),
}

impl fmt::Display for PorterError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PorterError::Disconnected => write!(fmt, "disconnected"),
            PorterError::Cancelled => write!(fmt, "operation cancelled"),
            PorterError::Io(e) => write!(fmt, "IO error: {}", e),
        }
    }
}

impl std::error::Error for PorterError {}

impl From<io::Error> for PorterError {
    fn from(e: io::Error) -> Self {
        PorterError::Io(e)
    }
}

/// Top-level stanza kind a handler is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaType {
    Iq,
    Message,
    Presence,
}

impl StanzaType {
    fn element_name(self) -> &'static str {
        match self {
            StanzaType::Iq => "iq",
            StanzaType::Message => "message",
            StanzaType::Presence => "presence",
        }
    }
}

/// Value of the `type` attribute a handler is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaSubtype {
    Get,
    Set,
    Result,
    Error,
}

impl StanzaSubtype {
    fn as_str(self) -> &'static str {
        match self {
            StanzaSubtype::Get => "get",
            StanzaSubtype::Set => "set",
            StanzaSubtype::Result => "result",
            StanzaSubtype::Error => "error",
        }
    }
}

/// Position of a handler in the dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandlerPriority {
    Min,
    Normal,
    Max,
}

/// Opaque registration id, used to unregister a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

/// Structural match deciding whether a handler sees a stanza.
#[derive(Debug, Clone)]
pub struct HandlerFilter {
    /// Stanza kind to match.
    pub stanza: StanzaType,
    /// Required `type` attribute, or `None` to match any.
    pub subtype: Option<StanzaSubtype>,
    /// Only deliver stanzas from this sender; `None` matches anyone.
    pub from: Option<Jid>,
    /// Required direct child, as an (element name, namespace) pair.
    pub child: Option<(&'static str, &'static str)>,
}

impl HandlerFilter {
    /// Filter for iq stanzas of the given subtype carrying the given child.
    pub fn iq(subtype: StanzaSubtype, child: (&'static str, &'static str)) -> HandlerFilter {
        HandlerFilter {
            stanza: StanzaType::Iq,
            subtype: Some(subtype),
            from: None,
            child: Some(child),
        }
    }

    /// Whether `stanza` passes this filter.
    pub fn matches(&self, stanza: &Element) -> bool {
        if stanza.name() != self.stanza.element_name() {
            return false;
        }
        if let Some(subtype) = self.subtype {
            if stanza.attr("type") != Some(subtype.as_str()) {
                return false;
            }
        }
        if let Some(from) = &self.from {
            let matches_from = stanza
                .attr("from")
                .and_then(|a| a.parse::<Jid>().ok())
                .map(|a| a == *from)
                .unwrap_or(false);
            if !matches_from {
                return false;
            }
        }
        if let Some((name, namespace)) = self.child {
            if stanza.get_child(name, namespace).is_none() {
                return false;
            }
        }
        true
    }
}

/// Inbound stanza callback. Returns `true` when the stanza was handled and
/// dispatch should stop.
pub type HandlerCallback = Box<dyn Fn(&Element) -> bool>;

/// Stanza router consumed by the roster engine and the ping controller.
pub trait Porter {
    /// The full JID this session is bound to.
    fn bound_jid(&self) -> &FullJid;

    /// Queues a stanza for sending, fire-and-forget.
    fn send(&self, stanza: Element);

    /// Sends an iq request and resolves with the matching reply, a
    /// transport error, or [`PorterError::Cancelled`] once `token` fires.
    /// Cancellation after the request hit the wire is best-effort: the
    /// server may still apply the change.
    fn send_iq(
        &self,
        stanza: Element,
        token: Option<CancellationToken>,
    ) -> LocalBoxFuture<'static, Result<Element, PorterError>>;

    /// Adds `callback` to the dispatch table. Higher priorities run first;
    /// dispatch stops at the first callback returning `true`.
    fn register_handler(
        &self,
        filter: HandlerFilter,
        priority: HandlerPriority,
        callback: HandlerCallback,
    ) -> HandlerId;

    /// Removes a previously registered handler.
    fn unregister_handler(&self, id: HandlerId);
}
