// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Client-side XMPP instant-messaging services.
//!
//! This crate implements the session services a client needs on top of an
//! established stream: a server-synchronized replica of the contact list
//! ([`roster::Roster`], RFC 6121), a codec for forms embedded in stanzas
//! ([`data_forms::DataForm`], XEP-0004), and a keepalive controller
//! ([`ping::Ping`], XEP-0199).
//!
//! The stream itself is out of scope. All three services talk to it
//! through the [`porter::Porter`] trait, a stanza router that sends
//! stanzas, matches iq replies to their requests, and dispatches inbound
//! stanzas to registered handlers.
//!
//! Everything runs on a single-threaded event loop: the types here are
//! not `Send`, callbacks and replies are serialized on the loop, and
//! timers are spawned on the current `tokio::task::LocalSet`.

#![deny(bare_trait_objects)]

pub mod contact;
pub mod data_forms;
pub mod error;
pub mod heartbeat;
pub mod iq;
pub mod ns;
pub mod ping;
pub mod porter;
pub mod roster;
pub mod stanza_error;

pub use jid::{BareJid, FullJid, Jid, JidParseError};
pub use minidom::Element;

pub use crate::contact::{BareContact, ResourceContact, Subscription};
pub use crate::data_forms::{DataForm, FormError};
pub use crate::error::Error;
pub use crate::heartbeat::HeartbeatSource;
pub use crate::iq::{Iq, IqType};
pub use crate::ping::Ping;
pub use crate::porter::{Porter, PorterError};
pub use crate::roster::{Roster, RosterError, RosterEvent};
pub use crate::stanza_error::StanzaError;
