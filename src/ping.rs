// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XEP-0199 pings and keepalives.

use std::rc::Rc;

use log::debug;
use minidom::Element;

use crate::heartbeat::HeartbeatSource;
use crate::iq::Iq;
use crate::ns;
use crate::porter::{HandlerFilter, HandlerId, HandlerPriority, Porter, StanzaSubtype};

/// Keepalive controller: answers inbound pings and, when armed with a
/// non-zero interval, pings the peer once per interval.
pub struct Ping {
    porter: Rc<dyn Porter>,
    handler: HandlerId,
    heartbeat: HeartbeatSource,
}

impl Ping {
    /// Installs the ping responder and arms the keepalive timer.
    /// `ping_interval` is in seconds; 0 disables outbound pings while
    /// keeping the responder installed.
    ///
    /// Must be created from within a `tokio::task::LocalSet`.
    pub fn new(porter: Rc<dyn Porter>, ping_interval: u64) -> Ping {
        let reply_porter = Rc::clone(&porter);
        let handler = porter.register_handler(
            HandlerFilter::iq(StanzaSubtype::Get, ("ping", ns::PING)),
            HandlerPriority::Normal,
            Box::new(move |stanza| {
                debug!(
                    "replying to ping from {}",
                    stanza.attr("from").unwrap_or("<none>")
                );
                reply_porter.send(Iq::result_of(stanza).into());
                true
            }),
        );

        let ping_porter = Rc::clone(&porter);
        let heartbeat = HeartbeatSource::new(
            ping_interval,
            ping_interval,
            Box::new(move || send_ping(&ping_porter)),
        );

        Ping {
            porter,
            handler,
            heartbeat,
        }
    }

    /// Changes the keepalive cadence; 0 disables outbound pings.
    pub fn set_interval(&self, ping_interval: u64) {
        debug!("updated ping interval to {}", ping_interval);
        self.heartbeat.update_interval(ping_interval, ping_interval);
    }
}

impl Drop for Ping {
    fn drop(&mut self) {
        self.porter.unregister_handler(self.handler);
    }
}

fn send_ping(porter: &Rc<dyn Porter>) {
    let ping = Element::builder("ping").ns(ns::PING).build();
    debug!("pinging");
    let reply = porter.send_iq(Iq::get(ping).into(), None);
    // Keepalive only: whatever comes back is uninteresting, and pending
    // replies are cancelled by the porter on teardown.
    tokio::task::spawn_local(async move {
        let _ = reply.await;
    });
}
