// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The roster synchronization engine, RFC 6121 §2.
//!
//! [`Roster`] keeps a live replica of the server-side contact list. The
//! replica is only ever written from the server's point of view: a
//! mutation call sends the change and completes on the server's reply,
//! while the local records are updated by the roster push the server is
//! required to deliver to every connected client, this one included.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::convert::TryFrom;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use jid::{BareJid, Jid};
use log::{debug, warn};
use minidom::Element;
use tokio_util::sync::CancellationToken;

use crate::contact::{BareContact, Subscription};
use crate::iq::{Iq, IqType};
use crate::ns;
use crate::porter::{
    HandlerFilter, HandlerId, HandlerPriority, Porter, PorterError, StanzaSubtype,
};
use crate::stanza_error::{DefinedCondition, ErrorType, StanzaError};

const GOOGLE_ROSTER_VERSION: &str = "2";

/// Error completing a roster operation.
#[derive(Debug)]
pub enum RosterError {
    /// A structurally malformed roster stanza.
    InvalidStanza(&'static str),
    /// The operation refers to a contact unknown to the engine.
    NotInRoster(BareJid),
    /// A fetch is already in flight.
    Pending,
    /// Transport failure, propagated from the porter.
    Porter(PorterError),
    /// The server answered the operation with a stanza error.
    Stanza(StanzaError),
}

impl fmt::Display for RosterError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RosterError::InvalidStanza(s) => write!(fmt, "invalid roster stanza: {}", s),
            RosterError::NotInRoster(jid) => write!(fmt, "{} is not in the roster", jid),
            RosterError::Pending => write!(fmt, "another fetch operation is pending"),
            RosterError::Porter(e) => write!(fmt, "porter error: {}", e),
            RosterError::Stanza(e) => write!(fmt, "stanza error: {}", e),
        }
    }
}

impl std::error::Error for RosterError {}

impl From<PorterError> for RosterError {
    fn from(e: PorterError) -> Self {
        RosterError::Porter(e)
    }
}

/// A change to the replica, reported to observers in stanza arrival order.
#[derive(Debug)]
pub enum RosterEvent {
    /// The server announced a contact we didn't know about.
    Added(BareContact),
    /// A push removed a contact. The record stays usable but is no longer
    /// tracked by the engine.
    Removed(BareContact),
}

/// Handle to a registered observer, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

struct RosterInner {
    porter: Rc<dyn Porter>,
    items: RefCell<HashMap<BareJid, BareContact>>,
    fetching: Cell<bool>,
    observers: RefCell<Vec<(u64, Box<dyn Fn(&RosterEvent)>)>>,
    next_observer: Cell<u64>,
}

/// The client-side replica of the server roster.
pub struct Roster {
    inner: Rc<RosterInner>,
    handler: HandlerId,
}

/// Clears the fetch-in-flight slot however the fetch ends, including the
/// caller dropping the future mid-way.
struct FetchGuard<'a>(&'a Cell<bool>);

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Roster {
    /// Creates the engine and registers its push handler on the porter.
    /// The replica starts empty; call [`Roster::fetch`] to populate it.
    pub fn new(porter: Rc<dyn Porter>) -> Roster {
        let inner = Rc::new(RosterInner {
            porter: Rc::clone(&porter),
            items: RefCell::new(HashMap::new()),
            fetching: Cell::new(false),
            observers: RefCell::new(vec![]),
            next_observer: Cell::new(1),
        });
        let weak = Rc::downgrade(&inner);
        let handler = porter.register_handler(
            HandlerFilter::iq(StanzaSubtype::Set, ("query", ns::ROSTER)),
            HandlerPriority::Normal,
            Box::new(move |stanza| match weak.upgrade() {
                Some(inner) => inner.handle_push(stanza),
                None => false,
            }),
        );
        Roster { inner, handler }
    }

    /// Registers an observer for [`RosterEvent`]s. Observers run
    /// synchronously, in the same turn as the stanza that caused the
    /// change.
    pub fn observe<F: Fn(&RosterEvent) + 'static>(&self, observer: F) -> ObserverId {
        let id = self.inner.next_observer.get();
        self.inner.next_observer.set(id + 1);
        self.inner
            .observers
            .borrow_mut()
            .push((id, Box::new(observer)));
        ObserverId(id)
    }

    pub fn unobserve(&self, id: ObserverId) {
        self.inner
            .observers
            .borrow_mut()
            .retain(|(oid, _)| *oid != id.0);
    }

    /// The tracked record for `jid`, if any. Never suspends.
    pub fn contact(&self, jid: &BareJid) -> Option<BareContact> {
        self.inner.items.borrow().get(jid).cloned()
    }

    /// Snapshot of all tracked records. Never suspends.
    pub fn contacts(&self) -> Vec<BareContact> {
        self.inner.items.borrow().values().cloned().collect()
    }

    /// Requests the full roster from the server and replaces the replica
    /// with the reply. At most one fetch may be in flight; a second call
    /// fails with [`RosterError::Pending`].
    pub async fn fetch(&self, token: Option<CancellationToken>) -> Result<(), RosterError> {
        if self.inner.fetching.get() {
            return Err(RosterError::Pending);
        }
        self.inner.fetching.set(true);
        let _guard = FetchGuard(&self.inner.fetching);

        let query = Element::builder("query").ns(ns::ROSTER).build();
        let reply = self.inner.porter.send_iq(Iq::get(query).into(), token).await?;
        self.inner.update(&reply)
    }

    /// Asks the server to add a contact. Completes once the server
    /// acknowledges; the record itself appears through the resulting push.
    /// Immediate success if the jid is already tracked.
    pub async fn add_contact(
        &self,
        jid: BareJid,
        name: Option<String>,
        groups: BTreeSet<String>,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        if self.inner.items.borrow().contains_key(&jid) {
            debug!("{} is already in the roster", jid);
            return Ok(());
        }
        let item = item_element(&jid, name, Subscription::None, &groups);
        self.change(item, token).await
    }

    /// Asks the server to remove a contact from the roster.
    pub async fn remove_contact(
        &self,
        contact: &BareContact,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        self.check_known(contact)?;
        let item = Element::builder("item")
            .ns(ns::ROSTER)
            .attr("jid", String::from(contact.jid()))
            .attr("subscription", "remove")
            .build();
        self.change(item, token).await
    }

    /// Changes a contact's display name. Immediate success if the name is
    /// already `name`.
    pub async fn rename_contact(
        &self,
        contact: &BareContact,
        name: &str,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        self.check_known(contact)?;
        if contact.name().as_deref() == Some(name) {
            debug!("no need to rename {}", contact.jid());
            return Ok(());
        }
        let item = item_element(
            &contact.jid(),
            Some(String::from(name)),
            contact.subscription(),
            &contact.groups(),
        );
        self.change(item, token).await
    }

    /// Files a contact under an additional group. Immediate success if the
    /// contact is already in `group`.
    pub async fn add_group(
        &self,
        contact: &BareContact,
        group: &str,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        self.check_known(contact)?;
        if contact.in_group(group) {
            debug!("{} is already in group {}", contact.jid(), group);
            return Ok(());
        }
        let mut groups = contact.groups();
        groups.insert(String::from(group));
        let item = item_element(
            &contact.jid(),
            contact.name(),
            contact.subscription(),
            &groups,
        );
        self.change(item, token).await
    }

    /// Removes a contact from a group. Immediate success if the contact is
    /// not in `group`.
    pub async fn remove_group(
        &self,
        contact: &BareContact,
        group: &str,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        self.check_known(contact)?;
        if !contact.in_group(group) {
            debug!("{} is not in group {}", contact.jid(), group);
            return Ok(());
        }
        let mut groups = contact.groups();
        groups.remove(group);
        let item = item_element(
            &contact.jid(),
            contact.name(),
            contact.subscription(),
            &groups,
        );
        self.change(item, token).await
    }

    /// The operation refers to this exact record, not merely an equal one.
    fn check_known(&self, contact: &BareContact) -> Result<(), RosterError> {
        let known = self
            .inner
            .items
            .borrow()
            .get(&contact.jid())
            .map(|known| BareContact::ptr_eq(known, contact))
            .unwrap_or(false);
        if known {
            Ok(())
        } else {
            Err(RosterError::NotInRoster(contact.jid()))
        }
    }

    async fn change(
        &self,
        item: Element,
        token: Option<CancellationToken>,
    ) -> Result<(), RosterError> {
        let query = Element::builder("query").ns(ns::ROSTER).append(item).build();
        let reply = self
            .inner
            .porter
            .send_iq(Iq::set(query).into(), token)
            .await?;
        // The replica is not touched here: the server sends a push to every
        // connected resource before acking, and that push carries the
        // authoritative state.
        match Iq::try_from(&reply) {
            Ok(Iq {
                payload: IqType::Error(error),
                ..
            }) => Err(RosterError::Stanza(error)),
            Ok(_) => Ok(()),
            Err(_) => Err(RosterError::InvalidStanza("reply is not an iq element")),
        }
    }
}

impl Drop for Roster {
    fn drop(&mut self) {
        self.inner.porter.unregister_handler(self.handler);
    }
}

impl RosterInner {
    fn handle_push(&self, stanza: &Element) -> bool {
        if !self.push_allowed(stanza) {
            debug!(
                "ignoring roster push from {}",
                stanza.attr("from").unwrap_or("<none>")
            );
            return true;
        }

        if stanza.attr("gr:ext") == Some(GOOGLE_ROSTER_VERSION) {
            // Recognized, but carries no extra semantics until the google
            // roster negotiation is wired up.
            debug!("roster push carries the google roster extension");
        }

        let reply = match self.update(stanza) {
            Ok(()) => Iq::result_of(stanza),
            Err(err) => {
                warn!("failed to apply roster push: {}", err);
                Iq::error_of(
                    stanza,
                    StanzaError::new(ErrorType::Modify, DefinedCondition::BadRequest),
                )
            }
        };
        self.porter.send(reply.into());
        true
    }

    /// Only the user's own bare JID or the user's server may push roster
    /// changes; anything else could impersonate the server. A push with no
    /// `from` comes from our own stream and is trusted.
    fn push_allowed(&self, stanza: &Element) -> bool {
        let from = match stanza.attr("from") {
            None => return true,
            Some(from) => from,
        };
        let own = self.porter.bound_jid();
        match Jid::from_str(from) {
            Ok(Jid::Bare(bare)) => {
                (bare.node == own.node && bare.domain == own.domain)
                    || (bare.node.is_none() && bare.domain == own.domain)
            }
            // a legitimate push never carries a resource in its from
            Ok(Jid::Full(_)) | Err(_) => false,
        }
    }

    /// Applies a roster query to the replica. Malformed items are skipped
    /// so that one bad item doesn't invalidate the rest of the roster.
    fn update(&self, stanza: &Element) -> Result<(), RosterError> {
        let query = stanza
            .get_child("query", ns::ROSTER)
            .ok_or(RosterError::InvalidStanza("iq without a roster query child"))?;

        let mut events = vec![];
        for item in query.children() {
            if item.name() != "item" {
                debug!("{} is not an item element, skipping", item.name());
                continue;
            }

            let jid = match item.attr("jid") {
                Some(jid) => jid,
                None => {
                    debug!("item without a jid attribute, skipping");
                    continue;
                }
            };
            if jid.contains('/') {
                debug!("item jid {} carries a resource, skipping", jid);
                continue;
            }
            let jid = match BareJid::from_str(jid) {
                Ok(jid) => jid,
                Err(err) => {
                    debug!("unparseable item jid {}: {}, skipping", jid, err);
                    continue;
                }
            };

            let subscription = match item.attr("subscription") {
                Some("remove") => {
                    match self.items.borrow_mut().remove(&jid) {
                        Some(contact) => events.push(RosterEvent::Removed(contact)),
                        None => debug!("{} is not in the roster; can't remove it", jid),
                    }
                    continue;
                }
                Some(value) => match Subscription::from_str(value) {
                    Ok(subscription) => subscription,
                    Err(_) => {
                        debug!("unknown subscription {}, skipping", value);
                        continue;
                    }
                },
                None => {
                    debug!("item without a subscription attribute, skipping");
                    continue;
                }
            };

            let name = item.attr("name").map(String::from);
            let groups: BTreeSet<String> = item
                .children()
                .filter(|child| child.name() == "group")
                .map(Element::text)
                .collect();

            let mut items = self.items.borrow_mut();
            match items.get(&jid) {
                Some(contact) => {
                    // Known contact: refresh in place, no event.
                    contact.set_name(name);
                    contact.set_subscription(subscription);
                    contact.set_groups(groups);
                }
                None => {
                    let contact = BareContact::new(jid.clone());
                    contact.set_name(name);
                    contact.set_subscription(subscription);
                    contact.set_groups(groups);
                    items.insert(jid, contact.clone());
                    events.push(RosterEvent::Added(contact));
                }
            }
        }

        // Fan out with the items map released, so observers may query the
        // roster freely.
        for event in &events {
            self.emit(event);
        }
        Ok(())
    }

    fn emit(&self, event: &RosterEvent) {
        for (_, observer) in self.observers.borrow().iter() {
            observer(event);
        }
    }
}

fn item_element(
    jid: &BareJid,
    name: Option<String>,
    subscription: Subscription,
    groups: &BTreeSet<String>,
) -> Element {
    let mut builder = Element::builder("item")
        .ns(ns::ROSTER)
        .attr("jid", String::from(jid.clone()));
    if let Some(name) = name {
        builder = builder.attr("name", name);
    }
    if subscription != Subscription::None {
        builder = builder.attr("subscription", subscription.as_str());
    }
    for group in groups {
        builder = builder.append(
            Element::builder("group")
                .ns(ns::ROSTER)
                .append(group.clone())
                .build(),
        );
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::porter::mock::MockPorter;
    use futures::{pin_mut, poll};
    use std::rc::Rc;

    fn engine() -> (Rc<MockPorter>, Roster) {
        let porter = MockPorter::new("juliet@example.com/balcony");
        let roster = Roster::new(porter.clone() as Rc<dyn Porter>);
        (porter, roster)
    }

    fn jid(s: &str) -> BareJid {
        BareJid::from_str(s).unwrap()
    }

    fn record_events(roster: &Roster) -> Rc<RefCell<Vec<(String, BareJid)>>> {
        let log = Rc::new(RefCell::new(vec![]));
        let seen = Rc::clone(&log);
        roster.observe(move |event| {
            let entry = match event {
                RosterEvent::Added(c) => (String::from("added"), c.jid()),
                RosterEvent::Removed(c) => (String::from("removed"), c.jid()),
            };
            seen.borrow_mut().push(entry);
        });
        log
    }

    fn two_contact_reply() -> Element {
        "<iq xmlns='jabber:client' type='result'>
            <query xmlns='jabber:iq:roster'>
                <item jid='a@x' name='A' subscription='both'><group>g1</group></item>
                <item jid='b@x' subscription='to'/>
            </query>
        </iq>"
            .parse()
            .unwrap()
    }

    async fn populated() -> (Rc<MockPorter>, Roster) {
        let (porter, roster) = engine();
        porter.expect_reply(two_contact_reply());
        roster.fetch(None).await.unwrap();
        (porter, roster)
    }

    #[tokio::test]
    async fn test_fetch_two_contacts() {
        let (porter, roster) = engine();
        let events = record_events(&roster);

        porter.expect_reply(two_contact_reply());
        roster.fetch(None).await.unwrap();

        let request = &porter.iq_requests.borrow()[0];
        assert_eq!(request.attr("type"), Some("get"));
        assert!(request.get_child("query", ns::ROSTER).is_some());

        let a = roster.contact(&jid("a@x")).unwrap();
        assert_eq!(a.name().unwrap(), "A");
        assert_eq!(a.subscription(), Subscription::Both);
        assert!(a.in_group("g1"));
        assert_eq!(a.groups().len(), 1);

        let b = roster.contact(&jid("b@x")).unwrap();
        assert_eq!(b.name(), None);
        assert_eq!(b.subscription(), Subscription::To);
        assert!(b.groups().is_empty());

        assert_eq!(
            *events.borrow(),
            vec![
                (String::from("added"), jid("a@x")),
                (String::from("added"), jid("b@x")),
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_skips_malformed_items() {
        let (porter, roster) = engine();
        porter.expect_reply(
            "<iq xmlns='jabber:client' type='result'>
                <query xmlns='jabber:iq:roster'>
                    <item name='no jid'/>
                    <item jid='a@x/balcony' subscription='both'/>
                    <item jid='b@x' subscription='coucou'/>
                    <item jid='c@x'/>
                    <item jid='d@x' subscription='from'/>
                </query>
            </iq>"
                .parse()
                .unwrap(),
        );
        roster.fetch(None).await.unwrap();

        let contacts = roster.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].jid(), jid("d@x"));
        for contact in contacts {
            let as_string = String::from(contact.jid());
            assert!(!as_string.is_empty());
            assert!(!as_string.contains('/'));
        }
    }

    #[tokio::test]
    async fn test_fetch_without_query_child() {
        let (porter, roster) = engine();
        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        match roster.fetch(None).await.unwrap_err() {
            RosterError::InvalidStanza(_) => (),
            other => panic!("unexpected error: {}", other),
        }
        // the failed fetch released its slot
        porter.expect_reply(two_contact_reply());
        roster.fetch(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_double_fetch() {
        let (_porter, roster) = engine();

        // no scripted reply: the first fetch stays in flight
        let first = roster.fetch(None);
        pin_mut!(first);
        assert!(poll!(first.as_mut()).is_pending());

        match roster.fetch(None).await.unwrap_err() {
            RosterError::Pending => (),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_updates_existing_contact_without_event() {
        let (porter, roster) = populated().await;
        let events = record_events(&roster);
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply(
            "<iq xmlns='jabber:client' type='result'>
                <query xmlns='jabber:iq:roster'>
                    <item jid='a@x' name='Ann' subscription='to'><group>g2</group></item>
                </query>
            </iq>"
                .parse()
                .unwrap(),
        );
        roster.fetch(None).await.unwrap();

        // same record, refreshed in place
        assert_eq!(a.name().unwrap(), "Ann");
        assert_eq!(a.subscription(), Subscription::To);
        assert!(a.in_group("g2"));
        assert!(!a.in_group("g1"));
        assert!(events.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_push_adds_contact() {
        let (porter, roster) = populated().await;
        let events = record_events(&roster);

        let push: Element = "<iq xmlns='jabber:client' type='set' id='push1'>
            <query xmlns='jabber:iq:roster'>
                <item jid='c@x' subscription='none'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        assert!(porter.dispatch(&push));

        assert!(roster.contact(&jid("c@x")).is_some());
        assert_eq!(
            *events.borrow(),
            vec![(String::from("added"), jid("c@x"))]
        );

        // the push was acked
        let sent = porter.sent.borrow();
        let reply = sent.last().unwrap();
        assert_eq!(reply.attr("type"), Some("result"));
        assert_eq!(reply.attr("id"), Some("push1"));
    }

    #[tokio::test]
    async fn test_push_removal() {
        let (porter, roster) = populated().await;
        let events = record_events(&roster);
        let a = roster.contact(&jid("a@x")).unwrap();

        let push: Element = "<iq xmlns='jabber:client' type='set' id='push2'>
            <query xmlns='jabber:iq:roster'>
                <item jid='a@x' subscription='remove'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        assert!(porter.dispatch(&push));

        assert!(roster.contact(&jid("a@x")).is_none());
        assert_eq!(
            *events.borrow(),
            vec![(String::from("removed"), jid("a@x"))]
        );
        // the removed record is still usable by holders
        assert_eq!(a.jid(), jid("a@x"));

        let sent = porter.sent.borrow();
        let reply = sent.last().unwrap();
        assert_eq!(reply.attr("type"), Some("result"));
        assert_eq!(reply.attr("id"), Some("push2"));
    }

    #[tokio::test]
    async fn test_push_from_elsewhere_is_ignored() {
        let (porter, roster) = populated().await;

        let push: Element = "<iq xmlns='jabber:client' type='set' from='mallory@evil.example'>
            <query xmlns='jabber:iq:roster'>
                <item jid='mallory@evil.example' subscription='both'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        assert!(porter.dispatch(&push));

        assert!(roster.contact(&jid("mallory@evil.example")).is_none());
        assert!(porter.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_push_with_resource_is_ignored() {
        let (porter, roster) = populated().await;

        // node and domain match the bound jid, but a resource is present
        let own_full: Element =
            "<iq xmlns='jabber:client' type='set' from='juliet@example.com/balcony'>
                <query xmlns='jabber:iq:roster'>
                    <item jid='c@x' subscription='none'/>
                </query>
            </iq>"
                .parse()
                .unwrap();
        assert!(porter.dispatch(&own_full));
        assert!(roster.contact(&jid("c@x")).is_none());

        let impersonator: Element =
            "<iq xmlns='jabber:client' type='set' from='example.com/mallory'>
                <query xmlns='jabber:iq:roster'>
                    <item jid='d@x' subscription='none'/>
                </query>
            </iq>"
                .parse()
                .unwrap();
        assert!(porter.dispatch(&impersonator));
        assert!(roster.contact(&jid("d@x")).is_none());
        assert!(porter.sent.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_push_from_own_jid_or_server() {
        let (porter, roster) = populated().await;

        let own: Element = "<iq xmlns='jabber:client' type='set' from='juliet@example.com'>
            <query xmlns='jabber:iq:roster'>
                <item jid='c@x' subscription='none'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        porter.dispatch(&own);
        assert!(roster.contact(&jid("c@x")).is_some());

        let server: Element = "<iq xmlns='jabber:client' type='set' from='example.com'>
            <query xmlns='jabber:iq:roster'>
                <item jid='d@x' subscription='none'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        porter.dispatch(&server);
        assert!(roster.contact(&jid("d@x")).is_some());
    }

    #[tokio::test]
    async fn test_empty_push_is_acked() {
        let (porter, roster) = populated().await;

        let push: Element = "<iq xmlns='jabber:client' type='set' id='push3'>
            <query xmlns='jabber:iq:roster'/>
        </iq>"
            .parse()
            .unwrap();
        assert!(porter.dispatch(&push));
        assert_eq!(porter.sent.borrow().last().unwrap().attr("type"), Some("result"));

        assert_eq!(roster.contacts().len(), 2);
    }

    #[tokio::test]
    async fn test_add_contact() {
        let (porter, roster) = populated().await;

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        let mut groups = BTreeSet::new();
        groups.insert(String::from("Friends"));
        roster
            .add_contact(jid("c@x"), Some(String::from("C")), groups, None)
            .await
            .unwrap();

        let requests = porter.iq_requests.borrow();
        let request = requests.last().unwrap();
        assert_eq!(request.attr("type"), Some("set"));
        let query = request.get_child("query", ns::ROSTER).unwrap();
        let item = query.get_child("item", ns::ROSTER).unwrap();
        assert_eq!(item.attr("jid"), Some("c@x"));
        assert_eq!(item.attr("name"), Some("C"));
        assert_eq!(item.attr("subscription"), None);
        let groups: Vec<_> = item.children().map(Element::text).collect();
        assert_eq!(groups, vec![String::from("Friends")]);

        // the replica is unchanged until the push arrives
        assert!(roster.contact(&jid("c@x")).is_none());
    }

    #[tokio::test]
    async fn test_add_contact_already_present() {
        let (porter, roster) = populated().await;
        let before = porter.iq_requests.borrow().len();
        roster
            .add_contact(jid("a@x"), None, BTreeSet::new(), None)
            .await
            .unwrap();
        assert_eq!(porter.iq_requests.borrow().len(), before);
    }

    #[tokio::test]
    async fn test_remove_contact() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.remove_contact(&a, None).await.unwrap();

        let requests = porter.iq_requests.borrow();
        let item = requests
            .last()
            .unwrap()
            .get_child("query", ns::ROSTER)
            .unwrap()
            .get_child("item", ns::ROSTER)
            .unwrap();
        assert_eq!(item.attr("jid"), Some("a@x"));
        assert_eq!(item.attr("subscription"), Some("remove"));
        assert_eq!(item.children().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_contact_not_in_roster() {
        let (_porter, roster) = populated().await;
        let stranger = BareContact::new(jid("stranger@x"));
        match roster.remove_contact(&stranger, None).await.unwrap_err() {
            RosterError::NotInRoster(j) => assert_eq!(j, jid("stranger@x")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_detached_equal_record_is_not_in_roster() {
        let (_porter, roster) = populated().await;
        let copy = roster.contact(&jid("a@x")).unwrap().copy();
        match roster.rename_contact(&copy, "B", None).await.unwrap_err() {
            RosterError::NotInRoster(_) => (),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_rename_noop() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();
        let before = porter.iq_requests.borrow().len();
        roster.rename_contact(&a, "A", None).await.unwrap();
        assert_eq!(porter.iq_requests.borrow().len(), before);
    }

    #[tokio::test]
    async fn test_rename_contact() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.rename_contact(&a, "Ann", None).await.unwrap();

        let requests = porter.iq_requests.borrow();
        let item = requests
            .last()
            .unwrap()
            .get_child("query", ns::ROSTER)
            .unwrap()
            .get_child("item", ns::ROSTER)
            .unwrap();
        assert_eq!(item.attr("name"), Some("Ann"));
        assert_eq!(item.attr("subscription"), Some("both"));
        // the local record still carries the old name
        assert_eq!(a.name().unwrap(), "A");
    }

    #[tokio::test]
    async fn test_add_group() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.add_group(&a, "g2", None).await.unwrap();

        let requests = porter.iq_requests.borrow();
        let item = requests
            .last()
            .unwrap()
            .get_child("query", ns::ROSTER)
            .unwrap()
            .get_child("item", ns::ROSTER)
            .unwrap();
        let mut groups: Vec<_> = item.children().map(Element::text).collect();
        groups.sort();
        assert_eq!(groups, vec![String::from("g1"), String::from("g2")]);

        // no-op path
        let before = porter.iq_requests.borrow().len();
        drop(requests);
        roster.add_group(&a, "g1", None).await.unwrap();
        assert_eq!(porter.iq_requests.borrow().len(), before);
    }

    #[tokio::test]
    async fn test_remove_group() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.remove_group(&a, "g1", None).await.unwrap();

        let requests = porter.iq_requests.borrow();
        let item = requests
            .last()
            .unwrap()
            .get_child("query", ns::ROSTER)
            .unwrap()
            .get_child("item", ns::ROSTER)
            .unwrap();
        assert_eq!(item.attr("jid"), Some("a@x"));
        assert_eq!(item.children().count(), 0);
        drop(requests);

        // removing an absent group is a no-op
        let before = porter.iq_requests.borrow().len();
        roster.remove_group(&a, "coucou", None).await.unwrap();
        assert_eq!(porter.iq_requests.borrow().len(), before);
    }

    #[tokio::test]
    async fn test_group_membership_follows_push() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.add_group(&a, "g2", None).await.unwrap();

        // the server-side push materializes the change
        let push: Element = "<iq xmlns='jabber:client' type='set'>
            <query xmlns='jabber:iq:roster'>
                <item jid='a@x' name='A' subscription='both'>
                    <group>g1</group><group>g2</group>
                </item>
            </query>
        </iq>"
            .parse()
            .unwrap();
        porter.dispatch(&push);
        assert!(a.in_group("g2"));

        porter.expect_reply("<iq xmlns='jabber:client' type='result'/>".parse().unwrap());
        roster.remove_group(&a, "g2", None).await.unwrap();
        let push: Element = "<iq xmlns='jabber:client' type='set'>
            <query xmlns='jabber:iq:roster'>
                <item jid='a@x' name='A' subscription='both'><group>g1</group></item>
            </query>
        </iq>"
            .parse()
            .unwrap();
        porter.dispatch(&push);
        assert!(!a.in_group("g2"));
    }

    #[tokio::test]
    async fn test_mutation_stanza_error() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_reply(
            "<iq xmlns='jabber:client' type='error'>
                <error type='cancel'>
                    <not-allowed xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/>
                </error>
            </iq>"
                .parse()
                .unwrap(),
        );
        match roster.rename_contact(&a, "Ann", None).await.unwrap_err() {
            RosterError::Stanza(error) => {
                assert_eq!(error.defined_condition, DefinedCondition::NotAllowed);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let (porter, roster) = populated().await;
        let a = roster.contact(&jid("a@x")).unwrap();

        porter.expect_failure(PorterError::Disconnected);
        match roster.rename_contact(&a, "Ann", None).await.unwrap_err() {
            RosterError::Porter(PorterError::Disconnected) => (),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_cancelled_fetch() {
        let (_porter, roster) = engine();
        let token = CancellationToken::new();
        token.cancel();
        match roster.fetch(Some(token)).await.unwrap_err() {
            RosterError::Porter(PorterError::Cancelled) => (),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_unregisters_handler() {
        let (porter, roster) = populated().await;
        drop(roster);

        let push: Element = "<iq xmlns='jabber:client' type='set'>
            <query xmlns='jabber:iq:roster'>
                <item jid='c@x' subscription='none'/>
            </query>
        </iq>"
            .parse()
            .unwrap();
        assert!(!porter.dispatch(&push));
    }
}
