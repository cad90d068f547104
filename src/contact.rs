// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use jid::{BareJid, FullJid};

use crate::error::Error;

/// Presence-visibility relationship with a contact, RFC 6121 §2.
///
/// `To` and `From` are the two directions; `Both` is their union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    None,
    To,
    From,
    Both,
}

impl Subscription {
    /// Whether we receive the contact's presence (`to` or `both`).
    pub fn is_to(self) -> bool {
        matches!(self, Subscription::To | Subscription::Both)
    }

    /// Whether the contact receives our presence (`from` or `both`).
    pub fn is_from(self) -> bool {
        matches!(self, Subscription::From | Subscription::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Subscription::None => "none",
            Subscription::To => "to",
            Subscription::From => "from",
            Subscription::Both => "both",
        }
    }
}

impl Default for Subscription {
    fn default() -> Subscription {
        Subscription::None
    }
}

impl FromStr for Subscription {
    type Err = Error;

    fn from_str(s: &str) -> Result<Subscription, Error> {
        Ok(match s {
            "none" => Subscription::None,
            "to" => Subscription::To,
            "from" => Subscription::From,
            "both" => Subscription::Both,
            _ => {
                return Err(Error::ParseError(
                    "Unknown value for 'subscription' attribute.",
                ))
            }
        })
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

struct BareContactInner {
    jid: BareJid,
    name: Option<String>,
    subscription: Subscription,
    groups: BTreeSet<String>,
    resources: Vec<Weak<ResourceContactInner>>,
}

/// A roster entry, identified by its bare JID.
///
/// This is a cheap shared handle: `clone` aliases the same record, so a
/// record handed out by the roster keeps reflecting later pushes. Value
/// equality (`==`) compares jid, name, subscription and groups, with
/// groups compared as sets.
#[derive(Clone)]
pub struct BareContact(Rc<RefCell<BareContactInner>>);

impl BareContact {
    /// Creates a contact with no name, no groups and no subscription.
    pub fn new(jid: BareJid) -> BareContact {
        BareContact(Rc::new(RefCell::new(BareContactInner {
            jid,
            name: None,
            subscription: Subscription::None,
            groups: BTreeSet::new(),
            resources: vec![],
        })))
    }

    pub fn jid(&self) -> BareJid {
        self.0.borrow().jid.clone()
    }

    pub fn name(&self) -> Option<String> {
        self.0.borrow().name.clone()
    }

    pub fn set_name(&self, name: Option<String>) {
        let mut inner = self.0.borrow_mut();
        if inner.name != name {
            inner.name = name;
        }
    }

    pub fn subscription(&self) -> Subscription {
        self.0.borrow().subscription
    }

    pub fn set_subscription(&self, subscription: Subscription) {
        let mut inner = self.0.borrow_mut();
        if inner.subscription != subscription {
            inner.subscription = subscription;
        }
    }

    /// The groups this contact is filed under. Order is not significant.
    pub fn groups(&self) -> BTreeSet<String> {
        self.0.borrow().groups.clone()
    }

    pub fn set_groups(&self, groups: BTreeSet<String>) {
        let mut inner = self.0.borrow_mut();
        if inner.groups != groups {
            inner.groups = groups;
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.0.borrow().groups.contains(group)
    }

    /// Adds `group` locally. Adding a group twice is a no-op.
    pub fn add_group(&self, group: &str) {
        self.0.borrow_mut().groups.insert(String::from(group));
    }

    /// Removes `group` locally. Removing an absent group is a no-op.
    pub fn remove_group(&self, group: &str) {
        self.0.borrow_mut().groups.remove(group);
    }

    /// Deep copy: an independent record with the same attributes but no
    /// attached resources.
    pub fn copy(&self) -> BareContact {
        let inner = self.0.borrow();
        BareContact(Rc::new(RefCell::new(BareContactInner {
            jid: inner.jid.clone(),
            name: inner.name.clone(),
            subscription: inner.subscription,
            groups: inner.groups.clone(),
            resources: vec![],
        })))
    }

    /// Whether two handles alias the same record.
    pub fn ptr_eq(a: &BareContact, b: &BareContact) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Attaches a resource projection to this contact. Only a weak
    /// reference is kept: the bare contact outlives its resources, never
    /// the other way around.
    pub fn add_resource(&self, resource: &ResourceContact) {
        self.0.borrow_mut().resources.push(Rc::downgrade(&resource.0));
    }

    pub fn remove_resource(&self, resource: &ResourceContact) {
        self.0
            .borrow_mut()
            .resources
            .retain(|weak| match weak.upgrade() {
                Some(known) => !Rc::ptr_eq(&known, &resource.0),
                None => false,
            });
    }

    /// The currently live resource projections of this contact.
    pub fn resources(&self) -> Vec<ResourceContact> {
        self.0
            .borrow()
            .resources
            .iter()
            .filter_map(Weak::upgrade)
            .map(ResourceContact)
            .collect()
    }
}

impl PartialEq for BareContact {
    fn eq(&self, other: &BareContact) -> bool {
        let a = self.0.borrow();
        let b = other.0.borrow();
        a.jid == b.jid
            && a.name == b.name
            && a.subscription == b.subscription
            && a.groups == b.groups
    }
}

impl fmt::Debug for BareContact {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.0.borrow();
        fmt.debug_struct("BareContact")
            .field("jid", &inner.jid)
            .field("name", &inner.name)
            .field("subscription", &inner.subscription)
            .field("groups", &inner.groups)
            .finish()
    }
}

struct ResourceContactInner {
    bare: BareContact,
    resource: String,
}

/// A specific connected endpoint of a bare contact.
///
/// Immutable once created; the interesting state lives on the bare
/// contact it points back to.
#[derive(Clone)]
pub struct ResourceContact(Rc<ResourceContactInner>);

impl ResourceContact {
    pub fn new(bare: &BareContact, resource: &str) -> ResourceContact {
        ResourceContact(Rc::new(ResourceContactInner {
            bare: bare.clone(),
            resource: String::from(resource),
        }))
    }

    pub fn resource(&self) -> &str {
        &self.0.resource
    }

    pub fn bare_contact(&self) -> BareContact {
        self.0.bare.clone()
    }

    pub fn full_jid(&self) -> FullJid {
        self.0.bare.jid().with_resource(self.0.resource.as_str())
    }
}

impl PartialEq for ResourceContact {
    fn eq(&self, other: &ResourceContact) -> bool {
        self.0.resource == other.0.resource && self.0.bare == other.0.bare
    }
}

impl fmt::Debug for ResourceContact {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ResourceContact")
            .field("jid", &self.full_jid())
            .finish()
    }
}
