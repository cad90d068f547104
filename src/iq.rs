// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::convert::TryFrom;
use std::str::FromStr;

use jid::Jid;
use minidom::Element;

use crate::error::Error;
use crate::ns;
use crate::stanza_error::StanzaError;

/// The payload of an `<iq/>`, determined by its `type` attribute.
#[derive(Debug, Clone)]
pub enum IqType {
    /// A request for data.
    Get(Element),
    /// A request changing state.
    Set(Element),
    /// A positive reply, with an optional payload.
    Result(Option<Element>),
    /// A negative reply.
    Error(StanzaError),
}

impl IqType {
    fn as_str(&self) -> &'static str {
        match self {
            IqType::Get(_) => "get",
            IqType::Set(_) => "set",
            IqType::Result(_) => "result",
            IqType::Error(_) => "error",
        }
    }
}

/// An IQ request/response stanza.
///
/// Requests built with [`Iq::get`] and [`Iq::set`] carry no id; stamping a
/// unique id and matching the reply against it is the Porter's job.
#[derive(Debug, Clone)]
pub struct Iq {
    pub from: Option<Jid>,
    pub to: Option<Jid>,
    pub id: Option<String>,
    pub payload: IqType,
}

impl Iq {
    /// Creates an IQ `get` request around `payload`.
    pub fn get(payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: None,
            payload: IqType::Get(payload),
        }
    }

    /// Creates an IQ `set` request around `payload`.
    pub fn set(payload: Element) -> Iq {
        Iq {
            from: None,
            to: None,
            id: None,
            payload: IqType::Set(payload),
        }
    }

    /// Creates the empty `result` reply for a received request, with the
    /// request's id and the addresses swapped.
    pub fn result_of(request: &Element) -> Iq {
        Iq {
            from: request.attr("to").and_then(|a| Jid::from_str(a).ok()),
            to: request.attr("from").and_then(|a| Jid::from_str(a).ok()),
            id: request.attr("id").map(String::from),
            payload: IqType::Result(None),
        }
    }

    /// Creates the `error` reply for a received request.
    pub fn error_of(request: &Element, error: StanzaError) -> Iq {
        Iq {
            from: request.attr("to").and_then(|a| Jid::from_str(a).ok()),
            to: request.attr("from").and_then(|a| Jid::from_str(a).ok()),
            id: request.attr("id").map(String::from),
            payload: IqType::Error(error),
        }
    }
}

impl<'a> TryFrom<&'a Element> for Iq {
    type Error = Error;

    fn try_from(root: &'a Element) -> Result<Iq, Error> {
        if !root.is("iq", ns::JABBER_CLIENT) {
            return Err(Error::ParseError("This is not an iq element."));
        }
        let from = root.attr("from").and_then(|a| Jid::from_str(a).ok());
        let to = root.attr("to").and_then(|a| Jid::from_str(a).ok());
        let id = root.attr("id").map(String::from);
        let type_ = match root.attr("type") {
            Some(type_) => type_,
            None => return Err(Error::ParseError("Iq element requires a 'type' attribute.")),
        };

        let payload = match type_ {
            "get" | "set" => {
                let mut children = root.children();
                let payload = children
                    .next()
                    .ok_or(Error::ParseError("Iq request without a payload."))?;
                if children.next().is_some() {
                    return Err(Error::ParseError("Wrong number of children in iq element."));
                }
                if type_ == "get" {
                    IqType::Get(payload.clone())
                } else {
                    IqType::Set(payload.clone())
                }
            }
            "result" => IqType::Result(root.children().next().cloned()),
            "error" => {
                let error = root
                    .children()
                    .find(|child| child.is("error", ns::JABBER_CLIENT))
                    .ok_or(Error::ParseError("Iq error reply without an error element."))?;
                IqType::Error(StanzaError::try_from(error)?)
            }
            _ => return Err(Error::ParseError("Unknown iq type.")),
        };

        Ok(Iq {
            from,
            to,
            id,
            payload,
        })
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let mut builder = Element::builder("iq")
            .ns(ns::JABBER_CLIENT)
            .attr("from", iq.from.map(String::from))
            .attr("to", iq.to.map(String::from))
            .attr("id", iq.id)
            .attr("type", iq.payload.as_str());
        builder = match iq.payload {
            IqType::Get(payload) | IqType::Set(payload) | IqType::Result(Some(payload)) => {
                builder.append(payload)
            }
            IqType::Result(None) => builder,
            IqType::Error(error) => builder.append(Element::from(error)),
        };
        builder.build()
    }
}
