// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use minidom::Element;

use crate::error::Error;
use crate::ns;

/// The action the sender of a faulty stanza should take, RFC 6120 §8.3.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// Retry after providing credentials.
    Auth,
    /// Do not retry, the error is unrecoverable.
    Cancel,
    /// The condition is only a warning.
    Continue,
    /// Retry after changing the data sent.
    Modify,
    /// Retry after waiting.
    Wait,
}

impl FromStr for ErrorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<ErrorType, Error> {
        Ok(match s {
            "auth" => ErrorType::Auth,
            "cancel" => ErrorType::Cancel,
            "continue" => ErrorType::Continue,
            "modify" => ErrorType::Modify,
            "wait" => ErrorType::Wait,
            _ => return Err(Error::ParseError("Unknown value for 'type' attribute in error element.")),
        })
    }
}

impl ErrorType {
    fn as_str(self) -> &'static str {
        match self {
            ErrorType::Auth => "auth",
            ErrorType::Cancel => "cancel",
            ErrorType::Continue => "continue",
            ErrorType::Modify => "modify",
            ErrorType::Wait => "wait",
        }
    }
}

/// The defined stanza error conditions of RFC 6120 §8.3.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinedCondition {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    Forbidden,
    Gone,
    InternalServerError,
    ItemNotFound,
    JidMalformed,
    NotAcceptable,
    NotAllowed,
    NotAuthorized,
    PolicyViolation,
    RecipientUnavailable,
    Redirect,
    RegistrationRequired,
    RemoteServerNotFound,
    RemoteServerTimeout,
    ResourceConstraint,
    ServiceUnavailable,
    SubscriptionRequired,
    UndefinedCondition,
    UnexpectedRequest,
}

impl FromStr for DefinedCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<DefinedCondition, Error> {
        Ok(match s {
            "bad-request" => DefinedCondition::BadRequest,
            "conflict" => DefinedCondition::Conflict,
            "feature-not-implemented" => DefinedCondition::FeatureNotImplemented,
            "forbidden" => DefinedCondition::Forbidden,
            "gone" => DefinedCondition::Gone,
            "internal-server-error" => DefinedCondition::InternalServerError,
            "item-not-found" => DefinedCondition::ItemNotFound,
            "jid-malformed" => DefinedCondition::JidMalformed,
            "not-acceptable" => DefinedCondition::NotAcceptable,
            "not-allowed" => DefinedCondition::NotAllowed,
            "not-authorized" => DefinedCondition::NotAuthorized,
            "policy-violation" => DefinedCondition::PolicyViolation,
            "recipient-unavailable" => DefinedCondition::RecipientUnavailable,
            "redirect" => DefinedCondition::Redirect,
            "registration-required" => DefinedCondition::RegistrationRequired,
            "remote-server-not-found" => DefinedCondition::RemoteServerNotFound,
            "remote-server-timeout" => DefinedCondition::RemoteServerTimeout,
            "resource-constraint" => DefinedCondition::ResourceConstraint,
            "service-unavailable" => DefinedCondition::ServiceUnavailable,
            "subscription-required" => DefinedCondition::SubscriptionRequired,
            "undefined-condition" => DefinedCondition::UndefinedCondition,
            "unexpected-request" => DefinedCondition::UnexpectedRequest,
            _ => return Err(Error::ParseError("Unknown defined-condition.")),
        })
    }
}

impl DefinedCondition {
    fn as_str(&self) -> &'static str {
        match self {
            DefinedCondition::BadRequest => "bad-request",
            DefinedCondition::Conflict => "conflict",
            DefinedCondition::FeatureNotImplemented => "feature-not-implemented",
            DefinedCondition::Forbidden => "forbidden",
            DefinedCondition::Gone => "gone",
            DefinedCondition::InternalServerError => "internal-server-error",
            DefinedCondition::ItemNotFound => "item-not-found",
            DefinedCondition::JidMalformed => "jid-malformed",
            DefinedCondition::NotAcceptable => "not-acceptable",
            DefinedCondition::NotAllowed => "not-allowed",
            DefinedCondition::NotAuthorized => "not-authorized",
            DefinedCondition::PolicyViolation => "policy-violation",
            DefinedCondition::RecipientUnavailable => "recipient-unavailable",
            DefinedCondition::Redirect => "redirect",
            DefinedCondition::RegistrationRequired => "registration-required",
            DefinedCondition::RemoteServerNotFound => "remote-server-not-found",
            DefinedCondition::RemoteServerTimeout => "remote-server-timeout",
            DefinedCondition::ResourceConstraint => "resource-constraint",
            DefinedCondition::ServiceUnavailable => "service-unavailable",
            DefinedCondition::SubscriptionRequired => "subscription-required",
            DefinedCondition::UndefinedCondition => "undefined-condition",
            DefinedCondition::UnexpectedRequest => "unexpected-request",
        }
    }
}

/// A stanza-level error, RFC 6120 §8.3.
#[derive(Debug, Clone, PartialEq)]
pub struct StanzaError {
    /// How the erroring party expects the sender to recover.
    pub type_: ErrorType,
    /// The machine-readable condition.
    pub defined_condition: DefinedCondition,
    /// Optional human-readable description.
    pub text: Option<String>,
}

impl StanzaError {
    /// Creates a stanza error with no descriptive text.
    pub fn new(type_: ErrorType, defined_condition: DefinedCondition) -> StanzaError {
        StanzaError {
            type_,
            defined_condition,
            text: None,
        }
    }

    /// Attaches a human-readable description.
    pub fn with_text<T: Into<String>>(mut self, text: T) -> StanzaError {
        self.text = Some(text.into());
        self
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{} ({})", self.defined_condition.as_str(), self.type_.as_str())?;
        if let Some(text) = &self.text {
            write!(fmt, ": {}", text)?;
        }
        Ok(())
    }
}

impl<'a> TryFrom<&'a Element> for StanzaError {
    type Error = Error;

    fn try_from(elem: &'a Element) -> Result<StanzaError, Error> {
        if !elem.is("error", ns::JABBER_CLIENT) {
            return Err(Error::ParseError("This is not an error element."));
        }

        let type_ = match elem.attr("type") {
            Some(type_) => type_.parse()?,
            None => return Err(Error::ParseError("Error element requires a 'type' attribute.")),
        };

        let mut defined_condition = None;
        let mut text = None;
        for child in elem.children() {
            if !child.has_ns(ns::XMPP_STANZAS) {
                continue;
            }
            if child.name() == "text" {
                text = Some(child.text());
            } else if defined_condition.is_none() {
                defined_condition = Some(child.name().parse()?);
            }
        }

        let defined_condition = defined_condition
            .ok_or(Error::ParseError("Error element has no defined-condition."))?;

        Ok(StanzaError {
            type_,
            defined_condition,
            text,
        })
    }
}

impl From<StanzaError> for Element {
    fn from(err: StanzaError) -> Element {
        let mut builder = Element::builder("error")
            .ns(ns::JABBER_CLIENT)
            .attr("type", err.type_.as_str())
            .append(
                Element::builder(err.defined_condition.as_str())
                    .ns(ns::XMPP_STANZAS)
                    .build(),
            );
        if let Some(text) = err.text {
            builder = builder.append(
                Element::builder("text")
                    .ns(ns::XMPP_STANZAS)
                    .append(text)
                    .build(),
            );
        }
        builder.build()
    }
}
