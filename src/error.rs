// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;

/// Error returned when parsing a stanza subtree into one of this crate's
/// typed representations.
#[derive(Debug)]
pub enum Error {
    /// The subtree doesn't have the expected shape.
    ParseError(&'static str),
    /// A jid attribute couldn't be parsed.
    JidParseError(jid::JidParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(s) => write!(fmt, "parse error: {}", s),
            Error::JidParseError(e) => write!(fmt, "jid parse error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<jid::JidParseError> for Error {
    fn from(err: jid::JidParseError) -> Error {
        Error::JidParseError(err)
    }
}
