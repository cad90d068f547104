// Copyright (c) 2026 xmpp-im contributors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! XEP-0004 data forms.
//!
//! A [`DataForm`] is created from a form definition received in a stanza,
//! filled in, and serialised back as a submission. Result subtrees, with
//! or without a `reported` header, decode into rows of filled fields.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use minidom::Element;

use crate::ns;

/// Error turning a stanza subtree into a form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    /// The subtree carries no `x` element in the data-forms namespace.
    NotForm,
    /// The `x` element is not of the expected type.
    WrongType,
}

impl fmt::Display for FormError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormError::NotForm => write!(fmt, "no 'x' element"),
            FormError::WrongType => write!(fmt, "wrong form type"),
        }
    }
}

impl std::error::Error for FormError {}

/// The type of a form field, XEP-0004 §3.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Fixed,
    Hidden,
    JidMulti,
    JidSingle,
    ListMulti,
    ListSingle,
    TextMulti,
    TextPrivate,
    TextSingle,
}

impl FieldType {
    /// Whether values of this type are lists of strings.
    pub fn is_multi(self) -> bool {
        matches!(
            self,
            FieldType::JidMulti | FieldType::ListMulti | FieldType::TextMulti
        )
    }

    /// Whether this type constrains its values to a list of options.
    pub fn is_list(self) -> bool {
        matches!(self, FieldType::ListSingle | FieldType::ListMulti)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Fixed => "fixed",
            FieldType::Hidden => "hidden",
            FieldType::JidMulti => "jid-multi",
            FieldType::JidSingle => "jid-single",
            FieldType::ListMulti => "list-multi",
            FieldType::ListSingle => "list-single",
            FieldType::TextMulti => "text-multi",
            FieldType::TextPrivate => "text-private",
            FieldType::TextSingle => "text-single",
        }
    }
}

impl FromStr for FieldType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<FieldType, Self::Err> {
        Ok(match s {
            "boolean" => FieldType::Boolean,
            "fixed" => FieldType::Fixed,
            "hidden" => FieldType::Hidden,
            "jid-multi" => FieldType::JidMulti,
            "jid-single" => FieldType::JidSingle,
            "list-multi" => FieldType::ListMulti,
            "list-single" => FieldType::ListSingle,
            "text-multi" => FieldType::TextMulti,
            "text-private" => FieldType::TextPrivate,
            "text-single" => FieldType::TextSingle,
            _ => {
                return Err(crate::error::Error::ParseError(
                    "Unknown value for 'type' attribute in field element.",
                ))
            }
        })
    }
}

/// A field value. The field's [`FieldType`] decides the active variant:
/// `Boolean` for boolean fields, `TextList` for the `*-multi` types,
/// `Text` for everything else.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Boolean(bool),
    Text(String),
    TextList(Vec<String>),
}

/// One allowed value of a `list-single`/`list-multi` field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldOption {
    pub label: Option<String>,
    pub value: String,
}

/// A form field descriptor, with its current value if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub type_: FieldType,
    /// Field identifier. Always present except on `fixed` fields.
    pub var: Option<String>,
    pub label: Option<String>,
    pub desc: Option<String>,
    pub required: bool,
    /// The value carried by the form definition.
    pub default_value: Option<FieldValue>,
    /// The value to submit, or the value decoded from a result row.
    pub value: Option<FieldValue>,
    /// Allowed values, for the `list-*` types only.
    pub options: Vec<FieldOption>,
}

/// A user-extensible form embedded in a stanza.
#[derive(Debug, Clone)]
pub struct DataForm {
    title: Option<String>,
    instructions: Option<String>,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    results: Vec<Vec<Field>>,
}

impl DataForm {
    /// Builds a form from the form definition found in `root`, an element
    /// carrying an `<x xmlns='jabber:x:data' type='form'/>` child.
    ///
    /// Unusable fields (no type, no var on a non-fixed field, a list with
    /// no options) are dropped; the rest of the form is still built.
    pub fn from_form(root: &Element) -> Result<DataForm, FormError> {
        let x = find_x(root)?;
        if x.attr("type") != Some("form") {
            debug!(
                "'type' attribute is not 'form': {}",
                x.attr("type").unwrap_or("<none>")
            );
            return Err(FormError::WrongType);
        }

        let mut form = DataForm {
            title: x.get_child("title", ns::DATA_FORMS).map(Element::text),
            instructions: x.get_child("instructions", ns::DATA_FORMS).map(Element::text),
            fields: vec![],
            index: HashMap::new(),
            results: vec![],
        };

        for child in x.children() {
            let header = match field_header(child) {
                Some(header) => header,
                None => continue,
            };

            let options = if header.type_.is_list() {
                let options = parse_options(child);
                if options.is_empty() {
                    debug!("no options provided for {:?}", header.var);
                    continue;
                }
                options
            } else {
                vec![]
            };

            let field = Field {
                type_: header.type_,
                var: header.var,
                label: header.label,
                desc: child.get_child("desc", ns::DATA_FORMS).map(Element::text),
                required: child.get_child("required", ns::DATA_FORMS).is_some(),
                default_value: parse_value(header.type_, child),
                value: None,
                options,
            };

            debug!("add field {:?} of type {}", field.var, field.type_.as_str());
            if let Some(var) = &field.var {
                // fixed fields may have no var and then live in the
                // ordered list only
                form.index.insert(var.clone(), form.fields.len());
            }
            form.fields.push(field);
        }

        Ok(form)
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// The form's fields, in definition order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks up a field by its `var`.
    pub fn field(&self, var: &str) -> Option<&Field> {
        self.index.get(var).map(|i| &self.fields[*i])
    }

    /// Looks up a field by its `var`, for filling in its value.
    pub fn field_mut(&mut self, var: &str) -> Option<&mut Field> {
        let i = *self.index.get(var)?;
        self.fields.get_mut(i)
    }

    /// Result rows decoded by [`DataForm::parse_result`], in presentation
    /// order.
    pub fn results(&self) -> &[Vec<Field>] {
        &self.results
    }

    /// Serialises the filled form as an `<x type='submit'/>` subtree, to
    /// be attached to an outgoing stanza.
    ///
    /// Fields keep their definition order. Fields with no value are left
    /// out, except `hidden` fields which always transport their default
    /// verbatim.
    pub fn submit(&self) -> Element {
        let mut builder = Element::builder("x")
            .ns(ns::DATA_FORMS)
            .attr("type", "submit");
        for field in &self.fields {
            if let Some(elem) = submit_field(field) {
                builder = builder.append(elem);
            }
        }
        builder.build()
    }

    /// Decodes a result subtree (an element carrying an
    /// `<x type='result'/>` child) and appends its rows to
    /// [`DataForm::results`].
    ///
    /// With a `reported` header, every `item` sibling becomes one row and
    /// fields decode by their reported column's type. Without one, the
    /// `x` element's own fields form a single row.
    pub fn parse_result(&mut self, root: &Element) -> Result<(), FormError> {
        let x = find_x(root)?;
        if x.attr("type") != Some("result") {
            debug!(
                "'type' attribute is not 'result': {}",
                x.attr("type").unwrap_or("<none>")
            );
            return Err(FormError::WrongType);
        }

        match x.get_child("reported", ns::DATA_FORMS) {
            Some(reported) => {
                let mut columns = HashMap::new();
                for node in reported.children() {
                    if let Some(header) = field_header(node) {
                        if let Some(var) = header.var.clone() {
                            columns.insert(var, header);
                        }
                    }
                }
                for item in x.children() {
                    if !item.is("item", ns::DATA_FORMS) {
                        continue;
                    }
                    self.results.push(parse_item(&columns, item));
                }
            }
            None => {
                // no reported header, so there is only one result
                let mut row = vec![];
                for node in x.children() {
                    let header = match field_header(node) {
                        Some(header) => header,
                        None => continue,
                    };
                    let value = match parse_value(header.type_, node) {
                        Some(value) => value,
                        None => continue,
                    };
                    row.push(result_field(header.type_, header.var, None, value));
                }
                self.results.push(row);
            }
        }

        Ok(())
    }
}

struct FieldHeader {
    var: Option<String>,
    type_: FieldType,
    label: Option<String>,
}

fn field_header(elem: &Element) -> Option<FieldHeader> {
    if !elem.is("field", ns::DATA_FORMS) {
        return None;
    }
    let type_ = match elem.attr("type") {
        Some(type_) => type_,
        None => {
            debug!("field without a 'type' attribute; ignoring");
            return None;
        }
    };
    let type_ = match FieldType::from_str(type_) {
        Ok(type_) => type_,
        Err(_) => {
            debug!("invalid field type: {}; ignoring", type_);
            return None;
        }
    };
    let var = elem.attr("var").map(String::from);
    if var.is_none() && type_ != FieldType::Fixed {
        debug!("field without a 'var' attribute; ignoring");
        return None;
    }
    Some(FieldHeader {
        var,
        type_,
        label: elem.attr("label").map(String::from),
    })
}

fn parse_options(field: &Element) -> Vec<FieldOption> {
    let mut options = vec![];
    for option in field.children() {
        if !option.is("option", ns::DATA_FORMS) {
            continue;
        }
        let value = match option.get_child("value", ns::DATA_FORMS) {
            Some(value) => value.text(),
            None => continue,
        };
        if value.is_empty() {
            continue;
        }
        debug!("add option: {}", value);
        options.push(FieldOption {
            label: option.attr("label").map(String::from),
            value,
        });
    }
    options
}

/// Decodes the `value` children of a field element per the field type.
fn parse_value(type_: FieldType, field: &Element) -> Option<FieldValue> {
    let value = field.get_child("value", ns::DATA_FORMS)?;
    match type_ {
        FieldType::Boolean => match value.text().as_str() {
            "true" | "1" => Some(FieldValue::Boolean(true)),
            "false" | "0" => Some(FieldValue::Boolean(false)),
            other => {
                debug!("invalid boolean value: {}", other);
                None
            }
        },
        FieldType::JidMulti | FieldType::ListMulti | FieldType::TextMulti => {
            let values = field
                .children()
                .filter(|child| child.is("value", ns::DATA_FORMS))
                .map(Element::text)
                .filter(|text| !text.is_empty())
                .collect();
            Some(FieldValue::TextList(values))
        }
        _ => Some(FieldValue::Text(value.text())),
    }
}

fn parse_item(columns: &HashMap<String, FieldHeader>, item: &Element) -> Vec<Field> {
    let mut row = vec![];
    for field in item.children() {
        if !field.is("field", ns::DATA_FORMS) {
            continue;
        }
        let var = match field.attr("var") {
            Some(var) => var,
            None => continue,
        };
        let column = match columns.get(var) {
            Some(column) => column,
            None => {
                debug!("field {} wasn't in the reported fields; ignoring", var);
                continue;
            }
        };
        let value = match parse_value(column.type_, field) {
            Some(value) => value,
            None => continue,
        };
        row.push(result_field(
            column.type_,
            Some(String::from(var)),
            column.label.clone(),
            value,
        ));
    }
    row
}

fn result_field(
    type_: FieldType,
    var: Option<String>,
    label: Option<String>,
    value: FieldValue,
) -> Field {
    Field {
        type_,
        var,
        label,
        desc: None,
        required: false,
        default_value: None,
        value: Some(value),
        options: vec![],
    }
}

fn find_x(root: &Element) -> Result<&Element, FormError> {
    match root.get_child("x", ns::DATA_FORMS) {
        Some(x) => Ok(x),
        None => {
            debug!("no 'x' element");
            Err(FormError::NotForm)
        }
    }
}

fn value_element(text: String) -> Element {
    Element::builder("value")
        .ns(ns::DATA_FORMS)
        .append(text)
        .build()
}

fn submit_field(field: &Field) -> Option<Element> {
    if field.value.is_none() && field.type_ != FieldType::Hidden {
        return None;
    }
    debug!("add field {:?}", field.var);

    let mut builder = Element::builder("field")
        .ns(ns::DATA_FORMS)
        .attr("var", field.var.clone())
        .attr("type", field.type_.as_str());
    match field.type_ {
        FieldType::Hidden => {
            // not user-modifiable: transport the server-provided default
            if let Some(FieldValue::Text(text)) = &field.default_value {
                builder = builder.append(value_element(text.clone()));
            }
        }
        FieldType::Boolean => {
            if let Some(FieldValue::Boolean(value)) = &field.value {
                let text = if *value { "1" } else { "0" };
                builder = builder.append(value_element(String::from(text)));
            }
        }
        _ if field.type_.is_multi() => {
            if let Some(FieldValue::TextList(values)) = &field.value {
                for value in values {
                    builder = builder.append(value_element(value.clone()));
                }
            }
        }
        _ => {
            if let Some(FieldValue::Text(text)) = &field.value {
                builder = builder.append(value_element(text.clone()));
            }
        }
    }
    Some(builder.build())
}
