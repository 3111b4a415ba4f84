//! Request body parsing.
//!
//! Every request kind goes through the same element tree (`tree`); the
//! modules here wrap the tree in typed request models that enforce
//! required-element presence, numeric parsing and depth defaulting.

mod checkout;
mod error;
mod merge;
mod options;
mod propfind;
mod proppatch;
mod report;
pub mod tree;

pub use checkout::{CheckoutRequest, parse_checkout};
pub use error::{ParseError, ParseErrorKind, ParseResult};
pub use merge::{LockTokenEntry, MergeRequest, parse_merge};
pub use options::{OptionsRequest, parse_options};
pub use propfind::{PropfindRequest, PropfindType, parse_propfind};
pub use proppatch::{PatchOperation, ProppatchRequest, parse_proppatch};
pub use report::{
    DatedRevReport, FileRevisionsReport, GetLocationsReport, GetLocksReport, LogReport,
    MergeinfoInheritance, MergeinfoReport, ReplayReport, ReportEntry, ReportRequest, UpdateAction,
    UpdateReport,
};
pub use tree::{ElementNode, parse_tree};

use crate::dav::core::QName;

/// Returns the first value of a required child element.
pub(crate) fn required_value<'a>(node: &'a ElementNode, name: &QName) -> ParseResult<&'a str> {
    node.child(name)
        .and_then(ElementNode::first_value)
        .ok_or_else(|| ParseError::missing_element(name.local_name()))
}

/// Parses an optional numeric child element.
pub(crate) fn numeric_value(node: &ElementNode, name: &QName) -> ParseResult<Option<u64>> {
    match node.child(name).and_then(ElementNode::first_value) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ParseError::invalid_value_for(name.local_name(), value)),
        None => Ok(None),
    }
}

/// Parses a required numeric child element.
pub(crate) fn required_numeric(node: &ElementNode, name: &QName) -> ParseResult<u64> {
    numeric_value(node, name)?.ok_or_else(|| ParseError::missing_element(name.local_name()))
}

/// Interprets a presence-style flag element: present without an explicit
/// negative value means enabled.
pub(crate) fn flag_value(node: &ElementNode, name: &QName) -> bool {
    match node.child(name) {
        Some(child) => !matches!(child.first_value(), Some("no" | "false" | "0")),
        None => false,
    }
}

/// Parses a numeric attribute.
pub(crate) fn numeric_attribute(node: &ElementNode, name: &str) -> ParseResult<Option<u64>> {
    match node.attribute(name) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ParseError::invalid_value_for(name, value)),
        None => Ok(None),
    }
}
