//! # Member Descriptor Codec
//!
//! A member descriptor identifies a field, property or method of a registered
//! type by kind, name and (for methods) exact parameter types. Descriptors are
//! persisted as compact tokens:
//!
//! ```text
//! <kind><name>[,<parameter type>]*
//!
//! fHealth                     field
//! pSpeed                      property
//! mJump                       zero-parameter method
//! mSetSpeed,System.Single     one-parameter method
//! ```
//!
//! The kind character alone distinguishes a zero-parameter method from a field
//! or property; the parameter count is never used for that.

use crate::error::EventError;
use crate::types::TypeRef;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: char = ',';

/// What kind of member a descriptor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Field,
    Property,
    Method,
}

impl MemberKind {
    /// Single-character token prefix.
    pub fn prefix(self) -> char {
        match self {
            MemberKind::Field => 'f',
            MemberKind::Property => 'p',
            MemberKind::Method => 'm',
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'f' => Some(MemberKind::Field),
            'p' => Some(MemberKind::Property),
            'm' => Some(MemberKind::Method),
            _ => None,
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MemberKind::Field => "field",
            MemberKind::Property => "property",
            MemberKind::Method => "method",
        };
        f.write_str(label)
    }
}

/// Encodes a member into its token form.
///
/// Returns `None` when the name is empty or when the name or any parameter
/// type name contains the `,` separator (such a token could not be decoded
/// back to the same triple).
pub fn encode(kind: MemberKind, name: &str, parameter_types: &[TypeRef]) -> Option<String> {
    if name.is_empty() || name.contains(SEPARATOR) {
        return None;
    }

    let mut token = String::with_capacity(1 + name.len() + parameter_types.len() * 16);
    token.push(kind.prefix());
    token.push_str(name);
    for parameter in parameter_types {
        if parameter.name().is_empty() || parameter.name().contains(SEPARATOR) {
            return None;
        }
        token.push(SEPARATOR);
        token.push_str(parameter.name());
    }
    Some(token)
}

/// Decodes a token into `(kind, name, parameter type names)`.
///
/// # Errors
///
/// [`EventError::Parse`] when the token is empty, starts with an unknown kind
/// character, has an empty name or an empty parameter segment, or gives a
/// field/property a parameter list.
pub fn decode(token: &str) -> Result<(MemberKind, String, Vec<String>), EventError> {
    let mut chars = token.chars();
    let prefix = chars
        .next()
        .ok_or_else(|| EventError::Parse("empty member token".to_string()))?;
    let kind = MemberKind::from_prefix(prefix).ok_or_else(|| {
        EventError::Parse(format!("unknown member kind '{}' in token '{}'", prefix, token))
    })?;

    let mut segments = chars.as_str().split(SEPARATOR);
    let name = segments.next().unwrap_or_default();
    if name.is_empty() {
        return Err(EventError::Parse(format!("member token '{}' has no name", token)));
    }

    let mut parameters = Vec::new();
    for segment in segments {
        if segment.is_empty() {
            return Err(EventError::Parse(format!(
                "member token '{}' has an empty parameter type",
                token
            )));
        }
        parameters.push(segment.to_string());
    }

    if kind != MemberKind::Method && !parameters.is_empty() {
        return Err(EventError::Parse(format!(
            "{} token '{}' cannot carry parameter types",
            kind, token
        )));
    }

    Ok((kind, name.to_string(), parameters))
}

/// Immutable identification of a member by kind, name and parameter types.
///
/// Serializes as its token string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberDescriptor {
    kind: MemberKind,
    name: CompactString,
    parameter_types: Vec<TypeRef>,
}

impl MemberDescriptor {
    /// Builds a descriptor, enforcing the same rules as [`encode`].
    pub fn new(
        kind: MemberKind,
        name: &str,
        parameter_types: Vec<TypeRef>,
    ) -> Result<Self, EventError> {
        if kind != MemberKind::Method && !parameter_types.is_empty() {
            return Err(EventError::Parse(format!(
                "{} '{}' cannot carry parameter types",
                kind, name
            )));
        }
        if encode(kind, name, &parameter_types).is_none() {
            return Err(EventError::Parse(format!("'{}' is not a valid member name", name)));
        }
        Ok(Self {
            kind,
            name: CompactString::new(name),
            parameter_types,
        })
    }

    pub fn field(name: &str) -> Result<Self, EventError> {
        Self::new(MemberKind::Field, name, Vec::new())
    }

    pub fn property(name: &str) -> Result<Self, EventError> {
        Self::new(MemberKind::Property, name, Vec::new())
    }

    pub fn method(name: &str, parameter_types: Vec<TypeRef>) -> Result<Self, EventError> {
        Self::new(MemberKind::Method, name, parameter_types)
    }

    /// Parses a persisted token.
    pub fn parse(token: &str) -> Result<Self, EventError> {
        let (kind, name, parameters) = decode(token)?;
        Ok(Self {
            kind,
            name: CompactString::new(name),
            parameter_types: parameters.iter().map(|p| TypeRef::named(p)).collect(),
        })
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_types(&self) -> &[TypeRef] {
        &self.parameter_types
    }

    pub fn to_token(&self) -> String {
        // Construction already validated every component.
        encode(self.kind, &self.name, &self.parameter_types).unwrap_or_default()
    }
}

impl fmt::Display for MemberDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

impl TryFrom<String> for MemberDescriptor {
    type Error = EventError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::parse(&token)
    }
}

impl From<MemberDescriptor> for String {
    fn from(descriptor: MemberDescriptor) -> Self {
        descriptor.to_token()
    }
}

impl std::str::FromStr for MemberDescriptor {
    type Err = EventError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::parse(token)
    }
}
