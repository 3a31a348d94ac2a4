// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Values and intrinsic functions
//!
//! Most property values in a template are either plain scalars or one of the
//! CloudFormation intrinsic functions (`Ref`, `Fn::GetAtt`, `Fn::Sub`, ...).
//! Intrinsics are evaluated by CloudFormation when the stack is created, not
//! by us; [`Expr`] only describes them.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Prefix shared by all CloudFormation pseudo parameters (`AWS::Region`,
/// `AWS::StackName`, ...).  These are always in scope.
pub const PSEUDO_PARAMETER_PREFIX: &str = "AWS::";

/// A template value, possibly deferred until stack creation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    /// A literal string.
    String(String),
    /// `{"Ref": name}`: the value of a parameter or the physical ID of a
    /// resource.
    Ref(String),
    /// `{"Fn::GetAtt": [resource, attribute]}`
    GetAtt { resource: String, attribute: String },
    /// `{"Fn::FindInMap": [map, top_level_key, second_level_key]}`
    FindInMap {
        map: String,
        top_level_key: Box<Expr>,
        second_level_key: String,
    },
    /// `{"Fn::Sub": text}`: `${Name}` and `${Resource.Attribute}`
    /// placeholders within `text` are replaced by CloudFormation.
    Sub(String),
    /// `{"Fn::Base64": value}`
    Base64(Box<Expr>),
    /// `{"Fn::Join": [delimiter, [values...]]}`
    Join { delimiter: String, values: Vec<Expr> },
}

impl Expr {
    pub fn reference(name: impl Into<String>) -> Expr {
        Expr::Ref(name.into())
    }

    pub fn get_att(
        resource: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Expr {
        Expr::GetAtt { resource: resource.into(), attribute: attribute.into() }
    }

    pub fn find_in_map(
        map: impl Into<String>,
        top_level_key: Expr,
        second_level_key: impl Into<String>,
    ) -> Expr {
        Expr::FindInMap {
            map: map.into(),
            top_level_key: Box::new(top_level_key),
            second_level_key: second_level_key.into(),
        }
    }

    pub fn sub(text: impl Into<String>) -> Expr {
        Expr::Sub(text.into())
    }

    pub fn base64(value: Expr) -> Expr {
        Expr::Base64(Box::new(value))
    }

    pub fn join(delimiter: impl Into<String>, values: Vec<Expr>) -> Expr {
        Expr::Join { delimiter: delimiter.into(), values }
    }

    /// Appends every name this expression depends on to `out`, recursing
    /// into nested intrinsics.
    pub fn collect_references(&self, out: &mut Vec<Reference>) {
        match self {
            Expr::String(_) => (),
            Expr::Ref(name) => out.push(Reference::Ref(name.clone())),
            Expr::GetAtt { resource, .. } => {
                out.push(Reference::Attribute(resource.clone()))
            }
            Expr::FindInMap { map, top_level_key, .. } => {
                out.push(Reference::Mapping(map.clone()));
                top_level_key.collect_references(out);
            }
            Expr::Sub(text) => {
                out.extend(sub_placeholders(text).map(|placeholder| {
                    match placeholder.split_once('.') {
                        Some((resource, _)) if !is_pseudo(placeholder) => {
                            Reference::Attribute(resource.to_string())
                        }
                        _ => Reference::Ref(placeholder.to_string()),
                    }
                }))
            }
            Expr::Base64(inner) => inner.collect_references(out),
            Expr::Join { values, .. } => {
                for value in values {
                    value.collect_references(out);
                }
            }
        }
    }

    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Expr {
        Expr::String(s.to_string())
    }
}


/// Something an [`Expr`] needs to exist elsewhere in the template
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
    /// A parameter, a resource, or a pseudo parameter
    Ref(String),
    /// An attribute of the named resource
    Attribute(String),
    /// A top-level entry of the `Mappings` section
    Mapping(String),
}

impl Reference {
    pub fn name(&self) -> &str {
        match self {
            Reference::Ref(name)
            | Reference::Attribute(name)
            | Reference::Mapping(name) => name,
        }
    }
}

pub fn is_pseudo(name: &str) -> bool {
    name.starts_with(PSEUDO_PARAMETER_PREFIX)
}

/// Iterates over the `${...}` placeholders in an `Fn::Sub` string.
///
/// `${!Literal}` is CloudFormation's escape for a literal `${Literal}` and is
/// skipped.  An unterminated `${` ends the scan.
pub fn sub_placeholders(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || loop {
        let start = rest.find("${")?;
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let name = &after[..end];
        rest = &after[end + 1..];
        if !name.starts_with('!') {
            return Some(name);
        }
    })
}

impl Serialize for Expr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Expr::String(s) => serializer.serialize_str(s),
            Expr::Ref(name) => single_entry(serializer, "Ref", name),
            Expr::GetAtt { resource, attribute } => {
                single_entry(serializer, "Fn::GetAtt", &(resource, attribute))
            }
            Expr::FindInMap { map, top_level_key, second_level_key } => {
                single_entry(
                    serializer,
                    "Fn::FindInMap",
                    &(map, top_level_key, second_level_key),
                )
            }
            Expr::Sub(text) => single_entry(serializer, "Fn::Sub", text),
            Expr::Base64(inner) => {
                single_entry(serializer, "Fn::Base64", inner)
            }
            Expr::Join { delimiter, values } => {
                single_entry(serializer, "Fn::Join", &(delimiter, values))
            }
        }
    }
}

fn single_entry<S, V>(
    serializer: S,
    key: &str,
    value: &V,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}
