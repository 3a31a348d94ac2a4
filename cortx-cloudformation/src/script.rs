// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Boot scripts as sequences of lines
//!
//! A line is either literal shell text or text containing `${...}`
//! placeholders that the infrastructure engine fills in when the instance is
//! created (a node's own logical ID, the region, another node's address).
//! Which syntax carries a placeholder is up to the [`ScriptRenderer`].

use cloudformation_types::Expr;

/// Final line of every boot script.  Flips the flag the exit trap reports
/// back to CloudFormation, so it only runs if every earlier line succeeded.
pub const COMPLETION_MARKER: &str = "DEPLOY_SUCCESS=true";

/// One line of a boot script
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    /// Shell text used verbatim.
    Literal(String),
    /// Shell text with `${Name}` / `${Resource.Attribute}` placeholders
    /// resolved at deployment time.
    Substitution(String),
}

impl Line {
    pub fn literal(text: impl Into<String>) -> Self {
        Line::Literal(text.into())
    }

    pub fn sub(text: impl Into<String>) -> Self {
        Line::Substitution(text.into())
    }

    pub fn text(&self) -> &str {
        match self {
            Line::Literal(text) | Line::Substitution(text) => text,
        }
    }
}

impl From<&str> for Line {
    fn from(text: &str) -> Self {
        Line::Literal(text.to_string())
    }
}

/// An ordered run of lines produced by one phase.
pub type Fragment = Vec<Line>;

/// A node's boot script
///
/// Scripts only grow: phases are appended in order and nothing is removed or
/// reordered, since later phases read files earlier ones wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootScript {
    lines: Vec<Line>,
}

impl BootScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: Fragment) {
        self.lines.extend(fragment);
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the index of the first line whose text is exactly `text`.
    pub fn position(&self, text: &str) -> Option<usize> {
        self.lines.iter().position(|line| line.text() == text)
    }

    /// Returns true if any line contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.text().contains(needle))
    }

    pub fn render<R: ScriptRenderer>(&self, renderer: &R) -> R::Output {
        renderer.render(&self.lines)
    }
}

/// Turns boot-script lines (plus the completion marker) into some target
/// representation.
pub trait ScriptRenderer {
    type Output;

    fn render(&self, lines: &[Line]) -> Self::Output;
}

/// Renders a script as EC2 user data: `Fn::Base64` of the lines joined with
/// newlines, each substitution line wrapped in `Fn::Sub`.
#[derive(Clone, Copy, Debug, Default)]
pub struct UserDataRenderer;

impl ScriptRenderer for UserDataRenderer {
    type Output = Expr;

    fn render(&self, lines: &[Line]) -> Expr {
        let values = lines
            .iter()
            .map(|line| match line {
                Line::Literal(text) => Expr::String(text.clone()),
                Line::Substitution(text) => Expr::Sub(text.clone()),
            })
            .chain(std::iter::once(Expr::from(COMPLETION_MARKER)))
            .collect();
        Expr::base64(Expr::join("\n", values))
    }
}

/// Renders a script as plain text for inspection, leaving placeholders
/// unresolved.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreviewRenderer;

impl ScriptRenderer for PreviewRenderer {
    type Output = String;

    fn render(&self, lines: &[Line]) -> String {
        let mut out = String::new();
        for line in lines {
            out.push_str(line.text());
            out.push('\n');
        }
        out.push_str(COMPLETION_MARKER);
        out.push('\n');
        out
    }
}
