/// An `#include` (or `#import`) directive's target, as written
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Include {
    /// `#include "header.h"` — resolved against the including file's
    /// directory first, then the search paths
    Quoted(String),
    /// `#include <header.h>` — resolved against the search paths only
    System(String),
    /// `#include HEADER` — target depends on the macro environment at the
    /// point of inclusion
    Macro(String),
}

impl Include {
    /// Render the include target with its delimiters, e.g. `"util.h"` or
    /// `<vector>`. Macro targets render as their raw expression.
    pub fn delimited_text(&self) -> String {
        match self {
            Include::Quoted(path) => format!("\"{path}\""),
            Include::System(path) => format!("<{path}>"),
            Include::Macro(expr) => expr.clone(),
        }
    }

    /// Parse a delimited include target back into a quoted or system
    /// include. Macro expressions are not round-tripped; stored edges always
    /// carry the expanded form.
    pub fn from_delimited(text: &str) -> Option<Include> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Some(Include::Quoted(inner.to_string()));
        }
        if let Some(inner) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            return Some(Include::System(inner.to_string()));
        }
        None
    }
}

/// Body of an object-like macro definition, classified at parse time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroBody {
    /// `#define FLAG` — defined without a value
    Empty,
    /// `#define A B` — a single identifier, possibly another macro
    Token(String),
    /// `#define H "header.h"`
    Quoted(String),
    /// `#define H <header.h>`
    System(String),
    /// Anything else, including function-like definitions; unusable for
    /// include resolution
    Opaque,
}

/// A `#define` directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    pub name: String,
    pub body: MacroBody,
}

/// A single preprocessor directive relevant to inclusion analysis, in
/// textual order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Include(Include),
    Define(MacroDef),
    Undef(String),
}

/// Scan one file's text for include, define and undef directives.
///
/// The scan is line-oriented with backslash continuations joined. Other
/// directives and all non-directive lines are ignored.
pub fn parse_directives(source: &str) -> Vec<Directive> {
    let mut directives = Vec::new();
    let mut lines = source.lines();

    while let Some(first) = lines.next() {
        let mut logical = first.trim_end().to_string();
        while logical.ends_with('\\') {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_end()),
                None => break,
            }
        }

        let trimmed = logical.trim_start();
        let Some(rest) = trimmed.strip_prefix('#') else {
            continue;
        };
        let rest = rest.trim_start();
        let (keyword, args) = split_identifier(rest);

        let directive = match keyword {
            "include" | "import" => parse_include(args).map(Directive::Include),
            "define" => parse_define(args).map(Directive::Define),
            "undef" => {
                let (name, _) = split_identifier(args.trim_start());
                (!name.is_empty()).then(|| Directive::Undef(name.to_string()))
            }
            _ => None,
        };
        if let Some(directive) = directive {
            directives.push(directive);
        }
    }

    directives
}

/// Classify a macro's textual value the way `#define` bodies are classified.
/// Used for both in-file definitions and job-level `-D` style macros.
pub fn classify_macro_value(value: &str) -> MacroBody {
    let value = strip_trailing_comment(value).trim();
    if value.is_empty() {
        return MacroBody::Empty;
    }
    if let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        if !inner.contains('"') {
            return MacroBody::Quoted(inner.to_string());
        }
        return MacroBody::Opaque;
    }
    if let Some(inner) = value.strip_prefix('<').and_then(|v| v.strip_suffix('>')) {
        return MacroBody::System(inner.to_string());
    }
    if is_identifier(value) {
        return MacroBody::Token(value.to_string());
    }
    MacroBody::Opaque
}

fn parse_include(args: &str) -> Option<Include> {
    let args = args.trim_start();
    if let Some(rest) = args.strip_prefix('"') {
        let end = rest.find('"')?;
        return Some(Include::Quoted(rest[..end].to_string()));
    }
    if let Some(rest) = args.strip_prefix('<') {
        let end = rest.find('>')?;
        return Some(Include::System(rest[..end].to_string()));
    }
    let expr = strip_trailing_comment(args).trim();
    (!expr.is_empty()).then(|| Include::Macro(expr.to_string()))
}

fn parse_define(args: &str) -> Option<MacroDef> {
    let args = args.trim_start();
    let (name, rest) = split_identifier(args);
    if name.is_empty() {
        return None;
    }
    // A '(' directly after the name makes this function-like; the name is
    // recorded but its body cannot feed include resolution.
    if rest.starts_with('(') {
        return Some(MacroDef {
            name: name.to_string(),
            body: MacroBody::Opaque,
        });
    }
    Some(MacroDef {
        name: name.to_string(),
        body: classify_macro_value(rest),
    })
}

fn split_identifier(text: &str) -> (&str, &str) {
    let end = text
        .char_indices()
        .find(|(i, c)| {
            if *i == 0 {
                !(c.is_ascii_alphabetic() || *c == '_')
            } else {
                !(c.is_ascii_alphanumeric() || *c == '_')
            }
        })
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (&text[..end], &text[end..])
}

pub(crate) fn is_identifier(text: &str) -> bool {
    let (ident, rest) = split_identifier(text);
    !ident.is_empty() && rest.is_empty()
}

fn strip_trailing_comment(text: &str) -> &str {
    let end = match (text.find("//"), text.find("/*")) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => text.len(),
    };
    &text[..end]
}
