/*!
 * Macro prototypes: the ordered argument specification of a macro.
 *
 * Prototypes can be written in a compact notation:
 *
 * - `{}` mandatory argument
 * - `!{}` verbatim mandatory argument (never expanded)
 * - `[]` optional argument with an empty default
 * - `[=text]` optional argument defaulting to `text`
 * - `\` a command name (`\foo` or `{\foo}`)
 * - `>` everything up to the end of the enclosing group
 *
 * so `\usepackage` is `[]{}` and `\newcommand` is `\[][]{}`.
 */

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};

/// One argument slot of a macro
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    /// A single character or a balanced `{...}` group
    Mandatory,
    /// A `[...]` group, or the default when absent
    Optional(String),
    /// Like `Mandatory`, but the raw text is never expanded
    Verbatim,
    /// A control-sequence name
    CommandName,
    /// Raw text up to the closing delimiter of the current group
    GreedyToEndOfContext,
}

/// Immutable argument specification of a macro
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MacroPrototype {
    params: Vec<ParamSpec>,
}

impl MacroPrototype {
    /// A macro without arguments
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a prototype from explicit specs
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    /// Argument slots in order
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Whether the macro takes no argument
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromStr for MacroPrototype {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut params = Vec::new();
        let mut chars = s.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    expect_char(&mut chars, '}', s)?;
                    params.push(ParamSpec::Mandatory);
                }
                '!' => {
                    expect_char(&mut chars, '{', s)?;
                    expect_char(&mut chars, '}', s)?;
                    params.push(ParamSpec::Verbatim);
                }
                '[' => {
                    let mut default = String::new();
                    if chars.peek() == Some(&'=') {
                        chars.next();
                        let mut closed = false;
                        for d in chars.by_ref() {
                            if d == ']' {
                                closed = true;
                                break;
                            }
                            default.push(d);
                        }
                        if !closed {
                            return Err(anyhow!("Unterminated optional default in prototype '{}'", s));
                        }
                    } else {
                        expect_char(&mut chars, ']', s)?;
                    }
                    params.push(ParamSpec::Optional(default));
                }
                '\\' => params.push(ParamSpec::CommandName),
                '>' => params.push(ParamSpec::GreedyToEndOfContext),
                c if c.is_whitespace() => {}
                other => {
                    return Err(anyhow!("Unexpected '{}' in macro prototype '{}'", other, s));
                }
            }
        }
        Ok(Self { params })
    }
}

fn expect_char(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    expected: char,
    whole: &str,
) -> Result<()> {
    match chars.next() {
        Some(c) if c == expected => Ok(()),
        _ => Err(anyhow!("Expected '{}' in macro prototype '{}'", expected, whole)),
    }
}

impl fmt::Display for MacroPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for param in &self.params {
            match param {
                ParamSpec::Mandatory => f.write_str("{}")?,
                ParamSpec::Verbatim => f.write_str("!{}")?,
                ParamSpec::Optional(default) if default.is_empty() => f.write_str("[]")?,
                ParamSpec::Optional(default) => write!(f, "[={}]", default)?,
                ParamSpec::CommandName => f.write_str("\\")?,
                ParamSpec::GreedyToEndOfContext => f.write_str(">")?,
            }
        }
        Ok(())
    }
}
