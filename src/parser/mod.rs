/*!
 * Macro-aware markup parser.
 *
 * The parser scans to the next special character and dispatches on it:
 * `{`/`}` groups, the `\` escape, `$`/`$$`/`\(`/`\)`/`\[`/`\]` math delimiters,
 * `%` comments and any registered active character. Macros are looked up in a
 * [`MacroTable`] for the current mode, then in the other mode, then through the
 * handler's resolver. Their arguments are consumed according to the macro's
 * [`MacroPrototype`] and handed to the [`ParseHandler`], which may return an
 * expansion that is pushed back and scanned as the next input.
 *
 * Malformed input never aborts a parse: the problem is reported as a
 * [`ParseDiagnostic`] and the offending character is kept as literal text.
 *
 * - `prototype`: argument specifications and their compact notation
 * - `table`: per-mode macro tables
 * - `events`: parse events and rendering back to source
 * - `source`: character source with the push-back slot
 */

use std::borrow::Cow;

use log::debug;

use crate::errors::{DiagnosticKind, ParseDiagnostic};

pub use self::events::{MacroInvocation, MathMode, ParseEvent, ParsedArg};
pub use self::prototype::{MacroPrototype, ParamSpec};
pub use self::source::InputSource;
pub use self::table::{Lookup, MacroTable};

pub mod events;
pub mod prototype;
pub mod source;
pub mod table;

const ESCAPE: char = '\\';
const COMMENT: char = '%';
const MATH_SHIFT: char = '$';
const BEGIN_GROUP: char = '{';
const END_GROUP: char = '}';

/// Upper bound on pushed-back expansions in one parse
const MAX_EXPANSIONS: usize = 10_000;

/// Callbacks driven by the parser
pub trait ParseHandler {
    /// Receive an event
    fn event(&mut self, _event: ParseEvent) {}

    /// Replacement text for a macro call, scanned as the next input.
    /// Returning `None` emits the call as a `MacroExpansion` event.
    fn expand(&mut self, _invocation: &MacroInvocation) -> Option<String> {
        None
    }

    /// Replacement text for a comment (without the `%`), scanned as the next input
    fn comment(&mut self, _text: &str) -> Option<String> {
        None
    }

    /// Definition of a macro unknown to the table
    fn resolve(&mut self, _name: &str, _mode: MathMode) -> Option<MacroPrototype> {
        None
    }

    /// A recoverable problem was found
    fn diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        debug!("{}", diagnostic);
    }
}

/// Handler that records every event and diagnostic
#[derive(Debug, Default)]
pub struct EventCollector {
    pub events: Vec<ParseEvent>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParseHandler for EventCollector {
    fn event(&mut self, event: ParseEvent) {
        // Merge adjacent text runs
        if let ParseEvent::Text(text) = &event {
            if let Some(ParseEvent::Text(last)) = self.events.last_mut() {
                last.push_str(text);
                return;
            }
        }
        self.events.push(event);
    }

    fn diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

/// Why an argument could not be read
enum ArgFailure {
    /// Input ended after the opening delimiter; `opener` and `inner` were consumed
    EndOfInput { opener: String, inner: String },
}

/// Streaming tokenizer/expander over markup text
pub struct MacroParser<'t> {
    table: &'t MacroTable,
    source: InputSource,
    math: MathMode,
    depth: usize,
    expansions: usize,
}

impl<'t> MacroParser<'t> {
    /// Create a parser over `text` using `table`
    pub fn new(table: &'t MacroTable, text: impl Into<String>) -> Self {
        Self {
            table,
            source: InputSource::new(text),
            math: MathMode::None,
            depth: 0,
            expansions: 0,
        }
    }

    /// Parse `text` and collect its events
    pub fn parse_events(table: &MacroTable, text: &str) -> EventCollector {
        let mut collector = EventCollector::default();
        MacroParser::new(table, text).parse(&mut collector);
        collector
    }

    /// Re-inject text ahead of the remaining input
    pub fn push_back(&mut self, text: &str) {
        self.source.push_back(text);
    }

    /// Current math state
    pub fn math_mode(&self) -> MathMode {
        self.math
    }

    /// Run the parser to the end of the input
    pub fn parse<H: ParseHandler + ?Sized>(&mut self, handler: &mut H) {
        let mut text = String::new();
        while let Some(c) = self.source.peek() {
            if !self.is_special(c) {
                text.push(c);
                self.source.next_char();
                continue;
            }
            flush_text(&mut text, handler);
            self.source.next_char();
            match c {
                BEGIN_GROUP => {
                    self.depth += 1;
                    handler.event(ParseEvent::OpenGroup);
                }
                END_GROUP => {
                    if self.depth == 0 {
                        self.diagnose(handler, DiagnosticKind::UnmatchedClosing(END_GROUP));
                        text.push(END_GROUP);
                    } else {
                        self.depth -= 1;
                        handler.event(ParseEvent::CloseGroup);
                    }
                }
                COMMENT => {
                    let mut body = String::new();
                    while let Some(n) = self.source.next_char() {
                        body.push(n);
                        if n == '\n' {
                            break;
                        }
                    }
                    match handler.comment(&body) {
                        Some(replacement) => self.source.push_back(&replacement),
                        None => handler.event(ParseEvent::Comment(body)),
                    }
                }
                MATH_SHIFT => {
                    if self.source.peek() == Some(MATH_SHIFT) {
                        self.source.next_char();
                        self.math_delimiter("$$", false, None, &mut text, handler);
                    } else {
                        self.math_delimiter("$", true, None, &mut text, handler);
                    }
                }
                ESCAPE => self.escape(&mut text, handler),
                active => {
                    let proto = self.table.active(active).cloned().unwrap_or_default();
                    let name = active.to_string();
                    self.invoke(name.clone(), name, Cow::Owned(proto), &mut text, handler);
                }
            }
        }
        flush_text(&mut text, handler);
    }

    fn is_special(&self, c: char) -> bool {
        matches!(c, ESCAPE | COMMENT | MATH_SHIFT | BEGIN_GROUP | END_GROUP)
            || self.table.is_active(c)
    }

    fn diagnose<H: ParseHandler + ?Sized>(&self, handler: &mut H, kind: DiagnosticKind) {
        handler.diagnostic(ParseDiagnostic {
            line: self.source.line(),
            kind,
        });
    }

    /// Handle a math delimiter. `open` is `None` for the toggling `$`/`$$`.
    fn math_delimiter<H: ParseHandler + ?Sized>(
        &mut self,
        delimiter: &str,
        inline: bool,
        open: Option<bool>,
        text: &mut String,
        handler: &mut H,
    ) {
        let wanted = if inline { MathMode::Inline } else { MathMode::Block };
        let opening = match open {
            Some(opening) => opening,
            None => self.math != wanted,
        };
        let consistent = if opening {
            self.math == MathMode::None
        } else {
            self.math == wanted
        };
        if !consistent {
            self.diagnose(
                handler,
                DiagnosticKind::MathModeMismatch {
                    found: delimiter.to_string(),
                },
            );
            text.push_str(delimiter);
            return;
        }
        let delimiter = delimiter.to_string();
        if opening {
            self.math = wanted;
            handler.event(ParseEvent::OpenMath { inline, delimiter });
        } else {
            self.math = MathMode::None;
            handler.event(ParseEvent::CloseMath { inline, delimiter });
        }
    }

    /// Handle what follows the escape character
    fn escape<H: ParseHandler + ?Sized>(&mut self, text: &mut String, handler: &mut H) {
        let Some(first) = self.source.peek() else {
            self.diagnose(handler, DiagnosticKind::DanglingEscape);
            text.push(ESCAPE);
            return;
        };

        let mut name = String::new();
        if is_letter(first) {
            self.source.take_while_into(&mut name, is_letter);
            if self.source.peek() == Some('*') {
                let starred = format!("{}*", name);
                if self.table.lookup(&starred, self.math) != Lookup::NotFound {
                    self.source.next_char();
                    name = starred;
                }
            }
        } else {
            self.source.next_char();
            match first {
                '(' => return self.math_delimiter("\\(", true, Some(true), text, handler),
                ')' => return self.math_delimiter("\\)", true, Some(false), text, handler),
                '[' => return self.math_delimiter("\\[", false, Some(true), text, handler),
                ']' => return self.math_delimiter("\\]", false, Some(false), text, handler),
                other => name.push(other),
            }
        }

        let raw = format!("{}{}", ESCAPE, name);
        let table = self.table;
        let proto = match table.lookup(&name, self.math) {
            Lookup::Found(proto) => Some(Cow::Borrowed(proto)),
            Lookup::OtherMode(proto) => {
                self.diagnose(
                    handler,
                    DiagnosticKind::WrongMode {
                        macro_name: name.clone(),
                        math: self.math.is_math(),
                    },
                );
                Some(Cow::Borrowed(proto))
            }
            Lookup::NotFound => handler.resolve(&name, self.math).map(Cow::Owned),
        };
        match proto {
            Some(proto) => self.invoke(name, raw, proto, text, handler),
            None => text.push_str(&raw),
        }
    }

    /// Consume the arguments of a macro and hand the call to the handler
    fn invoke<H: ParseHandler + ?Sized>(
        &mut self,
        name: String,
        mut raw: String,
        proto: Cow<'_, MacroPrototype>,
        text: &mut String,
        handler: &mut H,
    ) {
        let mut args = Vec::with_capacity(proto.params().len());
        for spec in proto.params() {
            match self.read_arg(spec, &name, &mut raw, handler) {
                Ok(arg) => args.push(arg),
                Err(ArgFailure::EndOfInput { opener, inner }) => {
                    self.diagnose(
                        handler,
                        DiagnosticKind::UnexpectedEndOfInput {
                            macro_name: name.clone(),
                        },
                    );
                    // Keep the opener as literal text and rescan what followed it
                    text.push_str(&raw);
                    text.push_str(&opener);
                    self.source.push_back(&inner);
                    return;
                }
            }
        }

        let invocation = MacroInvocation {
            name,
            raw_text: raw,
            args,
            mode: self.math,
        };
        match handler.expand(&invocation) {
            Some(expansion) => {
                self.expansions += 1;
                if self.expansions > MAX_EXPANSIONS {
                    self.diagnose(
                        handler,
                        DiagnosticKind::ExpansionLimit {
                            macro_name: invocation.name.clone(),
                        },
                    );
                    text.push_str(&invocation.raw_text);
                    return;
                }
                flush_text(text, handler);
                self.source.push_back(&expansion);
            }
            None => {
                flush_text(text, handler);
                handler.event(ParseEvent::MacroExpansion {
                    name: invocation.name,
                    raw_text: invocation.raw_text,
                    args: invocation.args,
                });
            }
        }
    }

    fn read_arg<H: ParseHandler + ?Sized>(
        &mut self,
        spec: &ParamSpec,
        name: &str,
        raw: &mut String,
        handler: &mut H,
    ) -> Result<ParsedArg, ArgFailure> {
        match spec {
            ParamSpec::Mandatory => self.read_mandatory(name, raw, handler, true),
            ParamSpec::Verbatim => self.read_mandatory(name, raw, handler, false),
            ParamSpec::CommandName => {
                let mut arg = self.read_mandatory(name, raw, handler, false)?;
                arg.text = arg.text.trim().to_string();
                Ok(arg)
            }
            ParamSpec::Optional(default) => {
                let ws = self.count_whitespace();
                if self.source.peek_nth(ws) != Some('[') {
                    return Ok(ParsedArg::new(default.clone(), true));
                }
                self.skip_whitespace(raw);
                self.source.next_char();
                let mut inner = String::new();
                if !self.read_until_bracket(&mut inner) {
                    return Err(ArgFailure::EndOfInput {
                        opener: "[".to_string(),
                        inner,
                    });
                }
                raw.push('[');
                raw.push_str(&inner);
                raw.push(']');
                Ok(ParsedArg::new(inner, true))
            }
            ParamSpec::GreedyToEndOfContext => {
                let mut inner = String::new();
                let mut depth = 0usize;
                while let Some(c) = self.source.peek() {
                    if c == END_GROUP && depth == 0 {
                        break;
                    }
                    self.source.next_char();
                    inner.push(c);
                    match c {
                        ESCAPE => {
                            if let Some(n) = self.source.next_char() {
                                inner.push(n);
                            }
                        }
                        BEGIN_GROUP => depth += 1,
                        END_GROUP => depth -= 1,
                        _ => {}
                    }
                }
                raw.push_str(&inner);
                Ok(ParsedArg::new(inner, false))
            }
        }
    }

    /// A single character, a control sequence or a balanced group
    fn read_mandatory<H: ParseHandler + ?Sized>(
        &mut self,
        name: &str,
        raw: &mut String,
        handler: &mut H,
        expandable: bool,
    ) -> Result<ParsedArg, ArgFailure> {
        self.skip_whitespace(raw);
        match self.source.peek() {
            None | Some(END_GROUP) => {
                self.diagnose(
                    handler,
                    DiagnosticKind::UnexpectedEndOfInput {
                        macro_name: name.to_string(),
                    },
                );
                Ok(ParsedArg::new(String::new(), expandable))
            }
            Some(BEGIN_GROUP) => {
                self.source.next_char();
                let mut inner = String::new();
                if !self.read_balanced(&mut inner, expandable) {
                    return Err(ArgFailure::EndOfInput {
                        opener: BEGIN_GROUP.to_string(),
                        inner,
                    });
                }
                raw.push(BEGIN_GROUP);
                raw.push_str(&inner);
                raw.push(END_GROUP);
                Ok(ParsedArg::new(inner, expandable))
            }
            Some(ESCAPE) => {
                let mut token = String::new();
                self.source.next_char();
                token.push(ESCAPE);
                match self.source.peek() {
                    Some(c) if is_letter(c) => self.source.take_while_into(&mut token, is_letter),
                    Some(_) => {
                        if let Some(c) = self.source.next_char() {
                            token.push(c);
                        }
                    }
                    None => {}
                }
                raw.push_str(&token);
                Ok(ParsedArg::new(token, expandable))
            }
            Some(_) => {
                let mut token = String::new();
                if let Some(c) = self.source.next_char() {
                    token.push(c);
                }
                raw.push_str(&token);
                Ok(ParsedArg::new(token, expandable))
            }
        }
    }

    /// Read up to the `}` matching an already consumed `{`.
    /// Returns false when the input ends first.
    fn read_balanced(&mut self, inner: &mut String, comments: bool) -> bool {
        let mut depth = 1usize;
        while let Some(c) = self.source.next_char() {
            match c {
                ESCAPE => {
                    inner.push(c);
                    if let Some(n) = self.source.next_char() {
                        inner.push(n);
                    }
                }
                BEGIN_GROUP => {
                    depth += 1;
                    inner.push(c);
                }
                END_GROUP => {
                    depth -= 1;
                    if depth == 0 {
                        return true;
                    }
                    inner.push(c);
                }
                COMMENT if comments => {
                    inner.push(c);
                    while let Some(n) = self.source.next_char() {
                        inner.push(n);
                        if n == '\n' {
                            break;
                        }
                    }
                }
                _ => inner.push(c),
            }
        }
        false
    }

    /// Read up to the `]` closing an optional argument, at brace depth zero
    fn read_until_bracket(&mut self, inner: &mut String) -> bool {
        let mut depth = 0usize;
        while let Some(c) = self.source.next_char() {
            match c {
                ESCAPE => {
                    inner.push(c);
                    if let Some(n) = self.source.next_char() {
                        inner.push(n);
                    }
                }
                BEGIN_GROUP => {
                    depth += 1;
                    inner.push(c);
                }
                END_GROUP => {
                    depth = depth.saturating_sub(1);
                    inner.push(c);
                }
                ']' if depth == 0 => return true,
                _ => inner.push(c),
            }
        }
        false
    }

    fn count_whitespace(&self) -> usize {
        let mut n = 0;
        while matches!(self.source.peek_nth(n), Some(c) if c.is_whitespace()) {
            n += 1;
        }
        n
    }

    fn skip_whitespace(&mut self, raw: &mut String) {
        self.source.take_while_into(raw, char::is_whitespace);
    }
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '@'
}

fn flush_text<H: ParseHandler + ?Sized>(text: &mut String, handler: &mut H) {
    if !text.is_empty() {
        handler.event(ParseEvent::Text(std::mem::take(text)));
    }
}
