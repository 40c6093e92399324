/*!
 * Events produced by the macro parser.
 */

/// Current math state of the parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MathMode {
    /// Text mode
    #[default]
    None,
    /// Inside `$...$` or `\(...\)`
    Inline,
    /// Inside `$$...$$` or `\[...\]`
    Block,
}

impl MathMode {
    /// Whether this is one of the math states
    pub fn is_math(self) -> bool {
        self != MathMode::None
    }
}

/// One consumed macro argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArg {
    /// Argument text without its delimiters
    pub text: String,
    /// False for verbatim, command-name and greedy arguments
    pub expandable: bool,
}

impl ParsedArg {
    pub fn new(text: impl Into<String>, expandable: bool) -> Self {
        Self {
            text: text.into(),
            expandable,
        }
    }
}

/// A macro call with its consumed arguments, handed to the parse handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInvocation {
    /// Macro name without the escape character (an active character for active macros)
    pub name: String,
    /// Exact source text of the call, arguments included
    pub raw_text: String,
    /// Arguments in prototype order
    pub args: Vec<ParsedArg>,
    /// Math state in which the macro was invoked
    pub mode: MathMode,
}

impl MacroInvocation {
    /// Text of the argument at `index`, empty if absent
    pub fn arg(&self, index: usize) -> &str {
        self.args.get(index).map(|a| a.text.as_str()).unwrap_or("")
    }
}

/// Tagged output of the parser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Text(String),
    OpenGroup,
    CloseGroup,
    OpenMath { inline: bool, delimiter: String },
    CloseMath { inline: bool, delimiter: String },
    Comment(String),
    MacroExpansion {
        name: String,
        raw_text: String,
        args: Vec<ParsedArg>,
    },
}

impl ParseEvent {
    /// Render a sequence of events back to markup source.
    ///
    /// Unmodified events reproduce the structure they were parsed from.
    pub fn render(events: &[ParseEvent]) -> String {
        let mut out = String::new();
        for event in events {
            match event {
                ParseEvent::Text(text) => out.push_str(text),
                ParseEvent::OpenGroup => out.push('{'),
                ParseEvent::CloseGroup => out.push('}'),
                ParseEvent::OpenMath { delimiter, .. } | ParseEvent::CloseMath { delimiter, .. } => {
                    out.push_str(delimiter)
                }
                ParseEvent::Comment(text) => {
                    out.push('%');
                    out.push_str(text);
                }
                ParseEvent::MacroExpansion { raw_text, .. } => out.push_str(raw_text),
            }
        }
        out
    }

    /// Difference between opened and closed groups, counting macro arguments too
    pub fn group_balance(events: &[ParseEvent]) -> i64 {
        events.iter().fold(0, |acc, event| match event {
            ParseEvent::OpenGroup => acc + 1,
            ParseEvent::CloseGroup => acc - 1,
            _ => acc,
        })
    }
}
