/*!
 * Character source with a single push-back slot.
 *
 * Text pushed back is read before anything else from the underlying input.
 * Pushing back again while the slot still holds unread text prepends the new
 * text to what is left, so the slot stays a single contiguous buffer.
 */

/// Input text plus a pending buffer consumed first
#[derive(Debug, Default)]
pub struct InputSource {
    text: String,
    pos: usize,
    pending: String,
    pending_pos: usize,
    line: usize,
}

impl InputSource {
    /// Create a source over the given text
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            pos: 0,
            pending: String::new(),
            pending_pos: 0,
            line: 1,
        }
    }

    /// Re-inject text so it is scanned as the next input
    pub fn push_back(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let rest = &self.pending[self.pending_pos..];
        let mut merged = String::with_capacity(text.len() + rest.len());
        merged.push_str(text);
        merged.push_str(rest);
        self.pending = merged;
        self.pending_pos = 0;
    }

    /// Whether unread pushed-back text remains
    pub fn has_pending(&self) -> bool {
        self.pending_pos < self.pending.len()
    }

    /// Line of the underlying input the next character comes from
    pub fn line(&self) -> usize {
        self.line
    }

    /// Whether all input, pending and underlying, has been consumed
    pub fn is_eof(&self) -> bool {
        !self.has_pending() && self.pos >= self.text.len()
    }

    /// Look at the next character without consuming it
    pub fn peek(&self) -> Option<char> {
        if self.has_pending() {
            return self.pending[self.pending_pos..].chars().next();
        }
        self.text[self.pos..].chars().next()
    }

    /// Look `n` characters ahead (0 is the same as `peek`)
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        let pending = &self.pending[self.pending_pos..];
        let pending_len = pending.chars().count();
        if n < pending_len {
            return pending.chars().nth(n);
        }
        self.text[self.pos..].chars().nth(n - pending_len)
    }

    /// Consume the next character
    pub fn next_char(&mut self) -> Option<char> {
        if self.has_pending() {
            let c = self.pending[self.pending_pos..].chars().next()?;
            self.pending_pos += c.len_utf8();
            if !self.has_pending() {
                self.pending.clear();
                self.pending_pos = 0;
            }
            return Some(c);
        }
        let c = self.text[self.pos..].chars().next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Consume characters while the predicate holds, appending them to `out`
    pub fn take_while_into<F: Fn(char) -> bool>(&mut self, out: &mut String, pred: F) {
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.next_char();
        }
    }
}
