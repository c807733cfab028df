//! Minimal shell-aware tokenizer.
//!
//! Honors single quotes, double quotes and backslash escapes, and splits out
//! the control and redirection operators the policy checks care about. It
//! does not expand variables or globs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOperator {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `;` or a newline
    Semi,
    /// `|`
    Pipe,
    /// trailing `&`
    Background,
    /// `>`, `&>`, `N>`
    RedirectOut,
    /// `>>`
    RedirectAppend,
    /// `<`, `<<`
    RedirectIn,
    /// `>&`, `N>&`
    RedirectDup,
}

impl ShellOperator {
    /// Operators that separate independent commands.
    pub fn is_connector(self) -> bool {
        matches!(
            self,
            ShellOperator::And
                | ShellOperator::Or
                | ShellOperator::Semi
                | ShellOperator::Pipe
                | ShellOperator::Background
        )
    }

    pub fn writes_target(self) -> bool {
        matches!(self, ShellOperator::RedirectOut | ShellOperator::RedirectAppend)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellToken {
    Word(String),
    Op(ShellOperator),
}

impl ShellToken {
    pub fn as_word(&self) -> Option<&str> {
        match self {
            ShellToken::Word(w) => Some(w),
            ShellToken::Op(_) => None,
        }
    }
}

struct Lexer {
    tokens: Vec<ShellToken>,
    word: String,
    in_word: bool,
}

impl Lexer {
    fn flush(&mut self) {
        if self.in_word {
            self.tokens.push(ShellToken::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }

    fn push_char(&mut self, ch: char) {
        self.word.push(ch);
        self.in_word = true;
    }

    fn op(&mut self, op: ShellOperator) {
        self.flush();
        self.tokens.push(ShellToken::Op(op));
    }

    /// A bare fd number right before a redirection belongs to the operator.
    fn drop_fd_prefix(&mut self) {
        if self.in_word && !self.word.is_empty() && self.word.chars().all(|c| c.is_ascii_digit()) {
            self.word.clear();
            self.in_word = false;
        }
    }
}

pub fn tokenize(command: &str) -> Vec<ShellToken> {
    let mut lx = Lexer {
        tokens: Vec::new(),
        word: String::new(),
        in_word: false,
    };
    let mut chars = command.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                if let Some(next) = chars.next() {
                    if next != '\n' {
                        lx.push_char(next);
                    }
                }
            }
            '\'' => {
                lx.in_word = true;
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                    lx.word.push(c);
                }
            }
            '"' => {
                lx.in_word = true;
                while let Some(c) = chars.next() {
                    match c {
                        '"' => break,
                        '\\' => match chars.peek() {
                            Some(&n) if matches!(n, '"' | '\\' | '$' | '`') => {
                                lx.word.push(n);
                                chars.next();
                            }
                            _ => lx.word.push('\\'),
                        },
                        other => lx.word.push(other),
                    }
                }
            }
            ';' | '\n' => lx.op(ShellOperator::Semi),
            '&' => {
                if chars.peek() == Some(&'&') {
                    chars.next();
                    lx.op(ShellOperator::And);
                } else if chars.peek() == Some(&'>') {
                    chars.next();
                    if chars.peek() == Some(&'>') {
                        chars.next();
                        lx.op(ShellOperator::RedirectAppend);
                    } else {
                        lx.op(ShellOperator::RedirectOut);
                    }
                } else {
                    lx.op(ShellOperator::Background);
                }
            }
            '|' => {
                if chars.peek() == Some(&'|') {
                    chars.next();
                    lx.op(ShellOperator::Or);
                } else {
                    lx.op(ShellOperator::Pipe);
                }
            }
            '>' => {
                lx.drop_fd_prefix();
                match chars.peek() {
                    Some(&'>') => {
                        chars.next();
                        lx.op(ShellOperator::RedirectAppend);
                    }
                    Some(&'&') => {
                        chars.next();
                        lx.op(ShellOperator::RedirectDup);
                    }
                    Some(&'|') => {
                        chars.next();
                        lx.op(ShellOperator::RedirectOut);
                    }
                    _ => lx.op(ShellOperator::RedirectOut),
                }
            }
            '<' => {
                lx.drop_fd_prefix();
                if chars.peek() == Some(&'<') {
                    chars.next();
                }
                lx.op(ShellOperator::RedirectIn);
            }
            c if c.is_whitespace() => lx.flush(),
            c => lx.push_char(c),
        }
    }
    lx.flush();
    lx.tokens
}

/// True when the shell would expand a parameter (`$NAME`, `${..}`), a command
/// substitution (`$(..)`, backticks) or arithmetic in `command`. Single-quoted
/// and backslash-escaped text is literal.
pub fn has_shell_expansion(command: &str) -> bool {
    let mut chars = command.chars().peekable();
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '\'' if !in_double => {
                for c in chars.by_ref() {
                    if c == '\'' {
                        break;
                    }
                }
            }
            '"' => in_double = !in_double,
            '`' => return true,
            '$' => {
                if let Some(&next) = chars.peek() {
                    if next.is_ascii_alphabetic() || matches!(next, '_' | '{' | '(') {
                        return true;
                    }
                }
            }
            _ => {}
        }
    }
    false
}

/// Plain words of a command, operators dropped.
pub fn split_words(command: &str) -> Vec<String> {
    tokenize(command)
        .into_iter()
        .filter_map(|t| match t {
            ShellToken::Word(w) => Some(w),
            ShellToken::Op(_) => None,
        })
        .collect()
}

/// Split a token stream on `&&`, `||`, `;`, `|` and `&`.
pub fn split_segments(tokens: &[ShellToken]) -> Vec<&[ShellToken]> {
    tokens
        .split(|t| matches!(t, ShellToken::Op(op) if op.is_connector()))
        .filter(|segment| !segment.is_empty())
        .collect()
}
