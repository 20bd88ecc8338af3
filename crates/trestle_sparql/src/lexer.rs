//! SPARQL tokenizer.
//!
//! Turns query text into positioned tokens. Keywords and function names are
//! not distinguished here: every bare word is a [`Token::Name`] and the parser
//! matches them case-insensitively. Numbers are lexed unsigned; signs are
//! operators.

use crate::{Error, Result};

/// A SPARQL token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `<...>`, escapes decoded, not yet resolved against the base.
    Iri(String),
    /// `prefix:local`; `prefix:` has an empty local part.
    PrefixedName { prefix: String, local: String },
    /// `?name` or `$name`, without the sigil.
    Var(String),
    /// `_:label`
    BlankLabel(String),
    /// Quoted string content, escapes decoded.
    String(String),
    /// `@lang`
    LangTag(String),
    Integer(String),
    Decimal(String),
    Double(String),
    /// Keyword, function name, `a`, `true` or `false`.
    Name(String),
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Dot,
    Comma,
    Semicolon,
    Star,
    Plus,
    Minus,
    Slash,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Bang,
    DoubleCaret,
    Caret,
    Pipe,
    Question,
    Eof,
}

impl Token {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Iri(iri) => format!("<{}>", iri),
            Token::PrefixedName { prefix, local } => format!("{}:{}", prefix, local),
            Token::Var(name) => format!("?{}", name),
            Token::BlankLabel(label) => format!("_:{}", label),
            Token::String(_) => "string literal".into(),
            Token::LangTag(tag) => format!("@{}", tag),
            Token::Integer(s) | Token::Decimal(s) | Token::Double(s) => s.clone(),
            Token::Name(name) => format!("'{}'", name),
            Token::Eof => "end of query".into(),
            other => format!("'{}'", other.punctuation()),
        }
    }

    fn punctuation(&self) -> &'static str {
        match self {
            Token::OpenBrace => "{",
            Token::CloseBrace => "}",
            Token::OpenParen => "(",
            Token::CloseParen => ")",
            Token::OpenBracket => "[",
            Token::CloseBracket => "]",
            Token::Dot => ".",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Star => "*",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Slash => "/",
            Token::Eq => "=",
            Token::Ne => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::And => "&&",
            Token::Or => "||",
            Token::Bang => "!",
            Token::DoubleCaret => "^^",
            Token::Caret => "^",
            Token::Pipe => "|",
            Token::Question => "?",
            _ => "",
        }
    }

    /// True for a bare word equal to `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Name(name) if name.eq_ignore_ascii_case(keyword))
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    /// 1-based line.
    pub line: usize,
    /// 1-based column, in characters.
    pub column: usize,
    /// Byte offset into the query text.
    pub offset: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '\u{B7}')
}

fn is_var_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '\u{B7}')
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

/// Tokenizes a whole query. The last token is always [`Token::Eof`].
pub fn tokenize(text: &str) -> Result<Vec<Spanned>> {
    let mut lexer = Lexer {
        text,
        pos: 0,
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let spanned = lexer.next_token()?;
        let done = spanned.token == Token::Eof;
        tokens.push(spanned);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::syntax(self.line, self.column, self.pos, message)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace_and_comments();
        let (line, column, offset) = (self.line, self.column, self.pos);
        let token = match self.peek() {
            None => Token::Eof,
            Some(c) => self.lex_token(c)?,
        };
        Ok(Spanned {
            token,
            line,
            column,
            offset,
        })
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.bump();
        Ok(token)
    }

    /// Consumes `c` and returns `long` if the next char is `second`, else `short`.
    fn one_or_two(&mut self, second: char, long: Token, short: Token) -> Result<Token> {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            Ok(long)
        } else {
            Ok(short)
        }
    }

    fn lex_token(&mut self, c: char) -> Result<Token> {
        match c {
            '<' if self.looks_like_iri() => self.lex_iri(),
            '<' => self.one_or_two('=', Token::Le, Token::Lt),
            '>' => self.one_or_two('=', Token::Ge, Token::Gt),
            '!' => self.one_or_two('=', Token::Ne, Token::Bang),
            '^' => self.one_or_two('^', Token::DoubleCaret, Token::Caret),
            '|' => self.one_or_two('|', Token::Or, Token::Pipe),
            '&' => {
                self.bump();
                if self.bump() == Some('&') {
                    Ok(Token::And)
                } else {
                    Err(self.error("expected '&&'"))
                }
            }
            '?' | '$' if self.peek_nth(1).is_some_and(is_var_char) => self.lex_var(),
            '?' => self.single(Token::Question),
            '"' | '\'' => self.lex_string(c),
            '@' => self.lex_lang_tag(),
            '_' if self.peek_nth(1) == Some(':') => self.lex_blank_label(),
            '0'..='9' => self.lex_number(),
            '.' if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
            '.' => self.single(Token::Dot),
            ',' => self.single(Token::Comma),
            ';' => self.single(Token::Semicolon),
            '{' => self.single(Token::OpenBrace),
            '}' => self.single(Token::CloseBrace),
            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '[' => self.single(Token::OpenBracket),
            ']' => self.single(Token::CloseBracket),
            '*' => self.single(Token::Star),
            '+' => self.single(Token::Plus),
            '-' => self.single(Token::Minus),
            '/' => self.single(Token::Slash),
            '=' => self.single(Token::Eq),
            c if is_name_start(c) || c == ':' => self.lex_name(),
            c => Err(self.error(format!("unexpected character {:?}", c))),
        }
    }

    /// An IRI runs to a '>' without whitespace or forbidden characters;
    /// anything else starting with '<' is a comparison.
    fn looks_like_iri(&self) -> bool {
        for c in self.text[self.pos + 1..].chars() {
            match c {
                '>' => return true,
                c if c.is_whitespace() || "<\"{}|^`".contains(c) => return false,
                _ => {}
            }
        }
        false
    }

    fn lex_hex_escape(&mut self, digits: usize) -> Result<char> {
        let mut value = 0u32;
        for _ in 0..digits {
            let c = self
                .bump()
                .ok_or_else(|| self.error("unterminated unicode escape"))?;
            let digit = c
                .to_digit(16)
                .ok_or_else(|| self.error(format!("invalid hex digit {:?} in escape", c)))?;
            value = value * 16 + digit;
        }
        char::from_u32(value).ok_or_else(|| self.error(format!("invalid code point U+{:X}", value)))
    }

    fn lex_iri(&mut self) -> Result<Token> {
        self.bump();
        let mut iri = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated IRI")),
                Some('>') => return Ok(Token::Iri(iri)),
                Some('\\') => match self.bump() {
                    Some('u') => iri.push(self.lex_hex_escape(4)?),
                    Some('U') => iri.push(self.lex_hex_escape(8)?),
                    _ => return Err(self.error("invalid escape in IRI")),
                },
                Some(c) => iri.push(c),
            }
        }
    }

    fn lex_var(&mut self) -> Result<Token> {
        self.bump();
        let mut name = String::new();
        while let Some(c) = self.peek().filter(|c| is_var_char(*c)) {
            name.push(c);
            self.bump();
        }
        Ok(Token::Var(name))
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        let (line, column, offset) = (self.line, self.column, self.pos);
        let long = self.peek_nth(1) == Some(quote) && self.peek_nth(2) == Some(quote);
        let opening = if long { 3 } else { 1 };
        for _ in 0..opening {
            self.bump();
        }

        let mut value = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| Error::syntax(line, column, offset, "unterminated string literal"))?;
            match c {
                '\\' => value.push(self.lex_string_escape()?),
                c if c == quote && !long => return Ok(Token::String(value)),
                c if c == quote
                    && self.peek() == Some(quote)
                    && self.peek_nth(1) == Some(quote)
                    && self.peek_nth(2) != Some(quote) =>
                {
                    self.bump();
                    self.bump();
                    return Ok(Token::String(value));
                }
                '\n' | '\r' if !long => {
                    return Err(Error::syntax(
                        line,
                        column,
                        offset,
                        "line break in short string literal",
                    ))
                }
                c => value.push(c),
            }
        }
    }

    fn lex_string_escape(&mut self) -> Result<char> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('b') => Ok('\u{8}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('f') => Ok('\u{C}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.lex_hex_escape(4),
            Some('U') => self.lex_hex_escape(8),
            Some(c) => Err(self.error(format!("invalid escape '\\{}'", c))),
            None => Err(self.error("unterminated escape")),
        }
    }

    fn lex_lang_tag(&mut self) -> Result<Token> {
        self.bump();
        let mut tag = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() || (!tag.is_empty() && (c.is_ascii_alphanumeric() || c == '-')) {
                tag.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if tag.is_empty() {
            return Err(self.error("expected language tag after '@'"));
        }
        Ok(Token::LangTag(tag))
    }

    fn lex_blank_label(&mut self) -> Result<Token> {
        self.bump();
        self.bump();
        let mut label = String::new();
        loop {
            match self.peek() {
                Some(c) if is_name_char(c) => {
                    label.push(c);
                    self.bump();
                }
                Some('.') if !label.is_empty() && self.dot_continues_name() => {
                    label.push('.');
                    self.bump();
                }
                _ => break,
            }
        }
        if label.is_empty() {
            return Err(self.error("invalid blank node label"));
        }
        Ok(Token::BlankLabel(label))
    }

    fn dot_continues_name(&self) -> bool {
        let mut n = 0;
        while self.peek_nth(n) == Some('.') {
            n += 1;
        }
        self.peek_nth(n).is_some_and(is_name_char)
    }

    fn digits(&mut self, out: &mut String) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            out.push(c);
            self.bump();
            count += 1;
        }
        count
    }

    fn lex_number(&mut self) -> Result<Token> {
        let mut lexical = String::new();
        let mut digits = self.digits(&mut lexical);

        let mut decimal = false;
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            decimal = true;
            lexical.push('.');
            self.bump();
            digits += self.digits(&mut lexical);
        }
        if digits == 0 {
            return Err(self.error("expected digits"));
        }

        if let Some(e @ ('e' | 'E')) = self.peek() {
            lexical.push(e);
            self.bump();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                lexical.push(sign);
                self.bump();
            }
            if self.digits(&mut lexical) == 0 {
                return Err(self.error("expected exponent digits"));
            }
            return Ok(Token::Double(lexical));
        }

        Ok(if decimal {
            Token::Decimal(lexical)
        } else {
            Token::Integer(lexical)
        })
    }

    fn lex_name(&mut self) -> Result<Token> {
        let mut prefix = String::new();
        while let Some(c) = self.peek() {
            if is_name_char(c) {
                prefix.push(c);
                self.bump();
            } else if c == '.' && !prefix.is_empty() && self.dot_continues_name() {
                prefix.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if self.peek() != Some(':') {
            return Ok(Token::Name(prefix));
        }
        self.bump();

        let mut local = String::new();
        loop {
            match self.peek() {
                Some(c) if is_name_char(c) || c == ':' => {
                    local.push(c);
                    self.bump();
                }
                Some('.') if !local.is_empty() && self.dot_continues_name() => {
                    local.push('.');
                    self.bump();
                }
                Some('%') => {
                    self.bump();
                    local.push('%');
                    for _ in 0..2 {
                        match self.bump() {
                            Some(h) if h.is_ascii_hexdigit() => local.push(h),
                            _ => return Err(self.error("invalid percent escape in local name")),
                        }
                    }
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some(c) if "_~.-!$&'()*+,;=/?#@%".contains(c) => local.push(c),
                        _ => return Err(self.error("invalid escape in local name")),
                    }
                }
                _ => break,
            }
        }
        Ok(Token::PrefixedName { prefix, local })
    }
}
