//! Turtle tokenizer.
//!
//! Produces positioned tokens from Turtle (and N-Triples) text. String and IRI
//! escapes are decoded here; prefix expansion and IRI resolution are left to
//! the parser, which owns the prefix and base state.

use crate::{Error, Result};

/// A Turtle token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `<...>`, escapes decoded, not yet resolved against the base.
    IriRef(String),
    /// `prefix:local`, local escapes decoded. `prefix:` has an empty local.
    PrefixedName { prefix: String, local: String },
    /// `_:label`
    BlankLabel(String),
    /// Quoted string content, escapes decoded.
    String(String),
    /// `@lang`
    LangTag(String),
    /// Integer lexical form.
    Integer(String),
    /// Decimal lexical form.
    Decimal(String),
    /// Double lexical form.
    Double(String),
    /// `true` / `false`
    Boolean(bool),
    /// The `a` keyword.
    A,
    /// `@prefix`
    AtPrefix,
    /// `@base`
    AtBase,
    /// `PREFIX` (case-insensitive)
    SparqlPrefix,
    /// `BASE` (case-insensitive)
    SparqlBase,
    Dot,
    Semicolon,
    Comma,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
    DoubleCaret,
    Eof,
}

impl Token {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::IriRef(iri) => format!("<{}>", iri),
            Token::PrefixedName { prefix, local } => format!("{}:{}", prefix, local),
            Token::BlankLabel(label) => format!("_:{}", label),
            Token::String(_) => "string literal".into(),
            Token::LangTag(tag) => format!("@{}", tag),
            Token::Integer(s) | Token::Decimal(s) | Token::Double(s) => s.clone(),
            Token::Boolean(b) => b.to_string(),
            Token::A => "'a'".into(),
            Token::AtPrefix => "@prefix".into(),
            Token::AtBase => "@base".into(),
            Token::SparqlPrefix => "PREFIX".into(),
            Token::SparqlBase => "BASE".into(),
            Token::Dot => "'.'".into(),
            Token::Semicolon => "';'".into(),
            Token::Comma => "','".into(),
            Token::OpenBracket => "'['".into(),
            Token::CloseBracket => "']'".into(),
            Token::OpenParen => "'('".into(),
            Token::CloseParen => "')'".into(),
            Token::DoubleCaret => "'^^'".into(),
            Token::Eof => "end of input".into(),
        }
    }
}

/// A token with the 1-based position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// Turtle tokenizer over an in-memory document.
pub struct Lexer<'a> {
    source_id: &'a str,
    text: &'a str,
    pos: usize,
    line: usize,
    column: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '\u{B7}')
}

fn is_local_escapable(c: char) -> bool {
    "_~.-!$&'()*+,;=/?#@%".contains(c)
}

impl<'a> Lexer<'a> {
    /// Creates a lexer. `source_id` is only used for error reporting.
    pub fn new(source_id: &'a str, text: &'a str) -> Self {
        Self {
            source_id,
            text: text.strip_prefix('\u{FEFF}').unwrap_or(text),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

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

    fn error_at(&self, line: usize, column: usize, message: impl Into<String>) -> Error {
        Error::syntax(self.source_id, line, column, message)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        self.error_at(self.line, self.column, message)
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

    /// Returns the next token, [`Token::Eof`] once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Spanned> {
        self.skip_whitespace_and_comments();
        let (line, column) = (self.line, self.column);
        let token = match self.peek() {
            None => Token::Eof,
            Some(c) => self.lex_token(c)?,
        };
        Ok(Spanned {
            token,
            line,
            column,
        })
    }

    fn lex_token(&mut self, c: char) -> Result<Token> {
        match c {
            '<' => self.lex_iri(),
            '"' | '\'' => self.lex_string(c),
            '@' => self.lex_at(),
            '_' if self.peek_nth(1) == Some(':') => self.lex_blank_label(),
            '0'..='9' | '+' | '-' => self.lex_number(),
            '.' if self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number(),
            '.' => self.single(Token::Dot),
            ';' => self.single(Token::Semicolon),
            ',' => self.single(Token::Comma),
            '[' => self.single(Token::OpenBracket),
            ']' => self.single(Token::CloseBracket),
            '(' => self.single(Token::OpenParen),
            ')' => self.single(Token::CloseParen),
            '^' => {
                self.bump();
                if self.bump() == Some('^') {
                    Ok(Token::DoubleCaret)
                } else {
                    Err(self.error("expected '^^'"))
                }
            }
            c if is_name_start(c) || c == ':' => self.lex_name(),
            c => Err(self.error(format!("unexpected character {:?}", c))),
        }
    }

    fn single(&mut self, token: Token) -> Result<Token> {
        self.bump();
        Ok(token)
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
                Some('>') => return Ok(Token::IriRef(iri)),
                Some('\\') => match self.bump() {
                    Some('u') => iri.push(self.lex_hex_escape(4)?),
                    Some('U') => iri.push(self.lex_hex_escape(8)?),
                    _ => return Err(self.error("invalid escape in IRI")),
                },
                Some(c) if c <= ' ' || "<\"{}|^`".contains(c) => {
                    return Err(self.error(format!("invalid character {:?} in IRI", c)))
                }
                Some(c) => iri.push(c),
            }
        }
    }

    fn lex_string(&mut self, quote: char) -> Result<Token> {
        let (line, column) = (self.line, self.column);
        let long = self.peek_nth(1) == Some(quote) && self.peek_nth(2) == Some(quote);
        if long {
            self.bump();
            self.bump();
            self.bump();
        } else {
            self.bump();
        }

        let mut value = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.error_at(line, column, "unterminated string literal"))?;
            match c {
                '\\' => value.push(self.lex_string_escape()?),
                c if c == quote && !long => return Ok(Token::String(value)),
                c if c == quote
                    && self.peek() == Some(quote)
                    && self.peek_nth(1) == Some(quote)
                    // Quotes directly before the closing delimiter belong to the content.
                    && self.peek_nth(2) != Some(quote) =>
                {
                    self.bump();
                    self.bump();
                    return Ok(Token::String(value));
                }
                '\n' | '\r' if !long => {
                    return Err(self.error_at(line, column, "line break in short string literal"))
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

    fn lex_at(&mut self) -> Result<Token> {
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
        match tag.as_str() {
            "" => Err(self.error("expected language tag or directive after '@'")),
            "prefix" => Ok(Token::AtPrefix),
            "base" => Ok(Token::AtBase),
            _ => Ok(Token::LangTag(tag)),
        }
    }

    fn lex_blank_label(&mut self) -> Result<Token> {
        self.bump();
        self.bump();
        let first = self
            .peek()
            .filter(|c| is_name_char(*c) && *c != '-')
            .ok_or_else(|| self.error("invalid blank node label"))?;
        let mut label = String::from(first);
        self.bump();
        loop {
            match self.peek() {
                Some(c) if is_name_char(c) => {
                    label.push(c);
                    self.bump();
                }
                Some('.') if self.dot_continues_name() => {
                    label.push('.');
                    self.bump();
                }
                _ => return Ok(Token::BlankLabel(label)),
            }
        }
    }

    /// A '.' inside a name is only part of it when more name follows.
    fn dot_continues_name(&self) -> bool {
        let mut n = 0;
        while self.peek_nth(n) == Some('.') {
            n += 1;
        }
        self.peek_nth(n)
            .is_some_and(|c| is_name_char(c) || matches!(c, ':' | '%' | '\\'))
    }

    fn lex_number(&mut self) -> Result<Token> {
        let mut lexical = String::new();
        if let Some(sign @ ('+' | '-')) = self.peek() {
            lexical.push(sign);
            self.bump();
        }
        let mut digits = 0;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            lexical.push(c);
            self.bump();
            digits += 1;
        }

        let mut decimal = false;
        if self.peek() == Some('.') && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) {
            decimal = true;
            lexical.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                lexical.push(c);
                self.bump();
                digits += 1;
            }
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
            let mut exponent_digits = 0;
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                lexical.push(c);
                self.bump();
                exponent_digits += 1;
            }
            if exponent_digits == 0 {
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
            } else if c == '.' && self.dot_continues_name() && self.peek_nth(1) != Some(':') {
                prefix.push(c);
                self.bump();
            } else {
                break;
            }
        }

        if self.peek() != Some(':') {
            return match prefix.as_str() {
                "a" => Ok(Token::A),
                "true" => Ok(Token::Boolean(true)),
                "false" => Ok(Token::Boolean(false)),
                p if p.eq_ignore_ascii_case("prefix") => Ok(Token::SparqlPrefix),
                p if p.eq_ignore_ascii_case("base") => Ok(Token::SparqlBase),
                p => Err(self.error(format!("unexpected name '{}'", p))),
            };
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
                        Some(c) if is_local_escapable(c) => local.push(c),
                        _ => return Err(self.error("invalid escape in local name")),
                    }
                }
                _ => break,
            }
        }
        Ok(Token::PrefixedName { prefix, local })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        let mut lexer = Lexer::new("test", text);
        let mut out = Vec::new();
        loop {
            let spanned = lexer.next_token().unwrap();
            if spanned.token == Token::Eof {
                return out;
            }
            out.push(spanned.token);
        }
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            tokens("<http://ex.org/s> ex:p \"o\" ."),
            vec![
                Token::IriRef("http://ex.org/s".into()),
                Token::PrefixedName {
                    prefix: "ex".into(),
                    local: "p".into()
                },
                Token::String("o".into()),
                Token::Dot,
            ]
        );
    }

    #[test]
    fn test_trailing_dot_not_in_local_name() {
        assert_eq!(
            tokens("ex:a.b ex:c."),
            vec![
                Token::PrefixedName {
                    prefix: "ex".into(),
                    local: "a.b".into()
                },
                Token::PrefixedName {
                    prefix: "ex".into(),
                    local: "c".into()
                },
                Token::Dot,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1 -2.5 3e10 .5 4."),
            vec![
                Token::Integer("1".into()),
                Token::Decimal("-2.5".into()),
                Token::Double("3e10".into()),
                Token::Decimal(".5".into()),
                Token::Integer("4".into()),
                Token::Dot,
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_long_strings() {
        assert_eq!(
            tokens(r#""a\tbé" '''x "quoted" ''' """ends with """""#),
            vec![
                Token::String("a\tbé".into()),
                Token::String("x \"quoted\" ".into()),
                Token::String("ends with \"".into()),
            ]
        );
    }

    #[test]
    fn test_keywords_and_directives() {
        assert_eq!(
            tokens("@prefix PREFIX base @base a true false @en-GB"),
            vec![
                Token::AtPrefix,
                Token::SparqlPrefix,
                Token::SparqlBase,
                Token::AtBase,
                Token::A,
                Token::Boolean(true),
                Token::Boolean(false),
                Token::LangTag("en-GB".into()),
            ]
        );
    }

    #[test]
    fn test_comments_and_positions() {
        let mut lexer = Lexer::new("doc", "# comment\n  _:x");
        let spanned = lexer.next_token().unwrap();
        assert_eq!(spanned.token, Token::BlankLabel("x".into()));
        assert_eq!((spanned.line, spanned.column), (2, 3));
    }

    #[test]
    fn test_local_name_escapes() {
        assert_eq!(
            tokens(r"ex:a\-b%20c :empty"),
            vec![
                Token::PrefixedName {
                    prefix: "ex".into(),
                    local: "a-b%20c".into()
                },
                Token::PrefixedName {
                    prefix: "".into(),
                    local: "empty".into()
                },
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_start() {
        let mut lexer = Lexer::new("doc", "\n  \"abc");
        match lexer.next_token().unwrap_err() {
            Error::Syntax { line, column, .. } => assert_eq!((line, column), (2, 3)),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
