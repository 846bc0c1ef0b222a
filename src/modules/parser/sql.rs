//! Minimal SQL lexer and read/write classifier
//!
//! The lexer understands just enough SQL to find the first meaningful token
//! of a statement: whitespace and the three comment forms (`-- …`, `# …`,
//! `/* … */`) are skipped, quoted text and backtick identifiers are consumed
//! as single tokens, and bare words are matched against a handful of
//! statement keywords.

use switchyard_core::SwitchyardError;

/// Statement keywords the lexer recognises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    Update,
    Delete,
    Create,
    Insert,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        const KEYWORDS: [(&str, Keyword); 5] = [
            ("select", Keyword::Select),
            ("update", Keyword::Update),
            ("delete", Keyword::Delete),
            ("create", Keyword::Create),
            ("insert", Keyword::Insert),
        ];
        KEYWORDS
            .iter()
            .find(|(text, _)| word.eq_ignore_ascii_case(text))
            .map(|(_, keyword)| *keyword)
    }
}

/// Token classes produced by the lexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// End of input
    Eof,
    /// One of `! ( ) [ ] { } < > : ; . , = @ & |`
    Punct(char),
    /// Text enclosed in `"`, `'` or backticks; holds the quote and the raw body
    Quoted { quote: char, body: String },
    /// Numeric literal
    Number(String),
    /// Bare word matching a statement keyword
    Keyword(Keyword),
    /// Any other bare word
    Word(String),
    /// Any other single character (operators and the like)
    Symbol(char),
}

/// A token and the line it started on (1-based)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

const PUNCTUATION: &[char] = &[
    '!', '(', ')', '[', ']', '{', '}', '<', '>', ':', ';', '.', ',', '=', '@', '&', '|',
];

/// Streaming SQL lexer
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    /// Create a lexer over the given SQL text
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    /// Consume a newline sequence; CRLF and LFCR count as one line
    fn bump_newline(&mut self, first: char) {
        self.pos += 1;
        match (first, self.peek()) {
            ('\r', Some('\n')) | ('\n', Some('\r')) => self.pos += 1,
            _ => {}
        }
        self.line += 1;
    }

    /// Skip to the end of the current line; end of input also terminates
    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || c == '\r' {
                self.bump_newline(c);
                return;
            }
            self.pos += 1;
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), SwitchyardError> {
        let start_line = self.line;
        // opening "/*"
        self.pos += 2;
        loop {
            match self.peek() {
                None => {
                    return Err(SwitchyardError::Parse(format!(
                        "unterminated block comment starting at line {}",
                        start_line
                    )))
                }
                Some('*') if self.peek_at(1) == Some('/') => {
                    self.pos += 2;
                    return Ok(());
                }
                Some(c @ ('\n' | '\r')) => self.bump_newline(c),
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Skip whitespace and comments; stops at the first token character
    fn skip_trivia(&mut self) -> Result<(), SwitchyardError> {
        while let Some(c) = self.peek() {
            match c {
                '\n' | '\r' => self.bump_newline(c),
                c if c.is_ascii_whitespace() => self.pos += 1,
                '-' if self.peek_at(1) == Some('-') => self.skip_line_comment(),
                '#' => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_quoted(&mut self, quote: char) -> Result<TokenKind, SwitchyardError> {
        let start_line = self.line;
        self.pos += 1;
        let mut body = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(SwitchyardError::Parse(format!(
                        "unterminated {} quoted text starting at line {}",
                        quote, start_line
                    )))
                }
                Some('\\') if quote != '`' => match self.bump() {
                    Some(escaped) => {
                        body.push('\\');
                        body.push(escaped);
                    }
                    None => {
                        return Err(SwitchyardError::Parse(format!(
                            "unterminated escape sequence at line {}",
                            self.line
                        )))
                    }
                },
                Some(c) if c == quote => {
                    // a doubled quote is an escaped quote
                    if self.peek() == Some(quote) {
                        self.pos += 1;
                        body.push(quote);
                        continue;
                    }
                    return Ok(TokenKind::Quoted { quote, body });
                }
                Some(c @ ('\n' | '\r')) => {
                    body.push(c);
                    self.pos -= 1;
                    self.bump_newline(c);
                }
                Some(c) => body.push(c),
            }
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if matches!(self.peek_at(1 + sign), Some(c) if c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        TokenKind::Number(self.chars[start..self.pos].iter().collect())
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c == '_' || c.is_ascii_alphanumeric()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match Keyword::lookup(&word) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Word(word),
        }
    }

    /// Produce the next token, skipping whitespace and comments
    pub fn next_token(&mut self) -> Result<Token, SwitchyardError> {
        self.skip_trivia()?;
        let line = self.line;
        let kind = match self.peek() {
            None => TokenKind::Eof,
            Some(c @ ('"' | '\'' | '`')) => self.lex_quoted(c)?,
            Some(c) if c.is_ascii_digit() => self.lex_number(),
            Some(c) if c == '_' || c.is_ascii_alphabetic() => self.lex_word(),
            Some(c) if PUNCTUATION.contains(&c) => {
                self.pos += 1;
                TokenKind::Punct(c)
            }
            Some(c) => {
                self.pos += 1;
                TokenKind::Symbol(c)
            }
        };
        Ok(Token { kind, line })
    }

    /// Tokenise the whole input, ending with an `Eof` token
    pub fn tokenize(mut self) -> Result<Vec<Token>, SwitchyardError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

/// Decide whether a statement is a read (`SELECT`) or something else
///
/// Only the first non-comment, non-whitespace token is inspected.
pub fn is_select_sql(sql: &str) -> Result<bool, SwitchyardError> {
    let token = Lexer::new(sql).next_token()?;
    Ok(token.kind == TokenKind::Keyword(Keyword::Select))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Lexer::new(sql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_empty_is_not_select() {
        assert!(!is_select_sql("").unwrap());
        assert!(!is_select_sql("   \n\t ").unwrap());
    }

    #[test]
    fn test_leading_block_comment() {
        assert!(is_select_sql("  /* hi */ SELECT 1").unwrap());
        assert!(is_select_sql("/* select */\nselect * from t").unwrap());
        assert!(!is_select_sql("/* select */ update t set x = 1").unwrap());
    }

    #[test]
    fn test_line_comments() {
        assert!(!is_select_sql("-- select\nUPDATE t SET x=1").unwrap());
        assert!(is_select_sql("# note\r\nSeLeCt 1").unwrap());
        // no trailing newline after the comment
        assert!(!is_select_sql("-- select 1").unwrap());
        assert!(!is_select_sql("# select").unwrap());
    }

    #[test]
    fn test_case_folding() {
        assert!(is_select_sql("select 1").unwrap());
        assert!(is_select_sql("SELECT 1").unwrap());
        assert!(is_select_sql("sElEcT 1").unwrap());
        assert!(!is_select_sql("selected").unwrap());
        assert!(!is_select_sql("with x as (select 1) select * from x").unwrap());
    }

    #[test]
    fn test_quoted_select_is_not_a_keyword() {
        assert!(!is_select_sql("\"select\"").unwrap());
        assert!(!is_select_sql("'select'").unwrap());
        assert!(!is_select_sql("`select`").unwrap());
    }

    #[test]
    fn test_multi_statement_batch_uses_first_statement() {
        assert!(is_select_sql("select 1; delete from t").unwrap());
        assert!(!is_select_sql("insert into t values (1); select 1").unwrap());
    }

    #[test]
    fn test_unterminated_first_token_fails() {
        assert!(matches!(
            is_select_sql("'abc"),
            Err(SwitchyardError::Parse(_))
        ));
        assert!(matches!(
            is_select_sql("\"abc\\"),
            Err(SwitchyardError::Parse(_))
        ));
        assert!(matches!(
            is_select_sql("/* never closed"),
            Err(SwitchyardError::Parse(_))
        ));
    }

    #[test]
    fn test_token_classes() {
        assert_eq!(
            kinds("SELECT a.b, 'it''s', 1.5e3 FROM `t` WHERE x <= @p -- tail"),
            vec![
                TokenKind::Keyword(Keyword::Select),
                TokenKind::Word("a".into()),
                TokenKind::Punct('.'),
                TokenKind::Word("b".into()),
                TokenKind::Punct(','),
                TokenKind::Quoted {
                    quote: '\'',
                    body: "it's".into()
                },
                TokenKind::Punct(','),
                TokenKind::Number("1.5e3".into()),
                TokenKind::Word("FROM".into()),
                TokenKind::Quoted {
                    quote: '`',
                    body: "t".into()
                },
                TokenKind::Word("WHERE".into()),
                TokenKind::Word("x".into()),
                TokenKind::Punct('<'),
                TokenKind::Punct('='),
                TokenKind::Punct('@'),
                TokenKind::Word("p".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_statement_keywords() {
        assert_eq!(
            kinds("update delete create insert"),
            vec![
                TokenKind::Keyword(Keyword::Update),
                TokenKind::Keyword(Keyword::Delete),
                TokenKind::Keyword(Keyword::Create),
                TokenKind::Keyword(Keyword::Insert),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_line_counting() {
        let tokens = Lexer::new("a\r\nb\n\rc\nd\re").tokenize().unwrap();
        let lines: Vec<usize> = tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, vec![1, 2, 3, 4, 5, 5]);

        let tokens = Lexer::new("/* one\ntwo */ x").tokenize().unwrap();
        assert_eq!(tokens[0].line, 2);
    }
}
