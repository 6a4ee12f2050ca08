//! SQL tokenizer.
//!
//! Purely forward, one token at a time. Identifiers and keywords are folded
//! to upper case at lex time; string literals keep their case. Peeking
//! re-lexes from a saved offset, so there is no token buffer and peeks are
//! idempotent.

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Integer,
    Decimal,
    StringLit,
    Boolean,

    // Identifiers
    Identifier,

    // Statement keywords
    Create,
    Drop,
    Table,
    Insert,
    Into,
    Values,
    Select,
    From,
    Where,
    Delete,
    If,
    Not,
    Exists,
    And,
    Or,

    // JOIN keywords
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    On,
    As,

    // Type keywords
    IntType,
    StringType,
    BoolType,
    DecimalType,

    // Functions
    Sin,
    Cos,
    Substr,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Separators
    LeftParen,
    RightParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            line,
            column,
        }
    }
}

pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn next_token(&mut self) -> DbResult<Token> {
        self.skip_whitespace_and_comments();

        if self.position >= self.input.len() {
            return Ok(Token::new(TokenKind::Eof, "", self.line, self.column));
        }

        let ch = self.current_char();

        if ch == '\'' || ch == '"' {
            return self.read_string();
        }
        if ch.is_ascii_digit() {
            return Ok(self.read_number());
        }
        if ch.is_ascii_alphabetic() || ch == '_' {
            return Ok(self.read_identifier());
        }
        Ok(self.read_operator())
    }

    /// Looks at the next token without consuming it, by re-lexing from the
    /// current offset.
    pub fn peek_token(&mut self) -> DbResult<Token> {
        let saved = (self.position, self.line, self.column);
        let token = self.next_token();
        (self.position, self.line, self.column) = saved;
        token
    }

    pub fn is_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Lexes the remaining input. Debugging helper; the parser pulls tokens
    /// one at a time.
    pub fn tokenize_all(&mut self) -> DbResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if token.kind == TokenKind::Eof {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn current_char(&self) -> char {
        self.input.get(self.position).copied().unwrap_or('\0')
    }

    fn peek_char(&self) -> char {
        self.input.get(self.position + 1).copied().unwrap_or('\0')
    }

    fn advance(&mut self) {
        if self.position < self.input.len() {
            if self.input[self.position] == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.position < self.input.len() && self.current_char().is_whitespace() {
                self.advance();
            }
            // -- comment runs to end of line
            if self.current_char() == '-' && self.peek_char() == '-' {
                while self.position < self.input.len() && self.current_char() != '\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn read_string(&mut self) -> DbResult<Token> {
        let (start_line, start_col) = (self.line, self.column);
        let quote = self.current_char();
        self.advance();

        let mut value = String::new();
        while self.position < self.input.len() && self.current_char() != quote {
            if self.current_char() == '\\' {
                self.advance();
                if self.position < self.input.len() {
                    let escaped = self.current_char();
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                    self.advance();
                }
            } else {
                value.push(self.current_char());
                self.advance();
            }
        }

        if self.position >= self.input.len() {
            return Err(DbError::Parse(format!(
                "Unterminated string literal at line {}, column {}",
                start_line, start_col
            )));
        }

        self.advance(); // closing quote
        Ok(Token::new(TokenKind::StringLit, value, start_line, start_col))
    }

    fn read_number(&mut self) -> Token {
        let (start_line, start_col) = (self.line, self.column);
        let mut value = String::new();
        let mut is_decimal = false;

        while self.position < self.input.len() {
            let ch = self.current_char();
            if ch == '.' {
                if is_decimal {
                    break; // second decimal point ends the number
                }
                is_decimal = true;
            } else if !ch.is_ascii_digit() {
                break;
            }
            value.push(ch);
            self.advance();
        }

        let kind = if is_decimal {
            TokenKind::Decimal
        } else {
            TokenKind::Integer
        };
        Token::new(kind, value, start_line, start_col)
    }

    fn read_identifier(&mut self) -> Token {
        let (start_line, start_col) = (self.line, self.column);
        let mut value = String::new();

        while self.position < self.input.len() {
            let ch = self.current_char();
            if !ch.is_ascii_alphanumeric() && ch != '_' {
                break;
            }
            value.push(ch.to_ascii_uppercase());
            self.advance();
        }

        let kind = keyword_kind(&value);
        Token::new(kind, value, start_line, start_col)
    }

    fn read_operator(&mut self) -> Token {
        let (start_line, start_col) = (self.line, self.column);
        let ch = self.current_char();
        self.advance();

        let (kind, text) = match ch {
            '+' => (TokenKind::Plus, "+"),
            '-' => (TokenKind::Minus, "-"),
            '*' => (TokenKind::Star, "*"),
            '/' => (TokenKind::Slash, "/"),
            '=' => (TokenKind::Equal, "="),
            '!' if self.current_char() == '=' => {
                self.advance();
                (TokenKind::NotEqual, "!=")
            }
            '<' if self.current_char() == '=' => {
                self.advance();
                (TokenKind::LessEqual, "<=")
            }
            '<' => (TokenKind::LessThan, "<"),
            '>' if self.current_char() == '=' => {
                self.advance();
                (TokenKind::GreaterEqual, ">=")
            }
            '>' => (TokenKind::GreaterThan, ">"),
            '(' => (TokenKind::LeftParen, "("),
            ')' => (TokenKind::RightParen, ")"),
            ',' => (TokenKind::Comma, ","),
            ';' => (TokenKind::Semicolon, ";"),
            '.' => (TokenKind::Dot, "."),
            other => {
                return Token::new(TokenKind::Unknown, other.to_string(), start_line, start_col);
            }
        };
        Token::new(kind, text, start_line, start_col)
    }
}

fn keyword_kind(word: &str) -> TokenKind {
    match word {
        "CREATE" => TokenKind::Create,
        "DROP" => TokenKind::Drop,
        "TABLE" => TokenKind::Table,
        "INSERT" => TokenKind::Insert,
        "INTO" => TokenKind::Into,
        "VALUES" => TokenKind::Values,
        "SELECT" => TokenKind::Select,
        "FROM" => TokenKind::From,
        "WHERE" => TokenKind::Where,
        "DELETE" => TokenKind::Delete,
        "IF" => TokenKind::If,
        "NOT" => TokenKind::Not,
        "EXISTS" => TokenKind::Exists,
        "AND" => TokenKind::And,
        "OR" => TokenKind::Or,
        "TRUE" | "FALSE" => TokenKind::Boolean,
        "JOIN" => TokenKind::Join,
        "INNER" => TokenKind::Inner,
        "LEFT" => TokenKind::Left,
        "RIGHT" => TokenKind::Right,
        "FULL" => TokenKind::Full,
        "OUTER" => TokenKind::Outer,
        "ON" => TokenKind::On,
        "AS" => TokenKind::As,
        "INT" => TokenKind::IntType,
        "STRING" => TokenKind::StringType,
        "BOOL" => TokenKind::BoolType,
        "DECIMAL" => TokenKind::DecimalType,
        "SIN" => TokenKind::Sin,
        "COS" => TokenKind::Cos,
        "SUBSTR" => TokenKind::Substr,
        _ => TokenKind::Identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        Tokenizer::new(sql)
            .tokenize_all()
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_simple_select() {
        assert_eq!(
            kinds("SELECT * FROM t1;"),
            vec![
                TokenKind::Select,
                TokenKind::Star,
                TokenKind::From,
                TokenKind::Identifier,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn folds_identifiers_to_upper_case() {
        let tokens = Tokenizer::new("select name from Users").tokenize_all().unwrap();
        assert_eq!(tokens[1].value, "NAME");
        assert_eq!(tokens[3].value, "USERS");
        assert_eq!(tokens[0].kind, TokenKind::Select);
    }

    #[test]
    fn string_literals_keep_case_and_escapes() {
        let tokens = Tokenizer::new(r#"'Alice' "Bo\nb" '\t\\\''"#)
            .tokenize_all()
            .unwrap();
        assert_eq!(tokens[0].value, "Alice");
        assert_eq!(tokens[1].value, "Bo\nb");
        assert_eq!(tokens[2].value, "\t\\'");
        assert!(tokens.iter().all(|t| t.kind == TokenKind::StringLit));
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = Tokenizer::new("'oops").tokenize_all().unwrap_err();
        assert!(err.is_parse_error());
    }

    #[test]
    fn numbers_split_on_second_dot() {
        let tokens = Tokenizer::new("12 3.5 1.2.3").tokenize_all().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[1].kind, TokenKind::Decimal);
        assert_eq!(tokens[1].value, "3.5");
        // "1.2.3" lexes as DECIMAL 1.2, DOT, INTEGER 3
        assert_eq!(tokens[2].kind, TokenKind::Decimal);
        assert_eq!(tokens[2].value, "1.2");
        assert_eq!(tokens[3].kind, TokenKind::Dot);
        assert_eq!(tokens[4].kind, TokenKind::Integer);
    }

    #[test]
    fn two_char_operators() {
        assert_eq!(
            kinds("a != b <= c >= d < e > f"),
            vec![
                TokenKind::Identifier,
                TokenKind::NotEqual,
                TokenKind::Identifier,
                TokenKind::LessEqual,
                TokenKind::Identifier,
                TokenKind::GreaterEqual,
                TokenKind::Identifier,
                TokenKind::LessThan,
                TokenKind::Identifier,
                TokenKind::GreaterThan,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("SELECT -- everything here is ignored\n1"),
            vec![TokenKind::Select, TokenKind::Integer]
        );
    }

    #[test]
    fn join_keywords_recognized() {
        assert_eq!(
            kinds("LEFT OUTER JOIN t ON a AS b"),
            vec![
                TokenKind::Left,
                TokenKind::Outer,
                TokenKind::Join,
                TokenKind::Identifier,
                TokenKind::On,
                TokenKind::Identifier,
                TokenKind::As,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn peek_is_idempotent() {
        let mut tokenizer = Tokenizer::new("SELECT 1");
        let first = tokenizer.peek_token().unwrap();
        let second = tokenizer.peek_token().unwrap();
        assert_eq!(first, second);
        let consumed = tokenizer.next_token().unwrap();
        assert_eq!(consumed, first);
        assert_eq!(tokenizer.next_token().unwrap().kind, TokenKind::Integer);
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = Tokenizer::new("SELECT\n  name").tokenize_all().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn boolean_literals() {
        let tokens = Tokenizer::new("true FALSE").tokenize_all().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Boolean);
        assert_eq!(tokens[0].value, "TRUE");
        assert_eq!(tokens[1].value, "FALSE");
    }
}
