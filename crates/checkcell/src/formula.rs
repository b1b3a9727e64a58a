//! Formula lexing, parsing and reference extraction.
//!
//! The dependency graph only needs to know which cells and ranges a formula
//! reads, but extracting references from a token stream alone accepts stray
//! text such as `=A1 +`. Formulas are therefore parsed into an [`Expr`] tree
//! and references are collected from the tree; anything the parser cannot
//! make sense of surfaces as a structured [`FormulaError`].
//!
//! Supported syntax: numbers, strings, `TRUE`/`FALSE`, error literals, A1
//! cell and range references with `$` anchors and optional sheet prefixes
//! (`Sheet2!A1`, `'My Sheet'!A1:B2`), function calls, parentheses, the binary
//! operators `+ - * / ^ & = <> < <= > >=`, prefix `+`/`-` and postfix `%`.
//!
//! Deliberately unsupported references (reported, never guessed at):
//! whole columns (`A:A`), whole rows (`1:1`), defined names, R1C1 notation
//! and external workbooks (`[Book1]Sheet1!A1`).

use std::fmt;

use thiserror::Error;

use crate::address::{self, Address, AddressError, RangeRef};
use crate::value::ERROR_CODES;

/// A reference read by a formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    /// A single cell.
    Cell(Address),
    /// A multi-cell rectangular range.
    Range(RangeRef),
}

impl Reference {
    /// The reference as a range; single cells become one-cell ranges.
    #[must_use]
    pub fn to_range(&self) -> RangeRef {
        match self {
            Self::Cell(address) => RangeRef::single(address),
            Self::Range(range) => range.clone(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell(address) => address.fmt(f),
            Self::Range(range) => range.fmt(f),
        }
    }
}

/// What went wrong while reading a formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaErrorKind {
    /// The text after `=` was empty.
    #[error("empty formula")]
    Empty,
    /// A string literal was not closed.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A quoted sheet name was not closed or not followed by `!`.
    #[error("unterminated sheet name")]
    UnterminatedSheetName,
    /// Parentheses do not pair up.
    #[error("unbalanced parentheses")]
    UnbalancedParentheses,
    /// A character that cannot start any token.
    #[error("unexpected character `{0}`")]
    UnexpectedCharacter(char),
    /// A token in a position where it cannot appear.
    #[error("unexpected {0}")]
    UnexpectedToken(String),
    /// The formula ended in the middle of an expression.
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    /// A syntactically plausible reference outside worksheet bounds.
    #[error("invalid reference: {0}")]
    InvalidReference(AddressError),
    /// A reference form this analysis does not resolve.
    #[error("unsupported reference `{0}`")]
    UnsupportedReference(String),
}

/// A formula parse failure with the byte offset where it was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset}")]
pub struct FormulaError {
    /// Byte offset into the formula text (including the leading `=`).
    pub offset: usize,
    /// The failure category.
    pub kind: FormulaErrorKind,
}

impl FormulaError {
    fn new(offset: usize, kind: FormulaErrorKind) -> Self {
        Self { offset, kind }
    }
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Neg,
    /// `x%`
    Percent,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Left binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge => 1,
            Self::Concat => 2,
            Self::Add | Self::Sub => 3,
            Self::Mul | Self::Div => 4,
            Self::Pow => 5,
        }
    }
}

const PREFIX_PRECEDENCE: u8 = 6;

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Text(String),
    /// `TRUE` / `FALSE`.
    Bool(bool),
    /// Error literal such as `#N/A`.
    Error(String),
    /// Cell or range reference.
    Ref(Reference),
    /// Prefix or postfix operator application.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// Its operand.
        operand: Box<Expr>,
    },
    /// Binary operator application.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Function call; the name is upper-cased.
    Call {
        /// Function name.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Every reference in the expression, in first-occurrence order and
    /// without duplicates.
    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<Reference>) {
        match self {
            Self::Ref(reference) => {
                if !out.contains(reference) {
                    out.push(reference.clone());
                }
            }
            Self::Unary { operand, .. } => operand.collect_references(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_references(out);
                rhs.collect_references(out);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
            Self::Number(_) | Self::Text(_) | Self::Bool(_) | Self::Error(_) => {}
        }
    }
}

/// Whether cell text is a formula (starts with `=`).
#[must_use]
pub fn is_formula(text: &str) -> bool {
    text.starts_with('=')
}

/// Parse formula text (with or without the leading `=`) on `sheet`.
///
/// # Errors
///
/// Returns a [`FormulaError`] describing the first problem found.
pub fn parse(formula: &str, sheet: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(formula, sheet)?;
    let end = formula.len();
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end,
    };
    if tokens.is_empty() {
        return Err(FormulaError::new(end, FormulaErrorKind::Empty));
    }
    let expr = parser.expression(0)?;
    if let Some(extra) = parser.peek() {
        return Err(FormulaError::new(
            extra.offset,
            FormulaErrorKind::UnexpectedToken(extra.token.describe()),
        ));
    }
    Ok(expr)
}

/// The references a formula reads, de-duplicated, in first-occurrence order.
///
/// # Errors
///
/// Returns a [`FormulaError`] if the formula does not parse.
pub fn extract_references(formula: &str, sheet: &str) -> Result<Vec<Reference>, FormulaError> {
    parse(formula, sheet).map(|expr| expr.references())
}

// ============================================================================
// Lexer
// ============================================================================

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal.
    Number(f64),
    /// String literal (quotes removed, `""` unescaped).
    Text(String),
    /// Boolean literal.
    Bool(bool),
    /// Error literal.
    Error(String),
    /// Function name (upper-cased), always followed by `(`.
    Function(String),
    /// Cell or range reference.
    Reference(Reference),
    /// Prefix or infix `+`.
    Plus,
    /// Prefix or infix `-`.
    Minus,
    /// Binary operator other than `+`/`-`.
    Op(BinaryOp),
    /// Postfix `%`.
    Percent,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Text(s) => format!("string \"{s}\""),
            Self::Bool(b) => format!("boolean {b}"),
            Self::Error(e) => format!("error {e}"),
            Self::Function(name) => format!("function {name}"),
            Self::Reference(r) => format!("reference {r}"),
            Self::Plus => "`+`".to_string(),
            Self::Minus => "`-`".to_string(),
            Self::Op(op) => format!("operator {op:?}"),
            Self::Percent => "`%`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::Comma => "`,`".to_string(),
        }
    }
}

/// A token with the byte offset it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The token.
    pub token: Token,
    /// Byte offset into the formula text.
    pub offset: usize,
}

/// Split formula text into tokens, resolving references against `sheet`.
///
/// Parentheses balance is checked here so that an unclosed call is reported
/// as such rather than as a generic end-of-input error.
///
/// # Errors
///
/// Returns a [`FormulaError`] for lexical problems.
pub fn tokenize(formula: &str, sheet: &str) -> Result<Vec<Spanned>, FormulaError> {
    let start = usize::from(formula.starts_with('='));
    let mut lexer = Lexer {
        chars: formula[start..]
            .char_indices()
            .map(|(i, c)| (i + start, c))
            .collect(),
        pos: 0,
        end: formula.len(),
        sheet,
        text: formula,
    };
    lexer.run()
}

struct Lexer<'a> {
    chars: Vec<(usize, char)>,
    pos: usize,
    end: usize,
    sheet: &'a str,
    text: &'a str,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '$'
}

impl Lexer<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.end, |&(i, _)| i)
    }

    fn run(&mut self) -> Result<Vec<Spanned>, FormulaError> {
        let mut tokens = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        while let Some(c) = self.peek() {
            let offset = self.offset();
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }
            let token = match c {
                '"' => Token::Text(self.string()?),
                '\'' => {
                    let sheet = self.quoted_sheet()?;
                    Token::Reference(self.reference_after_sheet(&sheet, offset)?)
                }
                '[' => {
                    return Err(FormulaError::new(
                        offset,
                        FormulaErrorKind::UnsupportedReference("external workbook".to_string()),
                    ));
                }
                '#' => Token::Error(self.error_literal()?),
                '0'..='9' | '.' => self.number_or_row_range()?,
                c if c.is_alphabetic() || c == '_' || c == '$' => self.word()?,
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '*' => self.single(Token::Op(BinaryOp::Mul)),
                '/' => self.single(Token::Op(BinaryOp::Div)),
                '^' => self.single(Token::Op(BinaryOp::Pow)),
                '&' => self.single(Token::Op(BinaryOp::Concat)),
                '%' => self.single(Token::Percent),
                '=' => self.single(Token::Op(BinaryOp::Eq)),
                '<' => match self.peek_at(1) {
                    Some('=') => self.double(Token::Op(BinaryOp::Le)),
                    Some('>') => self.double(Token::Op(BinaryOp::Ne)),
                    _ => self.single(Token::Op(BinaryOp::Lt)),
                },
                '>' => match self.peek_at(1) {
                    Some('=') => self.double(Token::Op(BinaryOp::Ge)),
                    _ => self.single(Token::Op(BinaryOp::Gt)),
                },
                '(' => {
                    open.push(offset);
                    self.single(Token::LParen)
                }
                ')' => {
                    if open.pop().is_none() {
                        return Err(FormulaError::new(
                            offset,
                            FormulaErrorKind::UnbalancedParentheses,
                        ));
                    }
                    self.single(Token::RParen)
                }
                ',' => self.single(Token::Comma),
                other => {
                    return Err(FormulaError::new(
                        offset,
                        FormulaErrorKind::UnexpectedCharacter(other),
                    ));
                }
            };
            tokens.push(Spanned { token, offset });
        }

        if let Some(&unclosed) = open.last() {
            return Err(FormulaError::new(
                unclosed,
                FormulaErrorKind::UnbalancedParentheses,
            ));
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn double(&mut self, token: Token) -> Token {
        self.pos += 2;
        token
    }

    fn string(&mut self) -> Result<String, FormulaError> {
        let start = self.offset();
        self.pos += 1;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '"' {
                if self.peek() == Some('"') {
                    self.pos += 1;
                    out.push('"');
                    continue;
                }
                return Ok(out);
            }
            out.push(c);
        }
        Err(FormulaError::new(start, FormulaErrorKind::UnterminatedString))
    }

    fn quoted_sheet(&mut self) -> Result<String, FormulaError> {
        let start = self.offset();
        self.pos += 1;
        let mut name = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            if c == '\'' {
                if self.peek() == Some('\'') {
                    self.pos += 1;
                    name.push('\'');
                    continue;
                }
                if self.peek() == Some('!') {
                    self.pos += 1;
                    return Ok(name);
                }
                break;
            }
            name.push(c);
        }
        Err(FormulaError::new(
            start,
            FormulaErrorKind::UnterminatedSheetName,
        ))
    }

    fn error_literal(&mut self) -> Result<String, FormulaError> {
        let start = self.offset();
        let rest = &self.text[start..];
        let upper = rest.to_ascii_uppercase();
        for code in ERROR_CODES {
            if upper.starts_with(code) {
                self.pos += code.chars().count();
                return Ok((*code).to_string());
            }
        }
        Err(FormulaError::new(
            start,
            FormulaErrorKind::UnexpectedCharacter('#'),
        ))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        out
    }

    fn number_or_row_range(&mut self) -> Result<Token, FormulaError> {
        let start = self.offset();
        let mut text = self.take_while(|c| c.is_ascii_digit() || c == '.');
        if self.peek() == Some(':') && !text.contains('.') {
            return Err(FormulaError::new(
                start,
                FormulaErrorKind::UnsupportedReference(format!("{text}:… (whole row)")),
            ));
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit() || c == '+' || c == '-')
        {
            text.push('e');
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.pos += 1;
            }
            text.push_str(&self.take_while(|c| c.is_ascii_digit()));
        }
        text.parse::<f64>().map(Token::Number).map_err(|_| {
            FormulaError::new(start, FormulaErrorKind::UnexpectedToken(format!("number `{text}`")))
        })
    }

    /// An identifier: function name, boolean, sheet prefix or A1 reference.
    fn word(&mut self) -> Result<Token, FormulaError> {
        let start = self.offset();
        let word = self.take_while(is_ident_char);

        match self.peek() {
            Some('(') if !word.contains('$') => {
                return Ok(Token::Function(word.to_ascii_uppercase()));
            }
            Some('!') => {
                self.pos += 1;
                return self
                    .reference_after_sheet(&word, start)
                    .map(Token::Reference);
            }
            _ => {}
        }

        if word.eq_ignore_ascii_case("TRUE") {
            return Ok(Token::Bool(true));
        }
        if word.eq_ignore_ascii_case("FALSE") {
            return Ok(Token::Bool(false));
        }
        let sheet = self.sheet.to_string();
        self.reference_from(&sheet, word, start).map(Token::Reference)
    }

    fn reference_after_sheet(
        &mut self,
        sheet: &str,
        start: usize,
    ) -> Result<Reference, FormulaError> {
        let first = self.take_while(is_ident_char);
        if first.is_empty() {
            return Err(FormulaError::new(
                self.offset(),
                FormulaErrorKind::UnsupportedReference(format!("{sheet}!")),
            ));
        }
        self.reference_from(sheet, first, start)
    }

    /// Resolve `first` (and an optional `:second`) into a reference.
    fn reference_from(
        &mut self,
        sheet: &str,
        first: String,
        start: usize,
    ) -> Result<Reference, FormulaError> {
        let range_follows = self.peek() == Some(':');
        if range_follows && is_column_only(&first) {
            return Err(FormulaError::new(
                start,
                FormulaErrorKind::UnsupportedReference(format!("{first}:… (whole column)")),
            ));
        }

        let a = cell_corner(&first, start)?;
        if !range_follows {
            return Ok(Reference::Cell(Address::new(sheet, a.0, a.1)));
        }

        self.pos += 1;
        let second_start = self.offset();
        let second = self.take_while(is_ident_char);
        if second.is_empty() {
            return Err(FormulaError::new(
                second_start,
                FormulaErrorKind::UnexpectedEnd,
            ));
        }
        let b = cell_corner(&second, second_start)?;
        let range = RangeRef::new(sheet, a, b);
        if range.is_single_cell() {
            Ok(Reference::Cell(range.start()))
        } else {
            Ok(Reference::Range(range))
        }
    }
}

fn is_column_only(word: &str) -> bool {
    let letters = word.trim_start_matches('$');
    !letters.is_empty() && letters.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_r1c1(word: &str) -> bool {
    let upper = word.to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix('R') else {
        return false;
    };
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let Some(col) = rest[digits_end..].strip_prefix('C') else {
        return false;
    };
    col.chars().all(|c| c.is_ascii_digit())
}

fn cell_corner(word: &str, offset: usize) -> Result<(u32, u32), FormulaError> {
    match address::parse_cell(word) {
        Ok(corner) => Ok(corner),
        Err(e @ (AddressError::ColumnOutOfRange(_) | AddressError::RowOutOfRange(_)))
            if looks_like_cell(word) =>
        {
            Err(FormulaError::new(offset, FormulaErrorKind::InvalidReference(e)))
        }
        Err(_) if is_r1c1(word) => Err(FormulaError::new(
            offset,
            FormulaErrorKind::UnsupportedReference(format!("{word} (R1C1 notation)")),
        )),
        Err(_) => Err(FormulaError::new(
            offset,
            FormulaErrorKind::UnsupportedReference(format!("{word} (defined name)")),
        )),
    }
}

/// Letters followed by digits, with optional `$` anchors.
fn looks_like_cell(word: &str) -> bool {
    let w = word.trim_start_matches('$');
    let letters = w.chars().take_while(char::is_ascii_alphabetic).count();
    let rest = w[letters..].trim_start_matches('$');
    letters > 0 && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// Parser
// ============================================================================

struct Parser<'t> {
    tokens: &'t [Spanned],
    pos: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Spanned> {
        let tokens = self.tokens;
        tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<&'t Spanned, FormulaError> {
        let tokens = self.tokens;
        let token = tokens
            .get(self.pos)
            .ok_or_else(|| FormulaError::new(self.end, FormulaErrorKind::UnexpectedEnd))?;
        self.pos += 1;
        Ok(token)
    }

    fn expression(&mut self, min_precedence: u8) -> Result<Expr, FormulaError> {
        let mut lhs = self.prefix()?;

        loop {
            let Some(spanned) = self.peek() else { break };
            let op = match spanned.token {
                Token::Percent => {
                    self.pos += 1;
                    lhs = Expr::Unary {
                        op: UnaryOp::Percent,
                        operand: Box::new(lhs),
                    };
                    continue;
                }
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                Token::Op(op) => op,
                _ => break,
            };
            let precedence = op.precedence();
            if precedence <= min_precedence {
                break;
            }
            self.pos += 1;
            // `^` is left-associative in spreadsheets, like the others.
            let rhs = self.expression(precedence)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, FormulaError> {
        let spanned = self.next()?.clone();
        match spanned.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Text(s) => Ok(Expr::Text(s)),
            Token::Bool(b) => Ok(Expr::Bool(b)),
            Token::Error(e) => Ok(Expr::Error(e)),
            Token::Reference(r) => Ok(Expr::Ref(r)),
            Token::Plus | Token::Minus => {
                let op = if spanned.token == Token::Minus {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Plus
                };
                let operand = self.expression(PREFIX_PRECEDENCE)?;
                Ok(Expr::Unary {
                    op,
                    operand: Box::new(operand),
                })
            }
            Token::LParen => {
                let inner = self.expression(0)?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Token::Function(name) => self.call(name),
            other => Err(FormulaError::new(
                spanned.offset,
                FormulaErrorKind::UnexpectedToken(other.describe()),
            )),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        // The lexer guarantees `(` follows a function name.
        self.next()?;
        let mut args = Vec::new();
        if matches!(self.peek().map(|s| &s.token), Some(Token::RParen)) {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.expression(0)?);
            let spanned = self.next()?;
            match spanned.token {
                Token::Comma => {}
                Token::RParen => break,
                ref other => {
                    return Err(FormulaError::new(
                        spanned.offset,
                        FormulaErrorKind::UnexpectedToken(other.describe()),
                    ));
                }
            }
        }
        Ok(Expr::Call { name, args })
    }

    fn expect_rparen(&mut self) -> Result<(), FormulaError> {
        let spanned = self.next()?;
        if spanned.token == Token::RParen {
            Ok(())
        } else {
            Err(FormulaError::new(
                spanned.offset,
                FormulaErrorKind::UnexpectedToken(spanned.token.describe()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cell(sheet: &str, a1: &str) -> Reference {
        Reference::Cell(Address::from_a1(sheet, a1).unwrap())
    }

    fn range(sheet: &str, text: &str) -> Reference {
        Reference::Range(RangeRef::parse(text, sheet).unwrap())
    }

    #[test]
    fn simple_sum_of_cells() {
        let refs = extract_references("=A1+A2", "Sheet1").unwrap();
        assert_eq!(refs, vec![cell("Sheet1", "A1"), cell("Sheet1", "A2")]);
    }

    #[test]
    fn duplicate_references_are_collapsed() {
        let refs = extract_references("=A1*A1+$A$1", "Sheet1").unwrap();
        assert_eq!(refs, vec![cell("Sheet1", "A1")]);
    }

    #[test]
    fn multi_area_and_cross_sheet_references() {
        let refs =
            extract_references("=SUM(A1:A3, C1:C3) + 'My Sheet'!B2 - Data!$D$1:D4", "Sheet1")
                .unwrap();
        assert_eq!(
            refs,
            vec![
                range("Sheet1", "A1:A3"),
                range("Sheet1", "C1:C3"),
                cell("My Sheet", "B2"),
                range("Data", "D1:D4"),
            ]
        );
    }

    #[test]
    fn strings_and_function_names_are_not_references() {
        let refs = extract_references("=IF(LOG10(B1)>1, \"A1\", \"x\"\"A2\")", "S").unwrap();
        assert_eq!(refs, vec![cell("S", "B1")]);
    }

    #[test]
    fn degenerate_range_is_a_cell() {
        let refs = extract_references("=SUM(B2:B2)", "S").unwrap();
        assert_eq!(refs, vec![cell("S", "B2")]);
    }

    #[test]
    fn formula_without_references() {
        assert!(extract_references("=1+2*3", "S").unwrap().is_empty());
        assert!(extract_references("=TRUE", "S").unwrap().is_empty());
    }

    #[test]
    fn precedence_and_unary_operators() {
        let expr = parse("=-A1^2+3*4%", "S").unwrap();
        let Expr::Binary { op: BinaryOp::Add, lhs, rhs } = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Pow, .. }));
        assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[rstest]
    #[case::unclosed_call("=SUM(A1:A3", FormulaErrorKind::UnbalancedParentheses)]
    #[case::extra_paren("=A1)", FormulaErrorKind::UnbalancedParentheses)]
    #[case::unterminated_string("=\"abc", FormulaErrorKind::UnterminatedString)]
    #[case::unterminated_sheet("='Sheet 1", FormulaErrorKind::UnterminatedSheetName)]
    #[case::trailing_operator("=A1+", FormulaErrorKind::UnexpectedEnd)]
    #[case::empty("=", FormulaErrorKind::Empty)]
    #[case::stray_symbol("=A1 ~ 2", FormulaErrorKind::UnexpectedCharacter('~'))]
    fn stray_text_is_rejected(#[case] formula: &str, #[case] expected: FormulaErrorKind) {
        let err = extract_references(formula, "S").unwrap_err();
        assert_eq!(err.kind, expected);
    }

    #[test]
    fn adjacent_operands_are_rejected() {
        let err = extract_references("=hello world", "S").unwrap_err();
        assert!(matches!(err.kind, FormulaErrorKind::UnsupportedReference(_)));

        let err = extract_references("=A1 B1", "S").unwrap_err();
        assert!(matches!(err.kind, FormulaErrorKind::UnexpectedToken(_)));
        assert_eq!(err.offset, 4);
    }

    #[rstest]
    #[case::whole_column("=SUM(A:A)")]
    #[case::whole_row("=SUM(1:1)")]
    #[case::defined_name("=TaxRate*A1")]
    #[case::r1c1("=R1C1")]
    #[case::external("=[Book1]Sheet1!A1")]
    fn unsupported_references_are_reported(#[case] formula: &str) {
        let err = extract_references(formula, "S").unwrap_err();
        assert!(
            matches!(err.kind, FormulaErrorKind::UnsupportedReference(_)),
            "{formula}: {err:?}"
        );
    }

    #[test]
    fn out_of_bounds_reference_is_invalid() {
        let err = extract_references("=A1048577", "S").unwrap_err();
        assert!(matches!(err.kind, FormulaErrorKind::InvalidReference(_)));
    }
}
