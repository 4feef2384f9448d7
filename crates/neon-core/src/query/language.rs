//! Text form of the query model
//!
//! ```text
//! statement := [ "use" ident ";" ] query [ ";" ]
//! query     := "select" [ "distinct" ] [ items ] "from" [ ident "." ] ident
//!              [ "where" or ] [ "group" "by" groups ] [ "sort" "by" sorts ]
//!              [ "limit" int ] [ "offset" int ]
//! items     := "*" | item { "," item }
//! item      := ident | aggfn "(" ( ident | "*" ) ")" [ "as" ident ]
//! or        := and { "or" and }
//! and       := term { "and" term }
//! term      := "(" or ")" | ident op literal
//! groups    := group { "," group } ; group := ident | fn "(" ident ")" [ "as" ident ]
//! sorts     := ident [ "asc" | "desc" ] { "," ident [ "asc" | "desc" ] }
//! ```
//!
//! Keywords are case-insensitive. Strings use single or double quotes.

use serde_json::Value;

use super::{
    AggregateClause, AggregateFunction, GroupByClause, GroupByFunction, GroupByFunctionClause, Operator,
    Query, SortDirection, WhereClause, ALL_FIELDS,
};
use crate::error::QueryError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(String),
    Op(Operator),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Semicolon,
    Star,
}

fn error(position: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, QueryError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '.' if !next.map_or(false, |n| n.is_ascii_digit()) => Some(Token::Dot),
            ';' => Some(Token::Semicolon),
            '*' => Some(Token::Star),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((token, pos));
            i += 1;
            continue;
        }

        match (c, next) {
            ('!', Some('=')) => {
                tokens.push((Token::Op(Operator::Ne), pos));
                i += 2;
            }
            ('<', Some('=')) => {
                tokens.push((Token::Op(Operator::Le), pos));
                i += 2;
            }
            ('>', Some('=')) => {
                tokens.push((Token::Op(Operator::Ge), pos));
                i += 2;
            }
            ('<', _) => {
                tokens.push((Token::Op(Operator::Lt), pos));
                i += 1;
            }
            ('>', _) => {
                tokens.push((Token::Op(Operator::Gt), pos));
                i += 1;
            }
            ('=', _) => {
                tokens.push((Token::Op(Operator::Eq), pos));
                i += 1;
            }
            ('\'', _) | ('"', _) => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some((_, ch)) if *ch == quote => break,
                        Some((_, ch)) => {
                            text.push(*ch);
                            i += 1;
                        }
                        None => return Err(error(pos, "unterminated string")),
                    }
                }
                tokens.push((Token::Str(text), pos));
                i += 1;
            }
            _ if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                tokens.push((Token::Number(text), pos));
            }
            _ if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                tokens.push((Token::Ident(text), pos));
            }
            _ => return Err(error(pos, format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, p)| *p).unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), QueryError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(error(self.position(), format!("expected '{}'", keyword)))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), QueryError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(error(self.position(), format!("expected {}", what)))
        }
    }

    fn ident(&mut self) -> Result<String, QueryError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(error(position, "expected identifier")),
        }
    }

    fn unsigned(&mut self) -> Result<usize, QueryError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Number(text)) => text
                .parse::<usize>()
                .map_err(|_| error(position, format!("expected a non-negative integer, got '{}'", text))),
            _ => Err(error(position, "expected a number")),
        }
    }

    fn statement(&mut self) -> Result<Query, QueryError> {
        let mut database = None;
        if self.eat_keyword("use") {
            database = Some(self.ident()?);
            self.expect(Token::Semicolon, "';' after use statement")?;
        }

        let query = self.query(database)?;
        self.eat(&Token::Semicolon);
        if self.peek().is_some() {
            return Err(error(self.position(), "unexpected input after query"));
        }
        Ok(query)
    }

    fn query(&mut self, database: Option<String>) -> Result<Query, QueryError> {
        self.expect_keyword("select")?;
        let mut query = Query::new();
        if self.eat_keyword("distinct") {
            query = query.distinct();
        }

        if !self.eat(&Token::Star) && !self.peek_keyword("from") {
            loop {
                self.select_item(&mut query)?;
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect_keyword("from")?;
        let first = self.ident()?;
        query = if self.eat(&Token::Dot) {
            let table = self.ident()?;
            query.select_from(first, table)
        } else {
            match database {
                Some(database) => query.select_from(database, first),
                None => return Err(QueryError::MissingDataSource),
            }
        };

        if self.eat_keyword("where") {
            query = query.where_clause(self.or_clause()?);
        }
        if self.eat_keyword("group") {
            self.expect_keyword("by")?;
            loop {
                let clause = self.group_clause()?;
                query = query.group_by([clause]);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        if self.eat_keyword("sort") || self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let field = self.ident()?;
                let direction = if self.eat_keyword("desc") {
                    SortDirection::Descending
                } else {
                    self.eat_keyword("asc");
                    SortDirection::Ascending
                };
                query = query.sort_by([(field, direction)]);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        if self.eat_keyword("limit") {
            query = query.limit(self.unsigned()?);
        }
        if self.eat_keyword("offset") {
            query = query.offset(self.unsigned()?);
        }

        Ok(query)
    }

    fn select_item(&mut self, query: &mut Query) -> Result<(), QueryError> {
        let position = self.position();
        let name = self.ident()?;
        if !self.eat(&Token::LParen) {
            query.fields.push(name);
            return Ok(());
        }

        let function: AggregateFunction = name
            .parse()
            .map_err(|_| error(position, format!("unknown aggregate function '{}'", name)))?;
        let field = if self.eat(&Token::Star) {
            ALL_FIELDS.to_string()
        } else {
            self.ident()?
        };
        self.expect(Token::RParen, "')'")?;
        let output = if self.eat_keyword("as") {
            self.ident()?
        } else {
            AggregateClause::generated_name(function, &field)
        };
        query.aggregates.push(AggregateClause {
            function,
            field,
            name: output,
        });
        Ok(())
    }

    fn group_clause(&mut self) -> Result<GroupByClause, QueryError> {
        let position = self.position();
        let name = self.ident()?;
        if !self.eat(&Token::LParen) {
            return Ok(GroupByClause::from(name));
        }

        let function: GroupByFunction = name
            .parse()
            .map_err(|_| error(position, format!("unknown group by function '{}'", name)))?;
        let field = self.ident()?;
        self.expect(Token::RParen, "')'")?;
        let output = if self.eat_keyword("as") {
            self.ident()?
        } else {
            format!("{}_{}", function.name(), field)
        };
        Ok(GroupByFunctionClause::new(function, field, output).into())
    }

    fn or_clause(&mut self) -> Result<WhereClause, QueryError> {
        let mut clauses = vec![self.and_clause()?];
        while self.eat_keyword("or") {
            clauses.push(self.and_clause()?);
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            WhereClause::or(clauses)
        })
    }

    fn and_clause(&mut self) -> Result<WhereClause, QueryError> {
        let mut clauses = vec![self.term()?];
        while self.eat_keyword("and") {
            clauses.push(self.term()?);
        }
        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            WhereClause::and(clauses)
        })
    }

    fn term(&mut self) -> Result<WhereClause, QueryError> {
        if self.eat(&Token::LParen) {
            let clause = self.or_clause()?;
            self.expect(Token::RParen, "')'")?;
            return Ok(clause);
        }

        let field = self.ident()?;
        let position = self.position();
        let operator = match self.advance() {
            Some(Token::Op(op)) => op,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("in") => Operator::In,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("notin") => Operator::NotIn,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("not") => {
                self.expect_keyword("in")?;
                Operator::NotIn
            }
            _ => return Err(error(position, "expected comparison operator")),
        };
        let value = self.literal()?;
        Ok(WhereClause::compare(field, operator, value))
    }

    fn literal(&mut self) -> Result<Value, QueryError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Str(text)) => Ok(Value::String(text)),
            Some(Token::Number(text)) => number(&text).ok_or_else(|| error(position, format!("invalid number '{}'", text))),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::LBracket) => {
                let mut values = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        values.push(self.literal()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma, "',' or ']'")?;
                    }
                }
                Ok(Value::Array(values))
            }
            _ => Err(error(position, "expected a value")),
        }
    }
}

fn number(text: &str) -> Option<Value> {
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Parses a single statement into a query descriptor
pub fn parse(input: &str) -> Result<Query, QueryError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    parser.statement()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::DataSource;
    use serde_json::json;

    #[test]
    fn test_parse_full_statement() {
        let query = parse(
            "use acceptanceTest; select firstname, state from records \
             where salary >= 100000 and (state = 'VA' or state = \"DC\") \
             group by state, month(hiredate) as hire_month \
             sort by state asc, hire_month desc limit 5 offset 1",
        )
        .unwrap();

        assert_eq!(query.data_source, Some(DataSource::new("acceptanceTest", "records")));
        assert_eq!(query.fields, vec!["firstname", "state"]);
        assert_eq!(
            query.where_clause,
            Some(WhereClause::and([
                WhereClause::compare("salary", Operator::Ge, 100000),
                WhereClause::or([WhereClause::eq("state", "VA"), WhereClause::eq("state", "DC")]),
            ]))
        );
        assert_eq!(query.group_by_clauses[1].output_name(), "hire_month");
        assert_eq!(query.sort_clauses[1].direction, SortDirection::Descending);
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, Some(1));
    }

    #[test]
    fn test_parse_aggregates_and_lists() {
        let query = parse("select count(*) as counter, max(salary) from db.records where state notin ['VA', 'DC']").unwrap();
        assert_eq!(query.aggregates[0].name, "counter");
        assert_eq!(query.aggregates[1].name, "max_salary");
        match query.where_clause {
            Some(WhereClause::Simple(simple)) => {
                assert_eq!(simple.operator, Operator::NotIn);
                assert_eq!(simple.value, json!(["VA", "DC"]));
            }
            other => panic!("unexpected clause {:?}", other),
        }
    }

    #[test]
    fn test_parse_null_and_distinct() {
        let query = parse("select distinct state from db.records where lastname = null").unwrap();
        assert!(query.is_distinct);
        assert_eq!(query.where_clause, Some(WhereClause::eq("lastname", Value::Null)));
    }

    #[test]
    fn test_parse_errors_carry_positions() {
        assert_eq!(parse("select from records"), Err(QueryError::MissingDataSource));
        match parse("select from db.records where salary ~ 3") {
            Err(QueryError::Parse { position, .. }) => assert_eq!(position, 36),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(parse("select from db.records limit 2 extra").is_err());
        assert!(parse("select from db.records where name = 'open").is_err());
    }
}
