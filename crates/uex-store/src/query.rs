//! Composable predicate queries against a single entity table.
//!
//! Every value is parameter-bound. Column identifiers cannot be bound, so they
//! are checked against the table schema before any SQL is produced.

use rusqlite::types::{ToSql, ToSqlOutput, Value};
use uex_models::{EntityType, TableSchema};

use crate::error::StoreError;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Null => ToSqlOutput::Owned(Value::Null),
            Param::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            Param::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            Param::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Integer(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Param::Integer(v as i64)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Real(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Integer(v as i64)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Op {
    fn sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Like => "LIKE",
            Op::In => "IN",
            Op::NotIn => "NOT IN",
            Op::IsNull => "IS NULL",
            Op::IsNotNull => "IS NOT NULL",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Value(Param),
    List(Vec<Param>),
    /// Another column of the same row.
    Column(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
    pub operand: Operand,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: Op, operand: Operand) -> Self {
        Self {
            column: column.into(),
            op,
            operand,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Eq, Operand::Value(value.into()))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Ne, Operand::Value(value.into()))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Lt, Operand::Value(value.into()))
    }

    pub fn le(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Le, Operand::Value(value.into()))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Gt, Operand::Value(value.into()))
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Param>) -> Self {
        Self::new(column, Op::Ge, Operand::Value(value.into()))
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<Param>) -> Self {
        Self::new(column, Op::Like, Operand::Value(pattern.into()))
    }

    pub fn is_in<P: Into<Param>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = P>,
    ) -> Self {
        Self::new(
            column,
            Op::In,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<P: Into<Param>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = P>,
    ) -> Self {
        Self::new(
            column,
            Op::NotIn,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::new(column, Op::IsNull, Operand::None)
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::new(column, Op::IsNotNull, Operand::None)
    }

    /// Compare against another column of the same row.
    pub fn column_eq(column: impl Into<String>, other: impl Into<String>) -> Self {
        Self::new(column, Op::Eq, Operand::Column(other.into()))
    }
}

/// A group of predicates joined into the outer conjunction.
#[derive(Debug, Clone, PartialEq)]
pub enum PredicateGroup {
    /// Every predicate must hold.
    All(Vec<Predicate>),
    /// At least one term must hold; all terms share one operator
    /// (whitelisting the same values across sibling columns).
    Any {
        op: Op,
        terms: Vec<(String, Operand)>,
    },
}

/// Computed column expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Param),
    /// Scalar minimum of all arguments.
    Min(Vec<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    /// Truncate toward zero.
    Trunc(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn lit(value: impl Into<Param>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn mul(a: Expr, b: Expr) -> Self {
        Expr::Mul(Box::new(a), Box::new(b))
    }

    pub fn sub(a: Expr, b: Expr) -> Self {
        Expr::Sub(Box::new(a), Box::new(b))
    }

    pub fn div(a: Expr, b: Expr) -> Self {
        Expr::Div(Box::new(a), Box::new(b))
    }

    pub fn trunc(a: Expr) -> Self {
        Expr::Trunc(Box::new(a))
    }

    pub fn equals(a: Expr, b: Expr) -> Self {
        Expr::Eq(Box::new(a), Box::new(b))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Computed {
    pub alias: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub key: String,
    pub descending: bool,
}

/// A query over one entity table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub entity: EntityType,
    pub groups: Vec<PredicateGroup>,
    pub computed: Vec<Computed>,
    pub order: Vec<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Query {
    pub fn new(entity: EntityType) -> Self {
        Self {
            entity,
            groups: Vec::new(),
            computed: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Add a single predicate to the outer conjunction.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.groups.push(PredicateGroup::All(vec![predicate]));
        self
    }

    pub fn group(mut self, group: PredicateGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Add a disjunction over sibling columns sharing one operator.
    pub fn any(mut self, op: Op, terms: Vec<(String, Operand)>) -> Self {
        self.groups.push(PredicateGroup::Any { op, terms });
        self
    }

    pub fn compute(mut self, alias: impl Into<String>, expr: Expr) -> Self {
        self.computed.push(Computed {
            alias: alias.into(),
            expr,
        });
        self
    }

    pub fn order_asc(mut self, key: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            key: key.into(),
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, key: impl Into<String>) -> Self {
        self.order.push(OrderBy {
            key: key.into(),
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Render the query to SQL with its bound parameters, in textual order.
    pub fn to_sql(&self) -> Result<(String, Vec<Param>), StoreError> {
        let schema = self.entity.schema();
        let mut params = Vec::new();

        let mut select = String::from("SELECT *");
        for computed in &self.computed {
            if !is_identifier(&computed.alias) || schema.has_column(&computed.alias) {
                return Err(StoreError::Schema(format!(
                    "invalid computed column alias '{}' on {}",
                    computed.alias, schema.name
                )));
            }
            let expr = render_expr(schema, &computed.expr, &mut params)?;
            select.push_str(&format!(", {expr} AS {}", computed.alias));
        }

        let mut sql = format!("{select} FROM {}", schema.name);

        let mut clauses = Vec::new();
        for group in &self.groups {
            if let Some(clause) = render_group(schema, group, &mut params)? {
                clauses.push(clause);
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order.is_empty() {
            let mut keys = Vec::with_capacity(self.order.len());
            for order in &self.order {
                let known = schema.has_column(&order.key)
                    || self.computed.iter().any(|c| c.alias == order.key);
                if !known {
                    return Err(StoreError::Schema(format!(
                        "unknown order key '{}' on {}",
                        order.key, schema.name
                    )));
                }
                let dir = if order.descending { "DESC" } else { "ASC" };
                keys.push(format!("{} {dir}", order.key));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                params.push(Param::Integer(limit as i64));
                params.push(Param::Integer(offset.unwrap_or(0) as i64));
            }
            (None, Some(offset)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                params.push(Param::Integer(offset as i64));
            }
            (None, None) => {}
        }

        Ok((sql, params))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn checked_column<'a>(schema: &TableSchema, column: &'a str) -> Result<&'a str, StoreError> {
    if schema.has_column(column) {
        Ok(column)
    } else {
        Err(StoreError::Schema(format!(
            "no such column '{column}' on {}",
            schema.name
        )))
    }
}

fn render_comparison(
    schema: &TableSchema,
    column: &str,
    op: Op,
    operand: &Operand,
    params: &mut Vec<Param>,
) -> Result<String, StoreError> {
    let column = checked_column(schema, column)?;
    match (op, operand) {
        (Op::IsNull | Op::IsNotNull, _) => Ok(format!("{column} {}", op.sql())),
        (Op::In | Op::NotIn, Operand::List(values)) => {
            if values.is_empty() {
                // Nothing is in an empty list.
                return Ok(if op == Op::In { "0" } else { "1" }.to_string());
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            params.extend(values.iter().cloned());
            Ok(format!("{column} {} ({placeholders})", op.sql()))
        }
        (Op::In | Op::NotIn, Operand::Value(value)) => {
            params.push(value.clone());
            Ok(format!("{column} {} (?)", op.sql()))
        }
        (_, Operand::Value(value)) => {
            params.push(value.clone());
            Ok(format!("{column} {} ?", op.sql()))
        }
        (_, Operand::Column(other)) => {
            let other = checked_column(schema, other)?;
            Ok(format!("{column} {} {other}", op.sql()))
        }
        (op, operand) => Err(StoreError::Schema(format!(
            "operator {op:?} cannot take operand {operand:?}"
        ))),
    }
}

fn render_group(
    schema: &TableSchema,
    group: &PredicateGroup,
    params: &mut Vec<Param>,
) -> Result<Option<String>, StoreError> {
    let (parts, joiner) = match group {
        PredicateGroup::All(predicates) => {
            let mut parts = Vec::with_capacity(predicates.len());
            for p in predicates {
                parts.push(render_comparison(
                    schema,
                    &p.column,
                    p.op,
                    &p.operand,
                    params,
                )?);
            }
            (parts, " AND ")
        }
        PredicateGroup::Any { op, terms } => {
            let mut parts = Vec::with_capacity(terms.len());
            for (column, operand) in terms {
                parts.push(render_comparison(schema, column, *op, operand, params)?);
            }
            (parts, " OR ")
        }
    };

    if parts.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("({})", parts.join(joiner))))
}

fn render_expr(
    schema: &TableSchema,
    expr: &Expr,
    params: &mut Vec<Param>,
) -> Result<String, StoreError> {
    Ok(match expr {
        Expr::Column(name) => checked_column(schema, name)?.to_string(),
        Expr::Literal(value) => {
            params.push(value.clone());
            "?".to_string()
        }
        Expr::Min(args) => match args.as_slice() {
            [] => return Err(StoreError::Schema("MIN() needs an argument".to_string())),
            // Single-argument MIN is an aggregate in SQLite.
            [only] => render_expr(schema, only, params)?,
            many => {
                let mut rendered = Vec::with_capacity(many.len());
                for arg in many {
                    rendered.push(render_expr(schema, arg, params)?);
                }
                format!("MIN({})", rendered.join(", "))
            }
        },
        Expr::Mul(a, b) => binary(schema, a, "*", b, params)?,
        Expr::Sub(a, b) => binary(schema, a, "-", b, params)?,
        Expr::Div(a, b) => binary(schema, a, "/", b, params)?,
        Expr::Eq(a, b) => binary(schema, a, "=", b, params)?,
        Expr::Trunc(a) => format!("CAST({} AS INTEGER)", render_expr(schema, a, params)?),
    })
}

fn binary(
    schema: &TableSchema,
    a: &Expr,
    op: &str,
    b: &Expr,
    params: &mut Vec<Param>,
) -> Result<String, StoreError> {
    let left = render_expr(schema, a, params)?;
    let right = render_expr(schema, b, params)?;
    Ok(format!("({left} {op} {right})"))
}
