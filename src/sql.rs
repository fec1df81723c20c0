use sqlparser::ast::{
    self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SetUnitPrice {
        price: Money,
    },
    InsertProperty {
        id: PropertyId,
        capacity: i64,
    },
    ListForSale {
        id: PropertyId,
    },
    ListForRent {
        id: PropertyId,
    },
    RequestAllocation {
        size: i64,
        to_rent: bool,
    },
    SelectOwner {
        property_id: PropertyId,
    },
    SelectPrices {
        size: Option<i64>,
    },
    SelectProperties {
        page: PageRequest,
        filter: PropertyFilter,
    },
    SelectSaleContracts {
        page: PageRequest,
        filter: ContractFilter,
    },
    SelectRentalContracts {
        page: PageRequest,
        filter: ContractFilter,
    },
    InsertTransfer {
        property_id: PropertyId,
        seller_id: PartyId,
        buyer_id: PartyId,
        price: Money,
        approval: bool,
    },
    InsertLease {
        property_id: PropertyId,
        tenant_id: PartyId,
        price: Money,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "properties" => {
            if values.len() < 2 {
                return Err(SqlError::WrongArity("properties", 2, values.len()));
            }
            Ok(Command::InsertProperty {
                id: parse_i64(&values[0])?,
                capacity: parse_i64(&values[1])?,
            })
        }
        "transfers" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("transfers", 5, values.len()));
            }
            Ok(Command::InsertTransfer {
                property_id: parse_i64(&values[0])?,
                seller_id: parse_i64(&values[1])?,
                buyer_id: parse_i64(&values[2])?,
                price: parse_money(&values[3])?,
                approval: parse_bool(&values[4])?,
            })
        }
        "rental_contracts" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("rental_contracts", 3, values.len()));
            }
            Ok(Command::InsertLease {
                property_id: parse_i64(&values[0])?,
                tenant_id: parse_i64(&values[1])?,
                price: parse_money(&values[2])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    match table.as_str() {
        "prices" => {
            let (column, value) = single_assignment(assignments)?;
            if column != "unit_price" {
                return Err(SqlError::Parse(format!("unknown price column: {column}")));
            }
            Ok(Command::SetUnitPrice {
                price: parse_money(value)?,
            })
        }
        "properties" => {
            let id = extract_where_eq(selection, "id")?;
            let (column, value) = single_assignment(assignments)?;
            if !parse_bool(value)? {
                return Err(SqlError::Unsupported("delisting a property".into()));
            }
            match column.as_str() {
                "for_sale" => Ok(Command::ListForSale { id }),
                "for_rent" => Ok(Command::ListForRent { id }),
                other => Err(SqlError::Parse(format!("unknown listing column: {other}"))),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "allocation" => Ok(Command::RequestAllocation {
            size: filters.take("capacity").ok_or(SqlError::MissingFilter("capacity"))?.as_i64()?,
            to_rent: filters.take("to_rent").ok_or(SqlError::MissingFilter("to_rent"))?.as_bool()?,
        }),
        "owner" => Ok(Command::SelectOwner {
            property_id: filters
                .take("property_id")
                .ok_or(SqlError::MissingFilter("property_id"))?
                .as_i64()?,
        }),
        "prices" => Ok(Command::SelectPrices {
            size: filters.take("capacity").map(|v| v.as_i64()).transpose()?,
        }),
        "properties" => Ok(Command::SelectProperties {
            page: take_page(&mut filters)?,
            filter: PropertyFilter {
                id: filters.take("id").map(|v| v.as_i64()).transpose()?,
                owner_id: filters.take("owner_id").map(|v| v.as_i64()).transpose()?,
                capacity: filters.take("capacity").map(|v| v.as_i64()).transpose()?,
            },
        }),
        "sale_contracts" => Ok(Command::SelectSaleContracts {
            page: take_page(&mut filters)?,
            filter: take_contract_filter(&mut filters)?,
        }),
        "rental_contracts" => Ok(Command::SelectRentalContracts {
            page: take_page(&mut filters)?,
            filter: take_contract_filter(&mut filters)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn take_page(filters: &mut Filters) -> Result<PageRequest, SqlError> {
    Ok(PageRequest {
        number: filters.take("page").ok_or(SqlError::MissingFilter("page"))?.as_i64()?,
        size: filters
            .take("page_size")
            .ok_or(SqlError::MissingFilter("page_size"))?
            .as_i64()?,
    })
}

fn take_contract_filter(filters: &mut Filters) -> Result<ContractFilter, SqlError> {
    Ok(ContractFilter {
        id: filters.take("id").map(|v| v.as_i64()).transpose()?,
        property_id: filters.take("property_id").map(|v| v.as_i64()).transpose()?,
        capacity: filters.take("capacity").map(|v| v.as_i64()).transpose()?,
    })
}

// ── WHERE clause collection ───────────────────────────────────

/// Column = value pairs gathered from an AND-chained WHERE clause.
#[derive(Default)]
struct Filters {
    entries: Vec<(String, Expr)>,
}

impl Filters {
    fn take(&mut self, column: &str) -> Option<FilterValue> {
        let pos = self.entries.iter().position(|(c, _)| c == column)?;
        let (_, expr) = self.entries.remove(pos);
        Some(FilterValue(expr))
    }
}

struct FilterValue(Expr);

impl FilterValue {
    fn as_i64(&self) -> Result<i64, SqlError> {
        parse_i64(&self.0)
    }

    fn as_bool(&self) -> Result<bool, SqlError> {
        parse_bool(&self.0)
    }
}

fn collect_eq_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, filters)?;
                collect_eq_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => {
                if let Some(col) = expr_column_name(left) {
                    filters.entries.push((col, (**right).clone()));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn single_assignment(assignments: &[ast::Assignment]) -> Result<(String, &Expr), SqlError> {
    let [assignment] = assignments else {
        return Err(SqlError::Parse("expected a single SET column".into()));
    };
    let column = match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
        }
        _ => return Err(SqlError::Parse("unsupported SET target".into())),
    };
    Ok((column, &assignment.value))
}

fn extract_where_eq(selection: &Option<Expr>, column: &'static str) -> Result<i64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => parse_i64(right),
        _ => Err(SqlError::MissingFilter(column)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_money(expr: &Expr) -> Result<Money, SqlError> {
    let literal = if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s.clone(),
            _ => return Err(SqlError::Parse(format!("expected amount, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        if let Some(Value::Number(s, _)) = extract_value(expr) {
            format!("-{s}")
        } else {
            return Err(SqlError::Parse(format!("expected amount, got {expr:?}")));
        }
    } else {
        return Err(SqlError::Parse(format!("expected value, got {expr:?}")));
    };
    Money::parse(&literal).map_err(|e| SqlError::Parse(format!("bad amount {literal:?}: {e}")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
