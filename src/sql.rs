use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, Weekday};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertResource {
        id: Ulid,
        kind: ResourceKind,
        name: Option<String>,
    },
    InsertWindow {
        id: Ulid,
        weekday: Weekday,
        start: NaiveTime,
        end: NaiveTime,
        capacity: u32,
    },
    UpdateWindow {
        id: Ulid,
        start: Option<NaiveTime>,
        end: Option<NaiveTime>,
        capacity: Option<u32>,
    },
    /// Windows are retired, never erased.
    DeleteWindow {
        id: Ulid,
    },
    InsertHoliday {
        id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        label: Option<String>,
    },
    DeleteHoliday {
        id: Ulid,
    },
    InsertBooking {
        id: Ulid,
        resource_id: Ulid,
        date: NaiveDate,
        window_id: Ulid,
        note: Option<String>,
    },
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    /// Missing fields keep the booking's current value.
    RescheduleBooking {
        id: Ulid,
        date: Option<NaiveDate>,
        window_id: Option<Ulid>,
    },
    /// Bookings are cancelled, never erased.
    DeleteBooking {
        id: Ulid,
    },
    SelectResources,
    SelectWindows {
        weekday: Option<Weekday>,
    },
    SelectHolidays,
    SelectBookings {
        resource_id: Ulid,
        date: Option<NaiveDate>,
        statuses: Option<Vec<BookingStatus>>,
    },
    SelectAvailability {
        resource_id: Ulid,
        date: NaiveDate,
    },
    SelectCalendar {
        view: CalendarView,
        anchor: NaiveDate,
        filter: CalendarFilter,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

const RESOURCE_COLUMNS: &[&str] = &["id", "kind", "name"];
const WINDOW_COLUMNS: &[&str] = &["id", "weekday", "start", "end", "capacity"];
const HOLIDAY_COLUMNS: &[&str] = &["id", "start_date", "end_date", "label"];
const BOOKING_COLUMNS: &[&str] = &["id", "resource_id", "date", "window_id", "note"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;
    if rows.len() > 1 {
        return Err(SqlError::Unsupported(format!("multi-row INSERT into {table}")));
    }
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();

    match table.as_str() {
        "resources" => {
            let row = named_row("resources", RESOURCE_COLUMNS, &columns, &rows[0], 2)?;
            Ok(Command::InsertResource {
                id: parse_ulid(required(&row, "id")?)?,
                kind: parse_enum(required(&row, "kind")?)?,
                name: optional(&row, "name").map(parse_string_or_null).transpose()?.flatten(),
            })
        }
        "windows" => {
            let row = named_row("windows", WINDOW_COLUMNS, &columns, &rows[0], 5)?;
            Ok(Command::InsertWindow {
                id: parse_ulid(required(&row, "id")?)?,
                weekday: parse_weekday(required(&row, "weekday")?)?,
                start: parse_time(required(&row, "start")?)?,
                end: parse_time(required(&row, "end")?)?,
                capacity: parse_u32(required(&row, "capacity")?)?,
            })
        }
        "holidays" => {
            let row = named_row("holidays", HOLIDAY_COLUMNS, &columns, &rows[0], 2)?;
            let start = parse_date(required(&row, "start_date")?)?;
            let end = match optional(&row, "end_date") {
                Some(e) if !is_null(e) => parse_date(e)?,
                _ => start,
            };
            Ok(Command::InsertHoliday {
                id: parse_ulid(required(&row, "id")?)?,
                start,
                end,
                label: optional(&row, "label").map(parse_string_or_null).transpose()?.flatten(),
            })
        }
        "bookings" => {
            let row = named_row("bookings", BOOKING_COLUMNS, &columns, &rows[0], 4)?;
            Ok(Command::InsertBooking {
                id: parse_ulid(required(&row, "id")?)?,
                resource_id: parse_ulid(required(&row, "resource_id")?)?,
                date: parse_date(required(&row, "date")?)?,
                window_id: parse_ulid(required(&row, "window_id")?)?,
                note: optional(&row, "note").map(parse_string_or_null).transpose()?.flatten(),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Pair VALUES with column names. Without a column list the table's
/// default column order applies.
fn named_row<'a>(
    table: &'static str,
    default_columns: &[&str],
    columns: &[String],
    values: &'a [Expr],
    min_values: usize,
) -> Result<HashMap<String, &'a Expr>, SqlError> {
    if values.len() < min_values {
        return Err(SqlError::WrongArity(table, min_values, values.len()));
    }
    if columns.is_empty() {
        if values.len() > default_columns.len() {
            return Err(SqlError::WrongArity(table, default_columns.len(), values.len()));
        }
        return Ok(default_columns
            .iter()
            .map(|c| c.to_string())
            .zip(values.iter())
            .collect());
    }
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity(table, columns.len(), values.len()));
    }
    if let Some(unknown) = columns.iter().find(|c| !default_columns.contains(&c.as_str())) {
        return Err(SqlError::UnknownColumn(unknown.clone()));
    }
    Ok(columns.iter().cloned().zip(values.iter()).collect())
}

fn required<'a>(row: &HashMap<String, &'a Expr>, column: &'static str) -> Result<&'a Expr, SqlError> {
    row.get(column).copied().ok_or(SqlError::MissingColumn(column))
}

fn optional<'a>(row: &HashMap<String, &'a Expr>, column: &str) -> Option<&'a Expr> {
    row.get(column).copied()
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    let mut set: HashMap<String, &Expr> = HashMap::new();
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.insert(column, &a.value);
    }

    match table.as_str() {
        "windows" => {
            if let Some(col) = set.keys().find(|c| !["start", "end", "capacity"].contains(&c.as_str())) {
                return Err(SqlError::UnknownColumn(col.clone()));
            }
            Ok(Command::UpdateWindow {
                id,
                start: set.get("start").map(|e| parse_time(e)).transpose()?,
                end: set.get("end").map(|e| parse_time(e)).transpose()?,
                capacity: set.get("capacity").map(|e| parse_u32(e)).transpose()?,
            })
        }
        "bookings" => {
            if let Some(col) = set.keys().find(|c| !["status", "date", "window_id"].contains(&c.as_str())) {
                return Err(SqlError::UnknownColumn(col.clone()));
            }
            match set.get("status") {
                Some(_) if set.len() > 1 => Err(SqlError::Unsupported(
                    "status cannot be changed together with date or window_id".into(),
                )),
                Some(status) => Ok(Command::UpdateBookingStatus {
                    id,
                    status: parse_enum(status)?,
                }),
                None => Ok(Command::RescheduleBooking {
                    id,
                    date: set.get("date").map(|e| parse_date(e)).transpose()?,
                    window_id: set.get("window_id").map(|e| parse_ulid(e)).transpose()?,
                }),
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "windows" => Ok(Command::DeleteWindow { id }),
        "holidays" => Ok(Command::DeleteHoliday { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

/// Conditions from a WHERE clause made of `col = v`, `col IN (...)` and
/// `col NOT IN (...)` joined by AND.
#[derive(Default)]
struct Filters<'a> {
    eq: HashMap<String, &'a Expr>,
    within: HashMap<String, (&'a [Expr], bool)>,
}

impl<'a> Filters<'a> {
    fn collect(expr: &'a Expr, out: &mut Self) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => Self::collect(inner, out),
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                Self::collect(left, out)?;
                Self::collect(right, out)
            }
            Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => {
                let col = expr_column_name(left).ok_or_else(|| SqlError::Unsupported(format!("{expr}")))?;
                out.eq.insert(col, right);
                Ok(())
            }
            Expr::InList { expr: col, list, negated } => {
                let col = expr_column_name(col).ok_or_else(|| SqlError::Unsupported(format!("{expr}")))?;
                out.within.insert(col, (list.as_slice(), *negated));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn require(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.eq.get(column).copied().ok_or(SqlError::MissingFilter(column))
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.eq.get(column).copied()
    }

    /// `col = v` or `col IN (...)` as a list; `NOT IN` is rejected.
    fn any_of<T, F>(&self, column: &str, parse: F) -> Result<Option<Vec<T>>, SqlError>
    where
        F: Fn(&Expr) -> Result<T, SqlError>,
    {
        if let Some(e) = self.get(column) {
            return Ok(Some(vec![parse(e)?]));
        }
        match self.within.get(column) {
            Some((_, true)) => Err(SqlError::Unsupported(format!("{column} NOT IN"))),
            Some((list, false)) => Ok(Some(list.iter().map(&parse).collect::<Result<_, _>>()?)),
            None => Ok(None),
        }
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
        Filters::collect(selection, &mut filters)?;
    }

    match table.as_str() {
        "resources" => Ok(Command::SelectResources),
        "holidays" => Ok(Command::SelectHolidays),
        "windows" => Ok(Command::SelectWindows {
            weekday: filters.get("weekday").map(parse_weekday).transpose()?,
        }),
        "bookings" => Ok(Command::SelectBookings {
            resource_id: parse_ulid(filters.require("resource_id")?)?,
            date: filters.get("date").map(parse_date).transpose()?,
            statuses: filters.any_of("status", parse_enum)?,
        }),
        "availability" => Ok(Command::SelectAvailability {
            resource_id: parse_ulid(filters.require("resource_id")?)?,
            date: parse_date(filters.require("date")?)?,
        }),
        "calendar" => {
            let kinds = match filters.within.get("kind") {
                Some((list, negated)) => {
                    let kinds = list.iter().map(parse_enum).collect::<Result<Vec<EntryKind>, _>>()?;
                    if *negated {
                        KindFilter::Exclude(kinds)
                    } else {
                        KindFilter::Include(kinds)
                    }
                }
                None => match filters.get("kind") {
                    Some(k) => KindFilter::Include(vec![parse_enum(k)?]),
                    None => KindFilter::All,
                },
            };
            Ok(Command::SelectCalendar {
                view: parse_enum(filters.require("view")?)?,
                anchor: parse_date(filters.require("anchor")?)?,
                filter: CalendarFilter {
                    kinds,
                    statuses: filters.any_of("status", parse_enum)?,
                    resource_id: filters.get("resource_id").map(parse_ulid).transpose()?,
                },
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
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
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if values.rows.is_empty() => Err(SqlError::Parse("empty VALUES".into())),
        SetExpr::Values(values) => Ok(&values.rows),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
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

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

/// Text from a string literal, or a bare identifier (`view = week`).
fn parse_text(expr: &Expr) -> Result<&str, SqlError> {
    match expr {
        Expr::Identifier(ident) => Ok(&ident.value),
        _ => match extract_value(expr) {
            Some(Value::SingleQuotedString(s)) => Ok(s),
            Some(Value::Number(s, _)) => Ok(s),
            Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
            None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
        },
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_text(expr).map(|s| Some(s.to_string()))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_text(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::InvalidValue(format!("bad ULID {s}: {e}")))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64(expr)?);
    }
    let s = parse_text(expr)?;
    s.parse().map_err(|e| SqlError::InvalidValue(format!("bad integer {s}: {e}")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::InvalidValue(format!("{v} out of range")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_text(expr)?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| SqlError::InvalidValue(format!("bad date {s}: {e}")))
}

fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_text(expr)?;
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| SqlError::InvalidValue(format!("bad time {s}: {e}")))
}

fn parse_weekday(expr: &Expr) -> Result<Weekday, SqlError> {
    let s = parse_text(expr)?;
    s.parse::<Weekday>()
        .map_err(|_| SqlError::InvalidValue(format!("bad weekday {s}")))
}

fn parse_enum<T: std::str::FromStr<Err = String>>(expr: &Expr) -> Result<T, SqlError> {
    parse_text(expr)?.parse().map_err(SqlError::InvalidValue)
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    /// Well-formed SQL carrying a value that is not a valid id, date, time or enum.
    InvalidValue(String),
}

impl SqlError {
    /// SQLSTATE reported on the wire.
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::InvalidValue(_) => "22023",
            SqlError::UnknownTable(_) => "42P01",
            SqlError::UnknownColumn(_) => "42703",
            SqlError::Unsupported(_) => "0A000",
            _ => "42601",
        }
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::InvalidValue(s) => write!(f, "VALIDATION: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn parse_insert_resource() {
        let sql = format!("INSERT INTO resources (id, kind, name) VALUES ('{ID}', 'vehicle', 'Demo SUV')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertResource {
                id: ulid(ID),
                kind: ResourceKind::Vehicle,
                name: Some("Demo SUV".into()),
            }
        );
    }

    #[test]
    fn parse_insert_resource_positional_without_name() {
        let sql = format!("INSERT INTO resources VALUES ('{ID}', 'service_bay')");
        match parse_sql(&sql).unwrap() {
            Command::InsertResource { kind, name, .. } => {
                assert_eq!(kind, ResourceKind::ServiceBay);
                assert_eq!(name, None);
            }
            other => panic!("expected InsertResource, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_window() {
        let sql = format!(
            r#"INSERT INTO windows (id, weekday, start, "end", capacity) VALUES ('{ID}', 'sat', '10:00', '11:00', 3)"#
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertWindow {
                id: ulid(ID),
                weekday: Weekday::Sat,
                start: time("10:00"),
                end: time("11:00"),
                capacity: 3,
            }
        );
    }

    #[test]
    fn parse_insert_window_columns_in_any_order() {
        let sql = format!(
            r#"INSERT INTO windows (capacity, "end", start, weekday, id) VALUES (1, '09:30:00', '09:00', 'Monday', '{ID}')"#
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertWindow { weekday, end, capacity, .. } => {
                assert_eq!(weekday, Weekday::Mon);
                assert_eq!(end, time("09:30"));
                assert_eq!(capacity, 1);
            }
            other => panic!("expected InsertWindow, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_holiday_single_day() {
        let sql = format!("INSERT INTO holidays (id, start_date, label) VALUES ('{ID}', '2024-12-25', 'Christmas')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertHoliday {
                id: ulid(ID),
                start: date("2024-12-25"),
                end: date("2024-12-25"),
                label: Some("Christmas".into()),
            }
        );
    }

    #[test]
    fn parse_insert_holiday_range_null_label() {
        let sql = format!("INSERT INTO holidays VALUES ('{ID}', '2024-12-30', '2025-01-02', NULL)");
        match parse_sql(&sql).unwrap() {
            Command::InsertHoliday { start, end, label, .. } => {
                assert_eq!(start, date("2024-12-30"));
                assert_eq!(end, date("2025-01-02"));
                assert_eq!(label, None);
            }
            other => panic!("expected InsertHoliday, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_booking() {
        let sql = format!(
            "INSERT INTO bookings (id, resource_id, date, window_id, note) VALUES ('{ID}', '{OTHER}', '2024-03-02', '{OTHER}', 'bring license')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertBooking {
                id: ulid(ID),
                resource_id: ulid(OTHER),
                date: date("2024-03-02"),
                window_id: ulid(OTHER),
                note: Some("bring license".into()),
            }
        );
    }

    #[test]
    fn insert_booking_arity_and_values_checked() {
        let short = format!("INSERT INTO bookings VALUES ('{ID}', '{OTHER}')");
        assert!(matches!(parse_sql(&short), Err(SqlError::WrongArity("bookings", 4, 2))));

        let bad_date = format!("INSERT INTO bookings VALUES ('{ID}', '{OTHER}', '2024-02-30', '{OTHER}')");
        let err = parse_sql(&bad_date).unwrap_err();
        assert!(matches!(err, SqlError::InvalidValue(_)));
        assert_eq!(err.sqlstate(), "22023");

        let unknown = format!("INSERT INTO bookings (id, colour) VALUES ('{ID}', 'red')");
        assert!(parse_sql(&unknown).is_err());
    }

    #[test]
    fn multi_row_insert_rejected() {
        let sql = format!("INSERT INTO resources VALUES ('{ID}', 'vehicle'), ('{OTHER}', 'vehicle')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_window() {
        let sql = format!("UPDATE windows SET capacity = 2 WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateWindow {
                id: ulid(ID),
                start: None,
                end: None,
                capacity: Some(2),
            }
        );
    }

    #[test]
    fn parse_update_booking_status() {
        let sql = format!("UPDATE bookings SET status = 'confirmed' WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateBookingStatus {
                id: ulid(ID),
                status: BookingStatus::Confirmed,
            }
        );
    }

    #[test]
    fn parse_update_booking_reschedule() {
        let sql = format!("UPDATE bookings SET date = '2024-03-09', window_id = '{OTHER}' WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::RescheduleBooking {
                id: ulid(ID),
                date: Some(date("2024-03-09")),
                window_id: Some(ulid(OTHER)),
            }
        );
    }

    #[test]
    fn status_and_reschedule_not_mixed() {
        let sql = format!("UPDATE bookings SET status = 'confirmed', date = '2024-03-09' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
        let sql = "UPDATE bookings SET status = 'confirmed'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_deletes() {
        let sql = format!("DELETE FROM bookings WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteBooking { id: ulid(ID) });
        let sql = format!("DELETE FROM windows WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteWindow { id: ulid(ID) });
        let sql = format!("DELETE FROM holidays WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteHoliday { id: ulid(ID) });
        let sql = format!("DELETE FROM resources WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!("SELECT * FROM availability WHERE resource_id = '{ID}' AND date = '2024-03-02'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability {
                resource_id: ulid(ID),
                date: date("2024-03-02"),
            }
        );
        let sql = format!("SELECT * FROM availability WHERE resource_id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("date"))));
    }

    #[test]
    fn parse_select_bookings_with_status_list() {
        let sql = format!(
            "SELECT * FROM bookings WHERE resource_id = '{ID}' AND date = '2024-03-02' AND status IN ('pending', 'confirmed')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectBookings {
                resource_id: ulid(ID),
                date: Some(date("2024-03-02")),
                statuses: Some(vec![BookingStatus::Pending, BookingStatus::Confirmed]),
            }
        );
    }

    #[test]
    fn parse_select_windows_and_lists() {
        assert_eq!(
            parse_sql("SELECT * FROM windows WHERE weekday = 'saturday'").unwrap(),
            Command::SelectWindows {
                weekday: Some(Weekday::Sat)
            }
        );
        assert_eq!(
            parse_sql("SELECT * FROM windows").unwrap(),
            Command::SelectWindows { weekday: None }
        );
        assert_eq!(parse_sql("SELECT * FROM resources").unwrap(), Command::SelectResources);
        assert_eq!(parse_sql("SELECT * FROM holidays").unwrap(), Command::SelectHolidays);
    }

    #[test]
    fn parse_select_calendar_defaults() {
        let sql = "SELECT * FROM calendar WHERE view = 'week' AND anchor = '2024-03-06'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectCalendar {
                view: CalendarView::Week,
                anchor: date("2024-03-06"),
                filter: CalendarFilter::default(),
            }
        );
    }

    #[test]
    fn parse_select_calendar_filters() {
        let sql = format!(
            "SELECT * FROM calendar WHERE view = 'month' AND anchor = '2024-03-06' AND kind NOT IN ('task') AND status IN ('cancelled') AND resource_id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::SelectCalendar { view, filter, .. } => {
                assert_eq!(view, CalendarView::Month);
                assert_eq!(filter.kinds, KindFilter::Exclude(vec![EntryKind::Task]));
                assert_eq!(filter.statuses, Some(vec![BookingStatus::Cancelled]));
                assert_eq!(filter.resource_id, Some(ulid(ID)));
            }
            other => panic!("expected SelectCalendar, got {other:?}"),
        }

        let sql = "SELECT * FROM calendar WHERE view = 'day' AND anchor = '2024-03-06' AND kind IN ('holiday', 'booking')";
        match parse_sql(sql).unwrap() {
            Command::SelectCalendar { filter, .. } => {
                assert_eq!(
                    filter.kinds,
                    KindFilter::Include(vec![EntryKind::Holiday, EntryKind::Booking])
                );
            }
            other => panic!("expected SelectCalendar, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_filters_rejected() {
        let sql = format!("SELECT * FROM bookings WHERE resource_id = '{ID}' OR date = '2024-03-02'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
        let sql = "SELECT * FROM calendar WHERE view = 'fortnight' AND anchor = '2024-03-06'";
        assert!(matches!(parse_sql(sql), Err(SqlError::InvalidValue(_))));
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
        let err = parse_sql("SELEC * FROM resources").unwrap_err();
        assert_eq!(err.sqlstate(), "42601");
        assert!(matches!(
            parse_sql(&format!("INSERT INTO foobar (id) VALUES ('{ID}')")),
            Err(SqlError::UnknownTable(_))
        ));
    }
}
