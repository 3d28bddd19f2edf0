use chrono::DateTime;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement,
    TableFactor, TableObject, UnaryOperator, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Which reservations a `SELECT ... FROM reservations` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationFilter {
    All,
    Id(Id),
    Room(Id),
    Responsible(Id),
    /// `start >= start AND "end" <= end`, both inclusive.
    Period { start: Ms, end: Ms },
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom(NewRoom),
    InsertUser(NewUser),
    InsertReservation(NewReservation),
    UpdateRoom { id: Id, patch: RoomPatch },
    UpdateUser { id: Id, patch: UserPatch },
    UpdateReservation { id: Id, patch: ReservationPatch },
    DeleteRoom { id: Id },
    DeleteUser { id: Id },
    DeleteReservation { id: Id },
    SelectRooms { id: Option<Id> },
    SelectUsers { id: Option<Id> },
    SelectReservations(ReservationFilter),
    SelectAvailability {
        room_id: Id,
        start: Ms,
        end: Ms,
        exclude_id: Option<Id>,
    },
}

const ROOM_COLUMNS: [&str; 4] = ["code", "name", "location", "capacity"];
const USER_COLUMNS: [&str; 2] = ["name", "email"];
const RESERVATION_COLUMNS: [&str; 6] = [
    "room_id",
    "responsible_id",
    "start",
    "end",
    "title",
    "description",
];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let mut stmts =
        Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("more than one statement".into()));
    }
    let Some(stmt) = stmts.pop() else {
        return Err(SqlError::Empty);
    };

    match &stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection.as_ref()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let columns: Vec<String> = insert
        .columns
        .iter()
        .map(|c| c.value.to_lowercase())
        .collect();

    match table.as_str() {
        "rooms" => {
            let row = Row::bind("rooms", &ROOM_COLUMNS, &columns, values)?;
            Ok(Command::InsertRoom(NewRoom {
                code: row.required("code", parse_text)?,
                name: row.required("name", parse_text)?,
                location: row.required("location", parse_text)?,
                capacity: row.required("capacity", parse_u32)?,
            }))
        }
        "users" => {
            let row = Row::bind("users", &USER_COLUMNS, &columns, values)?;
            Ok(Command::InsertUser(NewUser {
                name: row.required("name", parse_text)?,
                email: row.required("email", parse_text)?,
            }))
        }
        "reservations" => {
            let row = Row::bind("reservations", &RESERVATION_COLUMNS, &columns, values)?;
            Ok(Command::InsertReservation(NewReservation {
                room_id: row.required("room_id", parse_i64)?,
                responsible_id: row.required("responsible_id", parse_i64)?,
                start: row.required("start", parse_timestamp)?,
                end: row.required("end", parse_timestamp)?,
                title: row.required("title", parse_text)?,
                description: row.optional("description", parse_optional_text)?.flatten(),
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let (name, known): (&'static str, &[&'static str]) = match table.as_str() {
        "rooms" => ("rooms", &ROOM_COLUMNS[..]),
        "users" => ("users", &USER_COLUMNS[..]),
        "reservations" => ("reservations", &RESERVATION_COLUMNS[..]),
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let id = extract_where_id(selection)?;

    let mut cells = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let column = assignment_column(assignment)?;
        let column = known_column(name, known, &column)?;
        cells.push((column, &assignment.value));
    }
    let row = Row { cells };

    match name {
        "rooms" => Ok(Command::UpdateRoom {
            id,
            patch: RoomPatch {
                code: row.patch("code", parse_text)?,
                name: row.patch("name", parse_text)?,
                location: row.patch("location", parse_text)?,
                capacity: row.patch("capacity", parse_u32)?,
            },
        }),
        "users" => Ok(Command::UpdateUser {
            id,
            patch: UserPatch {
                name: row.patch("name", parse_text)?,
                email: row.patch("email", parse_text)?,
            },
        }),
        _ => Ok(Command::UpdateReservation {
            id,
            patch: ReservationPatch {
                room_id: row.patch("room_id", parse_i64)?,
                responsible_id: row.patch("responsible_id", parse_i64)?,
                start: row.patch("start", parse_timestamp)?,
                end: row.patch("end", parse_timestamp)?,
                title: row.patch("title", parse_text)?,
                description: row.patch("description", parse_optional_text)?,
            },
        }),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(delete.selection.as_ref())?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "users" => Ok(Command::DeleteUser { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut conditions = Conditions::default();
    if let Some(selection) = &select.selection {
        conditions.collect(selection)?;
    }

    let cmd = match table.as_str() {
        "rooms" => Command::SelectRooms {
            id: conditions.take("id", Op::Eq, parse_i64)?,
        },
        "users" => Command::SelectUsers {
            id: conditions.take("id", Op::Eq, parse_i64)?,
        },
        "reservations" => Command::SelectReservations(reservation_filter(&mut conditions)?),
        "availability" => Command::SelectAvailability {
            room_id: conditions.require("room_id", Op::Eq, parse_i64)?,
            start: conditions.require("start", Op::GtEq, parse_timestamp)?,
            end: conditions.require("end", Op::LtEq, parse_timestamp)?,
            exclude_id: conditions.take("exclude_id", Op::Eq, parse_i64)?,
        },
        _ => return Err(SqlError::UnknownTable(table)),
    };
    conditions.finish()?;
    Ok(cmd)
}

fn reservation_filter(conditions: &mut Conditions<'_>) -> Result<ReservationFilter, SqlError> {
    if let Some(id) = conditions.take("id", Op::Eq, parse_i64)? {
        return Ok(ReservationFilter::Id(id));
    }
    if let Some(room_id) = conditions.take("room_id", Op::Eq, parse_i64)? {
        return Ok(ReservationFilter::Room(room_id));
    }
    if let Some(user_id) = conditions.take("responsible_id", Op::Eq, parse_i64)? {
        return Ok(ReservationFilter::Responsible(user_id));
    }
    let start = conditions.take("start", Op::GtEq, parse_timestamp)?;
    let end = conditions.take("end", Op::LtEq, parse_timestamp)?;
    match (start, end) {
        (Some(start), Some(end)) => Ok(ReservationFilter::Period { start, end }),
        (None, None) => Ok(ReservationFilter::All),
        (None, Some(_)) => Err(SqlError::MissingFilter("start")),
        (Some(_), None) => Err(SqlError::MissingFilter("end")),
    }
}

// ── Rows and filters ──────────────────────────────────────────

type ParseFn<T> = fn(&'static str, &Expr) -> Result<T, SqlError>;

/// Column/value pairs from an INSERT row or an UPDATE's SET list.
struct Row<'a> {
    cells: Vec<(&'static str, &'a Expr)>,
}

impl<'a> Row<'a> {
    /// Pair values with `columns`, or with `known` in order when no column list was given.
    fn bind(
        table: &'static str,
        known: &[&'static str],
        columns: &[String],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let names: Vec<&'static str> = if columns.is_empty() {
            if values.len() > known.len() {
                return Err(SqlError::WrongArity(table, known.len(), values.len()));
            }
            known[..values.len()].to_vec()
        } else {
            if columns.len() != values.len() {
                return Err(SqlError::WrongArity(table, columns.len(), values.len()));
            }
            columns
                .iter()
                .map(|c| known_column(table, known, c))
                .collect::<Result<_, _>>()?
        };
        Ok(Self {
            cells: names.into_iter().zip(values.iter()).collect(),
        })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.cells
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, e)| *e)
    }

    fn required<T>(&self, column: &'static str, parse: ParseFn<T>) -> Result<T, SqlError> {
        let expr = self.get(column).ok_or(SqlError::MissingColumn(column))?;
        parse(column, expr)
    }

    fn optional<T>(&self, column: &'static str, parse: ParseFn<T>) -> Result<Option<T>, SqlError> {
        self.get(column).map(|e| parse(column, e)).transpose()
    }

    fn patch<T>(&self, column: &'static str, parse: ParseFn<T>) -> Result<Patch<T>, SqlError> {
        Ok(match self.optional(column, parse)? {
            Some(v) => Patch::Set(v),
            None => Patch::Keep,
        })
    }
}

fn known_column(
    table: &'static str,
    known: &[&'static str],
    column: &str,
) -> Result<&'static str, SqlError> {
    known
        .iter()
        .copied()
        .find(|k| *k == column)
        .ok_or_else(|| SqlError::UnknownColumn {
            table,
            column: column.to_string(),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    GtEq,
    LtEq,
}

/// AND-ed `column <op> value` terms of a WHERE clause. Every term must be consumed.
#[derive(Default)]
struct Conditions<'a> {
    terms: Vec<(String, Op, &'a Expr)>,
}

impl<'a> Conditions<'a> {
    fn collect(&mut self, expr: &'a Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.collect(left)?;
                self.collect(right)
            }
            Expr::BinaryOp { left, op, right } => {
                let op = match op {
                    BinaryOperator::Eq => Op::Eq,
                    BinaryOperator::GtEq => Op::GtEq,
                    BinaryOperator::LtEq => Op::LtEq,
                    other => return Err(SqlError::Unsupported(format!("operator {other}"))),
                };
                let column = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                self.terms.push((column, op, &**right));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("filter {other}"))),
        }
    }

    fn take<T>(
        &mut self,
        column: &'static str,
        op: Op,
        parse: ParseFn<T>,
    ) -> Result<Option<T>, SqlError> {
        let Some(pos) = self
            .terms
            .iter()
            .position(|(c, o, _)| c == column && *o == op)
        else {
            return Ok(None);
        };
        let (_, _, expr) = self.terms.remove(pos);
        parse(column, expr).map(Some)
    }

    fn require<T>(&mut self, column: &'static str, op: Op, parse: ParseFn<T>) -> Result<T, SqlError> {
        self.take(column, op, parse)?
            .ok_or(SqlError::MissingFilter(column))
    }

    fn finish(self) -> Result<(), SqlError> {
        match self.terms.first() {
            Some((column, _, _)) => Err(SqlError::Unsupported(format!("filter on {column}"))),
            None => Ok(()),
        }
    }
}

fn extract_where_id(selection: Option<&Expr>) -> Result<Id, SqlError> {
    let selection = selection.ok_or(SqlError::MissingFilter("id"))?;
    let mut conditions = Conditions::default();
    conditions.collect(selection)?;
    let id = conditions.require("id", Op::Eq, parse_i64)?;
    conditions.finish()?;
    Ok(id)
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
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn assignment_column(assignment: &ast::Assignment) -> Result<String, SqlError> {
    match &assignment.target {
        AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        AssignmentTarget::Tuple(_) => Err(SqlError::Unsupported("tuple assignment".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
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

fn bad_value(column: &'static str, reason: impl ToString) -> SqlError {
    SqlError::BadValue {
        column,
        reason: reason.to_string(),
    }
}

fn parse_i64(column: &'static str, expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: UnaryOperator::Minus,
        expr,
    } = expr
    {
        return parse_i64(column, expr).map(|v| -v);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _)) | Some(Value::SingleQuotedString(s)) => {
            s.parse().map_err(|e| bad_value(column, e))
        }
        _ => Err(bad_value(column, format!("expected integer, got {expr}"))),
    }
}

fn parse_u32(column: &'static str, expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(column, expr)?;
    u32::try_from(v).map_err(|_| bad_value(column, format!("{v} out of range")))
}

/// Integer milliseconds, or an RFC 3339 string.
fn parse_timestamp(column: &'static str, expr: &Expr) -> Result<Ms, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr)
        && s.parse::<i64>().is_err()
    {
        return DateTime::parse_from_rfc3339(s)
            .map(|t| t.timestamp_millis())
            .map_err(|e| bad_value(column, format!("bad timestamp {s:?}: {e}")));
    }
    parse_i64(column, expr)
}

fn parse_text(column: &'static str, expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Null) => Err(bad_value(column, "must not be NULL")),
        _ => Err(bad_value(column, format!("expected string, got {expr}"))),
    }
}

fn parse_optional_text(column: &'static str, expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_text(column, expr).map(Some),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("unknown column {column} in {table}")]
    UnknownColumn { table: &'static str, column: String },
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing value for column: {0}")]
    MissingColumn(&'static str),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
    #[error("bad value for {column}: {reason}")]
    BadValue {
        column: &'static str,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_insert_room() {
        let sql = "INSERT INTO rooms (code, name, location, capacity) VALUES ('A101', 'Auditorium', 'Block A', 120)";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertRoom(NewRoom {
                code: "A101".into(),
                name: "Auditorium".into(),
                location: "Block A".into(),
                capacity: 120,
            })
        );
    }

    #[test]
    fn parse_insert_user_positional() {
        let sql = "INSERT INTO users VALUES ('Ana Souza', 'ana@uni.edu')";
        match parse_sql(sql).unwrap() {
            Command::InsertUser(user) => {
                assert_eq!(user.name, "Ana Souza");
                assert_eq!(user.email, "ana@uni.edu");
            }
            cmd => panic!("expected InsertUser, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_with_rfc3339() {
        let sql = r#"INSERT INTO reservations (room_id, responsible_id, start, "end", title) VALUES (1, 2, '2025-10-20T09:00:00Z', '2025-10-20T10:00:00Z', 'Standup')"#;
        match parse_sql(sql).unwrap() {
            Command::InsertReservation(r) => {
                assert_eq!(r.room_id, 1);
                assert_eq!(r.responsible_id, 2);
                assert_eq!(r.start, 1_760_950_800_000);
                assert_eq!(r.end - r.start, 3_600_000);
                assert_eq!(r.title, "Standup");
                assert_eq!(r.description, None);
            }
            cmd => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_columns_in_any_order() {
        let sql = r#"INSERT INTO reservations (title, "end", start, responsible_id, room_id, description) VALUES ('Review', 2000, 1000, 3, 4, 'Q3 numbers')"#;
        match parse_sql(sql).unwrap() {
            Command::InsertReservation(r) => {
                assert_eq!((r.room_id, r.responsible_id, r.start, r.end), (4, 3, 1000, 2000));
                assert_eq!(r.description.as_deref(), Some("Q3 numbers"));
            }
            cmd => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_missing_column_errors() {
        let sql = r#"INSERT INTO reservations (room_id, responsible_id, start) VALUES (1, 2, 3)"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingColumn("end"))));
    }

    #[test]
    fn parse_insert_unknown_column_errors() {
        let sql = "INSERT INTO users (name, phone) VALUES ('Ana', '555')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn { .. })));
    }

    #[test]
    fn parse_insert_wrong_arity() {
        let sql = "INSERT INTO users (name, email) VALUES ('Ana')";
        assert!(matches!(parse_sql(sql), Err(SqlError::WrongArity("users", 2, 1))));
    }

    #[test]
    fn parse_update_reservation_partial() {
        let sql = "UPDATE reservations SET title = 'Retro', description = NULL WHERE id = 7";
        match parse_sql(sql).unwrap() {
            Command::UpdateReservation { id, patch } => {
                assert_eq!(id, 7);
                assert_eq!(patch.title, Patch::Set("Retro".into()));
                assert_eq!(patch.description, Patch::Set(None));
                assert_eq!(patch.start, Patch::Keep);
                assert_eq!(patch.room_id, Patch::Keep);
            }
            cmd => panic!("expected UpdateReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_title_null_rejected() {
        let sql = "UPDATE reservations SET title = NULL WHERE id = 7";
        assert!(matches!(parse_sql(sql), Err(SqlError::BadValue { column: "title", .. })));
    }

    #[test]
    fn parse_update_room_capacity() {
        let sql = "UPDATE rooms SET capacity = 40 WHERE id = 3";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpdateRoom {
                id: 3,
                patch: RoomPatch {
                    capacity: Patch::Set(40),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn parse_update_requires_id_filter() {
        assert!(matches!(
            parse_sql("UPDATE users SET name = 'x'"),
            Err(SqlError::MissingFilter("id"))
        ));
        assert!(parse_sql("UPDATE users SET name = 'x' WHERE email = 'a@b.c'").is_err());
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql("DELETE FROM reservations WHERE id = 12").unwrap(),
            Command::DeleteReservation { id: 12 }
        );
        assert_eq!(
            parse_sql("DELETE FROM rooms WHERE id = 1").unwrap(),
            Command::DeleteRoom { id: 1 }
        );
        assert_eq!(
            parse_sql("DELETE FROM users WHERE id = 2").unwrap(),
            Command::DeleteUser { id: 2 }
        );
    }

    #[test]
    fn parse_select_filters() {
        let cases = [
            ("SELECT * FROM reservations", ReservationFilter::All),
            ("SELECT * FROM reservations WHERE id = 4", ReservationFilter::Id(4)),
            ("SELECT * FROM reservations WHERE room_id = 2", ReservationFilter::Room(2)),
            (
                "SELECT * FROM reservations WHERE responsible_id = 9",
                ReservationFilter::Responsible(9),
            ),
            (
                r#"SELECT * FROM reservations WHERE start >= 100 AND "end" <= 200"#,
                ReservationFilter::Period { start: 100, end: 200 },
            ),
        ];
        for (sql, expected) in cases {
            assert_eq!(
                parse_sql(sql).unwrap(),
                Command::SelectReservations(expected),
                "{sql}"
            );
        }
    }

    #[test]
    fn parse_select_half_period_errors() {
        let sql = "SELECT * FROM reservations WHERE start >= 100";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("end"))));
    }

    #[test]
    fn parse_select_unconsumed_filter_errors() {
        let sql = "SELECT * FROM reservations WHERE room_id = 1 AND title = 'x'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_select_rooms_and_users() {
        assert_eq!(
            parse_sql("SELECT * FROM rooms").unwrap(),
            Command::SelectRooms { id: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM users WHERE id = 5").unwrap(),
            Command::SelectUsers { id: Some(5) }
        );
    }

    #[test]
    fn parse_select_availability() {
        let sql = r#"SELECT * FROM availability WHERE room_id = 1 AND start >= '2025-10-20T10:00:00Z' AND "end" <= '2025-10-20T11:00:00Z' AND exclude_id = 3"#;
        match parse_sql(sql).unwrap() {
            Command::SelectAvailability {
                room_id,
                start,
                end,
                exclude_id,
            } => {
                assert_eq!(room_id, 1);
                assert_eq!(end - start, 3_600_000);
                assert_eq!(exclude_id, Some(3));
            }
            cmd => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_requires_room() {
        let sql = r#"SELECT * FROM availability WHERE start >= 1 AND "end" <= 2"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("room_id"))));
    }

    #[test]
    fn parse_negative_and_bad_timestamps() {
        let sql = r#"SELECT * FROM reservations WHERE start >= -5 AND "end" <= 10"#;
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectReservations(ReservationFilter::Period { start: -5, end: 10 })
        );
        let sql = r#"SELECT * FROM reservations WHERE start >= 'yesterday' AND "end" <= 10"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::BadValue { column: "start", .. })));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM bookings"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_multiple_statements_rejected() {
        assert!(matches!(
            parse_sql("DELETE FROM rooms WHERE id = 1; DELETE FROM rooms WHERE id = 2"),
            Err(SqlError::Unsupported(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
