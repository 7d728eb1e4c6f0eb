use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::debug;

use crate::access::{Actor, RoleDirectory};
use crate::auth::SlotbookAuthSource;
use crate::engine::{Engine, EngineError, NewBooking};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct SlotbookHandler {
    tenant_manager: Arc<TenantManager>,
    roles: Arc<RoleDirectory>,
    query_parser: Arc<SlotbookQueryParser>,
}

impl SlotbookHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, roles: Arc<RoleDirectory>) -> Self {
        Self {
            tenant_manager,
            roles,
            query_parser: Arc::new(SlotbookQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("dealership error: {e}"),
            )))
        })
    }

    fn resolve_actor<C: ClientInfo>(&self, client: &C) -> Actor {
        let user = client.metadata().get("user").map(String::as_str).unwrap_or_default();
        self.roles.actor(user)
    }

    /// Parse, execute and record one statement.
    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Vec<Response>> {
        let engine = self.resolve_engine(client)?;
        let actor = self.resolve_actor(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;

        let label = observability::command_label(&cmd);
        debug!("{} runs {label}", actor.id);
        let started = Instant::now();
        let result = self.execute_command(&engine, &actor, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, engine: &Engine, actor: &Actor, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertResource { id, kind, name } => {
                engine.register_resource(id, kind, name, actor).await.map_err(engine_err)?;
                Ok(vec![inserted()])
            }
            Command::InsertWindow {
                id,
                weekday,
                start,
                end,
                capacity,
            } => {
                let window = TimeWindow::new(id, weekday, start, end, capacity);
                engine.add_window(window, actor).await.map_err(engine_err)?;
                Ok(vec![inserted()])
            }
            Command::UpdateWindow {
                id,
                start,
                end,
                capacity,
            } => {
                engine
                    .update_window(id, start, end, capacity, actor)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![updated()])
            }
            Command::DeleteWindow { id } => {
                engine.retire_window(id, actor).await.map_err(engine_err)?;
                Ok(vec![deleted()])
            }
            Command::InsertHoliday { id, start, end, label } => {
                engine
                    .add_holiday(Holiday { id, start, end, label }, actor)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![inserted()])
            }
            Command::DeleteHoliday { id } => {
                engine.remove_holiday(id, actor).await.map_err(engine_err)?;
                Ok(vec![deleted()])
            }
            Command::InsertBooking {
                id,
                resource_id,
                date,
                window_id,
                note,
            } => {
                let req = NewBooking {
                    id,
                    resource_id,
                    date,
                    window_id,
                    note,
                };
                engine.create_booking(req, actor).await.map_err(engine_err)?;
                Ok(vec![inserted()])
            }
            Command::UpdateBookingStatus { id, status } => {
                engine
                    .update_booking_status(id, status, actor)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![updated()])
            }
            Command::RescheduleBooking { id, date, window_id } => {
                engine
                    .reschedule_booking(id, date, window_id, actor)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![updated()])
            }
            Command::DeleteBooking { id } => {
                engine.cancel_booking(id, actor).await.map_err(engine_err)?;
                Ok(vec![deleted()])
            }
            Command::SelectResources => {
                let resources = engine.list_resources().await;
                rows(resources_schema(), resources, |enc, r| {
                    enc.encode_field(&r.id.to_string())?;
                    enc.encode_field(&r.kind.as_str())?;
                    enc.encode_field(&r.name)
                })
            }
            Command::SelectWindows { weekday } => {
                let windows = engine.list_windows(weekday).await;
                rows(windows_schema(), windows, |enc, w| {
                    enc.encode_field(&w.id.to_string())?;
                    enc.encode_field(&w.weekday.to_string())?;
                    enc.encode_field(&w.start.format("%H:%M").to_string())?;
                    enc.encode_field(&w.end.format("%H:%M").to_string())?;
                    enc.encode_field(&i64::from(w.capacity))?;
                    enc.encode_field(&w.retired)
                })
            }
            Command::SelectHolidays => {
                let holidays = engine.list_holidays().await;
                rows(holidays_schema(), holidays, |enc, h| {
                    enc.encode_field(&h.id.to_string())?;
                    enc.encode_field(&h.start.to_string())?;
                    enc.encode_field(&h.end.to_string())?;
                    enc.encode_field(&h.label)
                })
            }
            Command::SelectBookings {
                resource_id,
                date,
                statuses,
            } => {
                let bookings = engine
                    .list_bookings(resource_id, date, statuses.as_deref())
                    .await
                    .map_err(engine_err)?;
                rows(bookings_schema(), bookings, |enc, b| {
                    enc.encode_field(&b.id.to_string())?;
                    enc.encode_field(&b.resource_id.to_string())?;
                    enc.encode_field(&b.date.to_string())?;
                    enc.encode_field(&b.window_id.to_string())?;
                    enc.encode_field(&b.status.as_str())?;
                    enc.encode_field(&b.note)?;
                    enc.encode_field(&b.created_by)?;
                    enc.encode_field(&b.created_at)?;
                    enc.encode_field(&b.updated_at)
                })
            }
            Command::SelectAvailability { resource_id, date } => {
                let slots = engine.get_availability(resource_id, date).await.map_err(engine_err)?;
                let rid = resource_id.to_string();
                let day = date.to_string();
                rows(availability_schema(), slots, |enc, slot| {
                    enc.encode_field(&rid)?;
                    enc.encode_field(&slot.window.id.to_string())?;
                    enc.encode_field(&day)?;
                    enc.encode_field(&slot.window.start.format("%H:%M").to_string())?;
                    enc.encode_field(&slot.window.end.format("%H:%M").to_string())?;
                    enc.encode_field(&i64::from(slot.window.capacity))?;
                    enc.encode_field(&i64::from(slot.remaining))?;
                    enc.encode_field(&slot.is_full())
                })
            }
            Command::SelectCalendar { view, anchor, filter } => {
                let entries = engine.get_calendar(view, anchor, &filter).await.map_err(engine_err)?;
                rows(calendar_schema(), entries, |enc, e| {
                    enc.encode_field(&e.id.to_string())?;
                    enc.encode_field(&e.kind.as_str())?;
                    enc.encode_field(&e.start.format("%Y-%m-%d %H:%M").to_string())?;
                    enc.encode_field(&e.end.format("%Y-%m-%d %H:%M").to_string())?;
                    enc.encode_field(&e.title)?;
                    enc.encode_field(&e.resource_id.map(|r| r.to_string()))?;
                    enc.encode_field(&e.status.map(|s| s.as_str()))
                })
            }
        }
    }
}

fn inserted() -> Response {
    Response::Execution(Tag::new("INSERT").with_rows(1))
}

fn updated() -> Response {
    Response::Execution(Tag::new("UPDATE").with_rows(1))
}

fn deleted() -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(1))
}

/// Encode `items` as one query response with `schema`.
fn rows<T, F>(schema: Vec<FieldInfo>, items: Vec<T>, encode: F) -> PgWireResult<Vec<Response>>
where
    F: Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
{
    let schema = Arc::new(schema);
    let data: Vec<PgWireResult<DataRow>> = items
        .iter()
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(vec![Response::Query(QueryResponse::new(schema, stream::iter(data)))])
}

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn resources_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("kind", Type::VARCHAR),
        field("name", Type::VARCHAR),
    ]
}

fn windows_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("weekday", Type::VARCHAR),
        field("start", Type::VARCHAR),
        field("end", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("retired", Type::BOOL),
    ]
}

fn holidays_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("start_date", Type::VARCHAR),
        field("end_date", Type::VARCHAR),
        field("label", Type::VARCHAR),
    ]
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("resource_id", Type::VARCHAR),
        field("date", Type::VARCHAR),
        field("window_id", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("note", Type::VARCHAR),
        field("created_by", Type::VARCHAR),
        field("created_at", Type::INT8),
        field("updated_at", Type::INT8),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::VARCHAR),
        field("window_id", Type::VARCHAR),
        field("date", Type::VARCHAR),
        field("start", Type::VARCHAR),
        field("end", Type::VARCHAR),
        field("capacity", Type::INT8),
        field("remaining", Type::INT8),
        field("full", Type::BOOL),
    ]
}

fn calendar_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("kind", Type::VARCHAR),
        field("start", Type::VARCHAR),
        field("end", Type::VARCHAR),
        field("title", Type::VARCHAR),
        field("resource_id", Type::VARCHAR),
        field("status", Type::VARCHAR),
    ]
}

/// Row description for a statement that may still hold `$N` placeholders.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return vec![];
    }
    let from = lower.split("from").nth(1).unwrap_or_default();
    match from.split_whitespace().next().unwrap_or_default() {
        "resources" => resources_schema(),
        "windows" => windows_schema(),
        "holidays" => holidays_schema(),
        "bookings" => bookings_schema(),
        "availability" => availability_schema(),
        "calendar" => calendar_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotbookHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.run(client, query).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotbookQueryParser;

#[async_trait]
impl QueryParser for SlotbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotbookHandler {
    type Statement = String;
    type QueryParser = SlotbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        let mut responses = self.run(client, &sql).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Replace `$1`, `$2`, ... with the bound text values, quoted.
/// Highest index first, so `$1` never eats the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotbookFactory {
    handler: Arc<SlotbookHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<SlotbookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SlotbookFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, roles: Arc<RoleDirectory>, password: String) -> Self {
        Self {
            handler: Arc::new(SlotbookHandler::new(tenant_manager, roles)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                SlotbookAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    roles: Arc<RoleDirectory>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = SlotbookFactory::new(tenant_manager, roles, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.kind().sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}
