use std::fmt::Debug;
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
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CadastreAuthSource;
use crate::engine::Engine;
use crate::model::*;
use crate::observability;
use crate::registry::RegistryManager;
use crate::sql::{self, Command};

pub struct CadastreHandler {
    registries: Arc<RegistryManager>,
    query_parser: Arc<CadastreQueryParser>,
}

impl CadastreHandler {
    pub fn new(registries: Arc<RegistryManager>) -> Self {
        Self {
            registries,
            query_parser: Arc::new(CadastreQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.registries.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("registry error: {e}"),
            )))
        })
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.dispatch(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }

    async fn dispatch(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::SetUnitPrice { price } => {
                engine.set_price(price).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertProperty { id, capacity } => {
                engine
                    .create_property(id, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ListForSale { id } => {
                engine.list_for_sale(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::ListForRent { id } => {
                engine.list_for_rent(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RequestAllocation { size, to_rent } => {
                let allocated = engine
                    .request_property(size, to_rent)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(allocation_schema());
                let rows: Vec<PgWireResult<_>> = allocated
                    .into_iter()
                    .map(|(property_id, price)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&property_id)?;
                        encoder.encode_field(&price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectOwner { property_id } => {
                let owner_id = engine.owner_of(property_id).await.map_err(engine_err)?;

                let schema = Arc::new(owner_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&property_id)?;
                encoder.encode_field(&owner_id)?;
                let rows = vec![Ok(encoder.take_row())];

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectPrices { size } => {
                let entries = engine.list_prices(size).await.map_err(engine_err)?;

                let schema = Arc::new(prices_schema());
                let rows: Vec<PgWireResult<_>> = entries
                    .into_iter()
                    .map(|(capacity, price)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(capacity as i64))?;
                        encoder.encode_field(&price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectProperties { page, filter } => {
                let properties = engine
                    .query_properties(page, filter)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(properties_schema());
                let rows: Vec<PgWireResult<_>> = properties
                    .into_iter()
                    .map(|p| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&p.id)?;
                        encoder.encode_field(&p.owner_id)?;
                        encoder.encode_field(&(p.capacity as i64))?;
                        encoder.encode_field(&p.for_sale)?;
                        encoder.encode_field(&p.for_rent)?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSaleContracts { page, filter } => {
                let contracts = engine
                    .sale_contracts(page, filter)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(sale_contracts_schema());
                let rows: Vec<PgWireResult<_>> = contracts
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.id)?;
                        encoder.encode_field(&c.property_id)?;
                        encoder.encode_field(&c.seller_id)?;
                        encoder.encode_field(&c.buyer_id)?;
                        encoder.encode_field(&(c.capacity as i64))?;
                        encoder.encode_field(&c.price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectRentalContracts { page, filter } => {
                let contracts = engine
                    .rental_contracts(page, filter)
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(rental_contracts_schema());
                let rows: Vec<PgWireResult<_>> = contracts
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.id)?;
                        encoder.encode_field(&c.property_id)?;
                        encoder.encode_field(&c.landlord_id)?;
                        encoder.encode_field(&c.tenant_id)?;
                        encoder.encode_field(&(c.capacity as i64))?;
                        encoder.encode_field(&c.price.to_string())?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::InsertTransfer {
                property_id,
                seller_id,
                buyer_id,
                price,
                approval,
            } => {
                let recorded = engine
                    .approve_transfer(property_id, seller_id, buyer_id, price, approval)
                    .await
                    .map_err(engine_err)?;
                let rows = if recorded.is_some() { 1 } else { 0 };
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(rows))])
            }
            Command::InsertLease {
                property_id,
                tenant_id,
                price,
            } => {
                engine
                    .sign_lease(property_id, tenant_id, price)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::Listen { channel } => {
                let property_id_str = channel.strip_prefix("property_").ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected property_{{id}})"),
                    )))
                })?;
                let _property_id: PropertyId = property_id_str.parse().map_err(|e| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("bad property id in channel: {e}"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
        }
    }
}

// ── Row schemas ──────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn allocation_schema() -> Vec<FieldInfo> {
    vec![
        text_field("property_id", Type::INT8),
        text_field("price", Type::NUMERIC),
    ]
}

fn owner_schema() -> Vec<FieldInfo> {
    vec![
        text_field("property_id", Type::INT8),
        text_field("owner_id", Type::INT8),
    ]
}

fn prices_schema() -> Vec<FieldInfo> {
    vec![
        text_field("capacity", Type::INT8),
        text_field("unit_price", Type::NUMERIC),
    ]
}

fn properties_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::INT8),
        text_field("owner_id", Type::INT8),
        text_field("capacity", Type::INT8),
        text_field("for_sale", Type::BOOL),
        text_field("for_rent", Type::BOOL),
    ]
}

fn sale_contracts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::INT8),
        text_field("property_id", Type::INT8),
        text_field("seller_id", Type::INT8),
        text_field("buyer_id", Type::INT8),
        text_field("capacity", Type::INT8),
        text_field("price", Type::NUMERIC),
    ]
}

fn rental_contracts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::INT8),
        text_field("property_id", Type::INT8),
        text_field("landlord_id", Type::INT8),
        text_field("tenant_id", Type::INT8),
        text_field("capacity", Type::INT8),
        text_field("price", Type::NUMERIC),
    ]
}

/// Schema for a statement that returns rows, if it is one we recognize.
fn schema_for_statement(sql: &str) -> Option<Vec<FieldInfo>> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return None;
    }
    if upper.contains("ALLOCATION") {
        Some(allocation_schema())
    } else if upper.contains("SALE_CONTRACTS") {
        Some(sale_contracts_schema())
    } else if upper.contains("RENTAL_CONTRACTS") {
        Some(rental_contracts_schema())
    } else if upper.contains("PROPERTIES") {
        // Before OWNER: a properties query may filter on owner_id
        Some(properties_schema())
    } else if upper.contains("OWNER") {
        Some(owner_schema())
    } else if upper.contains("PRICES") {
        Some(prices_schema())
    } else {
        None
    }
}

#[async_trait]
impl SimpleQueryHandler for CadastreHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CadastreQueryParser;

#[async_trait]
impl QueryParser for CadastreQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt).unwrap_or_default())
    }
}

#[async_trait]
impl ExtendedQueryHandler for CadastreHandler {
    type Statement = String;
    type QueryParser = CadastreQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
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
        let schema = schema_for_statement(&target.statement).unwrap_or_default();
        Ok(DescribeStatementResponse::new(param_types, schema))
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
        let schema = schema_for_statement(&target.statement.statement).unwrap_or_default();
        Ok(DescribePortalResponse::new(schema))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
                && n > max
            {
                max = n;
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text
/// format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CadastreFactory {
    handler: Arc<CadastreHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CadastreAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CadastreFactory {
    pub fn new(registries: Arc<RegistryManager>, password: String) -> Self {
        let auth_source = CadastreAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CadastreHandler::new(registries)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CadastreFactory {
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

/// Serve one accepted TCP connection until the client disconnects.
pub async fn process_connection(
    socket: TcpStream,
    registries: Arc<RegistryManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = CadastreFactory::new(registries, password);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: crate::engine::EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
