//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all database tools
//! exposed via the MCP protocol using the rmcp framework's macros.
//! Read tools and write tools live in separate routers so that read-only
//! mode can register the read router alone.

use crate::db::ConnectionManager;
use crate::tools::ddl::{
    CreateIndexInput, CreateTableInput, DdlOutput, DdlToolHandler, DropTableInput,
};
use crate::tools::read::{ReadDataInput, ReadDataOutput, ReadDataToolHandler};
use crate::tools::schema::{
    DescribeTableInput, DescribeTableOutput, ListTableInput, ListTableOutput, SchemaToolHandler,
};
use crate::tools::write::{
    InsertDataInput, InsertDataOutput, UpdateDataInput, UpdateDataOutput, WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct DbService {
    /// Shared connection manager for all database operations
    connection_manager: Arc<ConnectionManager>,
    /// Whether only the read tools are registered
    readonly: bool,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    /// Create a new DbService instance.
    ///
    /// # Arguments
    ///
    /// * `connection_manager` - Shared connection manager for database operations
    /// * `readonly` - Register only `list_table`, `read_data` and `describe_table`
    pub fn new(connection_manager: Arc<ConnectionManager>, readonly: bool) -> Self {
        let tool_router = if readonly {
            Self::read_router()
        } else {
            Self::read_router() + Self::write_router()
        };
        info!(
            readonly = readonly,
            tools = tool_router.list_all().len(),
            "Registered MCP tools"
        );
        Self {
            connection_manager,
            readonly,
            tool_router,
        }
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Names of the registered tools.
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect()
    }
}

#[tool_router(router = read_router)]
impl DbService {
    #[tool(
        description = "Lists tables in an MSSQL Database, or list tables in specific schemas"
    )]
    async fn list_table(
        &self,
        Parameters(input): Parameters<ListTableInput>,
    ) -> Result<Json<ListTableOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.connection_manager.clone());
        handler
            .list_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Executes a SELECT query on an MSSQL Database table. The query must start with SELECT and cannot contain any destructive SQL operations for security reasons."
    )]
    async fn read_data(
        &self,
        Parameters(input): Parameters<ReadDataInput>,
    ) -> Result<Json<ReadDataOutput>, McpError> {
        let handler = ReadDataToolHandler::new(self.connection_manager.clone());
        handler
            .read_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describes the schema (columns and types) of a specified MSSQL Database table."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        let handler = SchemaToolHandler::new(self.connection_manager.clone());
        handler
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_router(router = write_router)]
impl DbService {
    #[tool(
        description = "Inserts data into an MSSQL Database table. Accepts a single record object or an array of records with identical columns."
    )]
    async fn insert_data(
        &self,
        Parameters(input): Parameters<InsertDataInput>,
    ) -> Result<Json<InsertDataOutput>, McpError> {
        let handler = WriteToolHandler::new(self.connection_manager.clone());
        handler
            .insert_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Updates data in an MSSQL Database table. A WHERE clause is required to prevent accidental updates of every row."
    )]
    async fn update_data(
        &self,
        Parameters(input): Parameters<UpdateDataInput>,
    ) -> Result<Json<UpdateDataOutput>, McpError> {
        let handler = WriteToolHandler::new(self.connection_manager.clone());
        handler
            .update_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Creates a new table in the MSSQL Database with the specified columns.")]
    async fn create_table(
        &self,
        Parameters(input): Parameters<CreateTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let handler = DdlToolHandler::new(self.connection_manager.clone());
        handler
            .create_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Creates an index on a specified column or columns in an MSSQL Database table"
    )]
    async fn create_index(
        &self,
        Parameters(input): Parameters<CreateIndexInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let handler = DdlToolHandler::new(self.connection_manager.clone());
        handler
            .create_index(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Drops a table from the MSSQL Database.")]
    async fn drop_table(
        &self,
        Parameters(input): Parameters<DropTableInput>,
    ) -> Result<Json<DdlOutput>, McpError> {
        let handler = DdlToolHandler::new(self.connection_manager.clone());
        handler
            .drop_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mssql-mcp-server".to_owned(),
                title: Some("MSSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for querying and managing a Microsoft SQL Server database.\n\
                \n\
                ## Workflow\n\
                1. Call `list_table` to discover tables\n\
                2. Call `describe_table` to see column names and types\n\
                3. Use `read_data` with a single SELECT statement\n\
                \n\
                ## Databases\n\
                Every tool accepts an optional `databaseName`. Omit it to use the default \
                database; other names must be on the server's allow-list.\n\
                \n\
                ## read_data restrictions\n\
                Only one plain SELECT per call. Comments, multiple statements, SELECT INTO, \
                stored procedures, system functions and character conversion functions \
                are rejected."
                    .to_string(),
            ),
        }
    }
}
