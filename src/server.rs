//! Database server: the SQL pipeline behind a line-delimited TCP protocol.
//!
//! A request is SQL text terminated by a blank line (`\n\n`); the response is
//! a single text block with the same terminator. Every failure comes back as
//! one line starting with `ERROR: ` and the connection stays open for the
//! next request. The accept loop spawns one detached worker thread per
//! connection; workers share the catalog and table manager.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::DbResult;
use crate::exec::executor::{QueryExecutor, QueryOutput};
use crate::exec::planner::Planner;
use crate::sql::compiler::Compiler;
use crate::sql::optimizer::Optimizer;
use crate::sql::parser::SqlParser;
use crate::storage::catalog::Catalog;
use crate::storage::table::TableManager;

pub struct DatabaseServer {
    catalog: Arc<Catalog>,
    table_manager: Arc<TableManager>,
    executor: QueryExecutor,
}

impl DatabaseServer {
    /// Initializes the catalog under `data_dir` and wires up the pipeline.
    pub fn new(data_dir: impl AsRef<Path>) -> DbResult<Self> {
        let catalog = Arc::new(Catalog::new(data_dir));
        catalog.initialize()?;
        let table_manager = Arc::new(TableManager::new(Arc::clone(&catalog)));
        let executor = QueryExecutor::new(Arc::clone(&catalog), Arc::clone(&table_manager));
        info!("database initialized ({} tables)", catalog.list_tables().len());
        Ok(Self {
            catalog,
            table_manager,
            executor,
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Runs one SQL statement through the full pipeline and renders the
    /// response text: the result block, a status string, or `ERROR: ...`.
    pub fn process_sql(&self, sql: &str) -> String {
        let sql = sql.trim();
        if sql.is_empty() {
            return "ERROR: Empty SQL statement".to_string();
        }
        match self.run_pipeline(sql) {
            Ok(output) => {
                if output.text.is_empty() {
                    "OK".to_string()
                } else {
                    output.text
                }
            }
            Err(e) => format!("ERROR: {}", e),
        }
    }

    fn run_pipeline(&self, sql: &str) -> DbResult<QueryOutput> {
        let ast = SqlParser::new(sql)?.parse()?;
        let stmt = Compiler::new(&self.catalog).compile(&ast)?;
        let stmt = match Optimizer::new().optimize(&stmt)? {
            Some(optimized) => optimized,
            None => stmt,
        };
        let plan = Planner::new(&self.table_manager).create_plan(stmt)?;
        self.executor.execute(plan)
    }

    /// Accept loop. Runs until the listener fails; each connection gets a
    /// detached worker thread.
    pub fn serve(self: Arc<Self>, listener: TcpListener) -> DbResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("listening on {}", addr);
        }
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let server = Arc::clone(&self);
                    std::thread::spawn(move || {
                        if let Err(e) = server.handle_connection(stream) {
                            warn!("connection worker terminated: {}", e);
                        }
                    });
                }
                Err(e) => warn!("accept failed: {}", e),
            }
        }
        Ok(())
    }

    /// Serves one connection until the client disconnects.
    fn handle_connection(&self, stream: TcpStream) -> DbResult<()> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        debug!("client connected: {}", peer);

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        while let Some(request) = read_request(&mut reader)? {
            // A panicking statement must not take the connection down
            // silently; answer it like any other internal failure.
            let response =
                std::panic::catch_unwind(AssertUnwindSafe(|| self.process_sql(&request)))
                    .unwrap_or_else(|_| {
                        error!("panic while processing request from {}", peer);
                        "ERROR: Internal error: statement execution panicked".to_string()
                    });
            // The terminator is the only blank line in the frame, so the
            // block itself must not end with newlines.
            writer.write_all(response.trim_end_matches('\n').as_bytes())?;
            writer.write_all(b"\n\n")?;
            writer.flush()?;
        }

        debug!("client disconnected: {}", peer);
        Ok(())
    }
}

/// Reads one `\n\n`-terminated request. `None` means the client closed the
/// connection without sending another request.
fn read_request(reader: &mut impl BufRead) -> DbResult<Option<String>> {
    let mut request = String::new();
    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            // EOF: hand back a trailing partial request if there is one.
            if request.trim().is_empty() {
                return Ok(None);
            }
            return Ok(Some(request));
        }
        if line.trim().is_empty() {
            return Ok(Some(request));
        }
        request.push_str(&line);
    }
}
