//! Prepared statements.
//!
//! A statement is prepared by wrapping the query in a `create proc`; the
//! server compiles it once and later executions only carry the statement
//! id and its parameters. The server acknowledges every dynamic
//! operation with a DYNAMIC package carrying the ack bit.

use std::sync::Arc;

use ase_types::Value;
use tds5_protocol::field::FieldFmt;
use tds5_protocol::packages::{
    DataPackage, DoneStatus, DynamicOperation, DynamicPackage, DynamicStatus, EedPackage, Package,
    ParamFmtPackage,
};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::rows::{ExecResult, Rows, check_return_status};

/// A prepared statement.
#[derive(Debug)]
pub struct Statement {
    name: String,
    param_formats: Option<Arc<Vec<FieldFmt>>>,
    row_formats: Option<Arc<Vec<FieldFmt>>>,
}

impl Statement {
    /// The statement id used on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Formats of the statement's parameters, when the server described
    /// them at prepare time.
    #[must_use]
    pub fn param_formats(&self) -> Option<&Arc<Vec<FieldFmt>>> {
        self.param_formats.as_ref()
    }

    /// Formats of the statement's result columns, when the server
    /// described them at prepare time.
    #[must_use]
    pub fn row_formats(&self) -> Option<&Arc<Vec<FieldFmt>>> {
        self.row_formats.as_ref()
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Prepare a statement for repeated execution.
    ///
    /// Parameter markers use the `?` placeholder syntax.
    ///
    /// # Errors
    ///
    /// Returns a server error if the statement does not compile, or a
    /// transport error.
    pub async fn prepare(&mut self, query: &str) -> Result<Statement> {
        self.next_stmt_id += 1;
        let name = format!("stmt{}", self.next_stmt_id);

        let prepare = DynamicPackage::new(
            DynamicOperation::PREPARE,
            name.clone(),
            format!("create proc {name} as {query}"),
        );
        self.channel
            .send_package(&Package::Dynamic(prepare))
            .await?;
        self.recv_dynamic_ack().await?;

        let mut param_formats = None;
        let mut row_formats = None;
        let mut eeds: Vec<EedPackage> = Vec::new();
        loop {
            match self.channel.next_package().await? {
                Package::ParamFmt(fmt) => param_formats = Some(fmt.fields),
                Package::RowFmt(fmt) => row_formats = Some(fmt.fields),
                Package::Eed(eed) => eeds.push(eed),
                Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
                    if done.status.contains(DoneStatus::ERROR) {
                        eeds.extend(self.channel.take_eeds());
                        return Err(self.fail_response(eeds).await);
                    }
                    if done.status.is_empty() {
                        break;
                    }
                }
                _ => {}
            }
        }

        tracing::debug!(statement = %name, "statement prepared");
        Ok(Statement {
            name,
            param_formats,
            row_formats,
        })
    }

    /// Execute a prepared statement and discard any rows it returns.
    ///
    /// # Errors
    ///
    /// Returns a server error when the execution failed, or a transport
    /// error.
    pub async fn execute_prepared(
        &mut self,
        stmt: &Statement,
        params: Vec<Value>,
    ) -> Result<ExecResult> {
        self.send_exec(stmt, params).await?;
        let rows = Rows::start(&mut self.channel).await?;
        let result = rows.into_exec_result().await?;
        check_return_status(&result)?;
        Ok(result)
    }

    /// Execute a prepared statement and stream its results.
    ///
    /// # Errors
    ///
    /// Returns a server error when the execution failed, or a transport
    /// error.
    pub async fn query_prepared(
        &mut self,
        stmt: &Statement,
        params: Vec<Value>,
    ) -> Result<Rows<'_, T>> {
        self.send_exec(stmt, params).await?;
        Rows::start(&mut self.channel).await
    }

    /// Prepare, execute and deallocate in a single round trip.
    ///
    /// # Errors
    ///
    /// Returns a server error when the statement failed, or a transport
    /// error.
    pub async fn execute_immediate(&mut self, query: &str) -> Result<ExecResult> {
        let exec = DynamicPackage::new(DynamicOperation::EXEC_IMMED, "", query);
        self.channel.send_package(&Package::Dynamic(exec)).await?;
        self.recv_dynamic_ack().await?;

        let rows = Rows::start(&mut self.channel).await?;
        rows.into_exec_result().await
    }

    /// Deallocate a prepared statement.
    ///
    /// # Errors
    ///
    /// Returns a server error or a transport error.
    pub async fn close_statement(&mut self, stmt: Statement) -> Result<()> {
        let dealloc = DynamicPackage::new(DynamicOperation::DEALLOC, stmt.name.clone(), "");
        self.channel
            .send_package(&Package::Dynamic(dealloc))
            .await?;
        self.recv_dynamic_ack().await?;
        self.channel.drain_to_final_done().await?;

        tracing::debug!(statement = %stmt.name, "statement deallocated");
        Ok(())
    }

    async fn send_exec(&mut self, stmt: &Statement, params: Vec<Value>) -> Result<()> {
        let mut exec = DynamicPackage::new(DynamicOperation::EXEC, stmt.name.clone(), "");

        if params.is_empty() {
            self.channel.send_package(&Package::Dynamic(exec)).await?;
        } else {
            let formats = stmt.param_formats.as_ref().ok_or_else(|| {
                Error::InvalidState(format!(
                    "statement {} takes no parameters",
                    stmt.name
                ))
            })?;

            exec.status = DynamicStatus::HAS_ARGS;
            self.channel.queue_package(&Package::Dynamic(exec)).await?;

            let fmt = ParamFmtPackage {
                fields: Arc::clone(formats),
                wide: false,
            };
            self.channel.queue_package(&Package::ParamFmt(fmt)).await?;

            let data = DataPackage::from_values(Arc::clone(formats), params)?;
            self.channel.queue_package(&Package::Params(data)).await?;
            self.channel.flush().await?;
        }

        self.recv_dynamic_ack().await
    }

    /// Read up to the server's acknowledgement of a dynamic operation.
    async fn recv_dynamic_ack(&mut self) -> Result<()> {
        let mut eeds: Vec<EedPackage> = Vec::new();
        loop {
            match self.channel.next_package().await? {
                Package::Dynamic(pkg) => {
                    if !pkg.operation.contains(DynamicOperation::ACK) {
                        return Err(Error::UnexpectedPackage("dynamic package without ack"));
                    }
                    return Ok(());
                }
                Package::Eed(eed) => eeds.push(eed),
                Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
                    eeds.extend(self.channel.take_eeds());
                    if done.status.contains(DoneStatus::ERROR) {
                        return Err(self.fail_response(eeds).await);
                    }
                    if done.status.is_empty() {
                        if eeds.is_empty() {
                            return Err(Error::UnexpectedPackage(
                                "response ended without a dynamic ack",
                            ));
                        }
                        return Err(Error::from_eeds(eeds));
                    }
                }
                _ => {}
            }
        }
    }
}
