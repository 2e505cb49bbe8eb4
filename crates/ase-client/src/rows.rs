//! Result streaming.
//!
//! A response to a command is a stream of packages: row formats, rows,
//! completions, possibly repeated for multiple result sets. [`Rows`]
//! walks that stream lazily; dropping it without draining leaves the
//! channel mid-response, so [`Rows::close`] or full consumption must
//! happen before the next command.

use std::sync::Arc;

use ase_types::Value;
use tds5_protocol::field::FieldFmt;
use tds5_protocol::packages::{DoneStatus, EedPackage, Package, TranState};

use ase_codec::Channel;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};

/// Summary of a command that returned no rows, or of a fully drained
/// result stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows affected, summed over all completions that carried a count.
    pub rows_affected: i64,
    /// Return status of a procedure, if one was reported.
    pub return_status: Option<i32>,
}

/// One row of a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    formats: Arc<Vec<FieldFmt>>,
}

impl Row {
    pub(crate) fn new(values: Vec<Value>, formats: Arc<Vec<FieldFmt>>) -> Self {
        Self { values, formats }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of a named column.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        let index = self.formats.iter().position(|f| f.name == name)?;
        self.values.get(index)
    }

    /// All values in column order.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Column formats of the result set this row belongs to.
    #[must_use]
    pub fn formats(&self) -> &Arc<Vec<FieldFmt>> {
        &self.formats
    }
}

/// A streaming result, possibly spanning multiple result sets.
pub struct Rows<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    channel: &'a mut Channel<T>,
    formats: Arc<Vec<FieldFmt>>,
    /// Formats of the next result set, seen before the current one was
    /// fully consumed.
    pending_formats: Option<Arc<Vec<FieldFmt>>>,
    finished: bool,
    rows_affected: i64,
    return_status: Option<i32>,
    tran_state: TranState,
    eeds: Vec<EedPackage>,
}

impl<T> std::fmt::Debug for Rows<'_, T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("formats", &self.formats)
            .field("finished", &self.finished)
            .field("rows_affected", &self.rows_affected)
            .field("return_status", &self.return_status)
            .finish_non_exhaustive()
    }
}

impl<'a, T> Rows<'a, T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Read the response stream up to the first result set. Commands
    /// without rows run to their final completion here.
    pub(crate) async fn start(channel: &'a mut Channel<T>) -> Result<Rows<'a, T>> {
        let mut rows = Self {
            channel,
            formats: Arc::new(Vec::new()),
            pending_formats: None,
            finished: false,
            rows_affected: 0,
            return_status: None,
            tran_state: TranState::NotInTran,
            eeds: Vec::new(),
        };

        loop {
            match rows.channel.next_package().await? {
                Package::RowFmt(fmt) => {
                    rows.formats = fmt.fields;
                    break;
                }
                Package::ReturnStatus(rs) => rows.return_status = Some(rs.status),
                Package::Eed(eed) => rows.eeds.push(eed),
                pkg if pkg.is_done() => match rows.handle_done(&pkg) {
                    Ok(_) => {
                        if rows.finished {
                            break;
                        }
                    }
                    Err(err) => return Err(rows.abandon(err).await),
                },
                // Formats and parameters of the request echoing back, or
                // informational packages; none of them carry results.
                _ => {}
            }
        }
        Ok(rows)
    }

    /// Column formats of the current result set.
    #[must_use]
    pub fn formats(&self) -> &Arc<Vec<FieldFmt>> {
        &self.formats
    }

    /// Transaction state of the last completion seen.
    #[must_use]
    pub fn tran_state(&self) -> TranState {
        self.tran_state
    }

    /// The next row of the current result set, or `None` when the set or
    /// the whole response ended.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished || self.pending_formats.is_some() {
            return Ok(None);
        }

        loop {
            match self.channel.next_package().await? {
                Package::Row(row) => {
                    return Ok(Some(Row::new(row.values(), Arc::clone(&self.formats))));
                }
                Package::RowFmt(fmt) => {
                    self.pending_formats = Some(fmt.fields);
                    return Ok(None);
                }
                Package::OrderBy(_) => {}
                Package::ReturnStatus(rs) => self.return_status = Some(rs.status),
                Package::Eed(eed) => self.eeds.push(eed),
                pkg if pkg.is_done() => match self.handle_done(&pkg) {
                    Ok(true) => return Ok(None),
                    Ok(false) => {}
                    Err(err) => return Err(self.abandon(err).await),
                },
                _ => {}
            }
        }
    }

    /// Advance to the next result set.
    ///
    /// Rows of the current set that were not read are discarded.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn next_resultset(&mut self) -> Result<bool> {
        if let Some(formats) = self.pending_formats.take() {
            self.formats = formats;
            return Ok(true);
        }
        if self.finished {
            return Ok(false);
        }

        loop {
            match self.channel.next_package().await? {
                Package::Row(_) | Package::OrderBy(_) => {}
                Package::RowFmt(fmt) => {
                    self.formats = fmt.fields;
                    return Ok(true);
                }
                Package::ReturnStatus(rs) => self.return_status = Some(rs.status),
                Package::Eed(eed) => self.eeds.push(eed),
                pkg if pkg.is_done() => match self.handle_done(&pkg) {
                    Ok(true) => return Ok(false),
                    Ok(false) => {}
                    Err(err) => return Err(self.abandon(err).await),
                },
                _ => {}
            }
        }
    }

    /// Drain everything that is left and summarize the response.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn into_exec_result(mut self) -> Result<ExecResult> {
        self.drain().await?;
        Ok(ExecResult {
            rows_affected: self.rows_affected,
            return_status: self.return_status,
        })
    }

    /// Drain everything that is left.
    ///
    /// # Errors
    ///
    /// Returns a server error when the command failed, or a transport
    /// error.
    pub async fn close(mut self) -> Result<()> {
        self.drain().await
    }

    async fn drain(&mut self) -> Result<()> {
        loop {
            while self.next_row().await?.is_some() {}
            if !self.next_resultset().await? {
                return Ok(());
            }
        }
    }

    /// Skip the rest of a failed response so the channel sits at a
    /// message boundary again, then hand the error back.
    async fn abandon(&mut self, err: Error) -> Error {
        self.finished = true;
        if let Err(drain_err) = self.channel.drain_to_final_done().await {
            tracing::debug!("draining a failed response: {drain_err}");
        }
        err
    }

    /// Apply a completion package. Returns `true` when the current result
    /// set (or the whole response) ended.
    fn handle_done(&mut self, pkg: &Package) -> Result<bool> {
        let done = match pkg {
            Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => done,
            _ => return Ok(false),
        };
        self.tran_state = done.tran_state;

        if done.status.contains(DoneStatus::ERROR) {
            self.finished = true;
            let mut eeds = std::mem::take(&mut self.eeds);
            eeds.extend(self.channel.take_eeds());
            return Err(Error::from_eeds(eeds));
        }

        if done.status.contains(DoneStatus::COUNT) {
            self.rows_affected += i64::from(done.count);
        }

        if done.status.is_empty() {
            self.finished = true;
            return Ok(true);
        }
        if done.status == DoneStatus::COUNT {
            // A bare count completes the statement; the final completion
            // still follows.
            return Ok(false);
        }
        if done.status.contains(DoneStatus::MORE) {
            return Ok(true);
        }
        Ok(false)
    }
}

/// A nonzero procedure return status means the command failed even if
/// no completion carried the error bit.
pub(crate) fn check_return_status(result: &ExecResult) -> Result<()> {
    match result.return_status {
        Some(status) if status != 0 => Err(Error::Query(format!(
            "command failed with return status {status}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ase_types::DataType;
    use tds5_protocol::packages::DonePackage;

    fn formats() -> Arc<Vec<FieldFmt>> {
        let mut id = FieldFmt::named(DataType::IntN, "id");
        id.max_length = 4;
        let mut name = FieldFmt::named(DataType::VarChar, "name");
        name.max_length = 32;
        Arc::new(vec![id, name])
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::new(
            vec![Value::Int(7), Value::Chars("pubs2".into())],
            formats(),
        );
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(7)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Chars("pubs2".into())));
        assert_eq!(row.get_by_name("missing"), None);
        assert_eq!(
            row.into_values(),
            vec![Value::Int(7), Value::Chars("pubs2".into())]
        );
    }

    #[test]
    fn test_return_status_check() {
        let ok = ExecResult {
            rows_affected: 1,
            return_status: Some(0),
        };
        check_return_status(&ok).unwrap();

        let failed = ExecResult {
            rows_affected: 0,
            return_status: Some(-6),
        };
        assert!(check_return_status(&failed).is_err());
    }

    #[test]
    fn test_done_semantics() {
        // Verified through the connection tests; here only the pure
        // status classification.
        let final_done = DonePackage::final_done();
        assert!(final_done.status.is_empty());

        let counted = DonePackage {
            status: DoneStatus::COUNT,
            tran_state: TranState::NotInTran,
            count: 3,
        };
        assert!(!counted.more_follows());
    }
}
