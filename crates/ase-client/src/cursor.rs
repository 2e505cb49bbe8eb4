//! Server-side cursors.
//!
//! A cursor goes through declare, batch size setup and open before the
//! first fetch. The server assigns the numeric id during this exchange
//! and reports state transitions through CURINFO packages. Fetch
//! responses repeat rows without a ROWFMT, so the formats captured at
//! open time are re-injected for every fetch.

use std::sync::Arc;

use tds5_protocol::field::FieldFmt;
use tds5_protocol::packages::{
    CurClosePackage, CurDeclarePackage, CurFetchPackage, CurInfoPackage, CurOpenPackage,
    CursorCloseOption, CursorFetchType, CursorInfoCommand, CursorInfoStatus, CursorStatus,
    DoneStatus, EedPackage, Package,
};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::rows::Row;

/// A declared and opened server-side cursor.
#[derive(Debug)]
pub struct Cursor {
    id: i32,
    name: String,
    formats: Arc<Vec<FieldFmt>>,
    closed: bool,
    deallocated: bool,
}

impl Cursor {
    /// Server-assigned cursor id.
    #[must_use]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Cursor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column formats of the cursor's result.
    #[must_use]
    pub fn formats(&self) -> &Arc<Vec<FieldFmt>> {
        &self.formats
    }

    /// Whether the server closed the cursor, which happens once the last
    /// row was fetched.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Mutable cursor state while a response is walked.
#[derive(Default)]
struct CursorState {
    id: i32,
    name: String,
    formats: Option<Arc<Vec<FieldFmt>>>,
    closed: bool,
    deallocated: bool,
}

impl CursorState {
    fn apply_info(&mut self, info: &CurInfoPackage) {
        if info.cursor_id != 0 {
            self.id = info.cursor_id;
        }
        if !info.name.is_empty() {
            self.name = info.name.clone();
        }
        if info.status.contains(CursorInfoStatus::CLOSED) {
            self.closed = true;
        }
        if info.status.contains(CursorInfoStatus::DEALLOC) {
            self.deallocated = true;
        }
    }
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Declare and open a read only cursor over a select statement.
    ///
    /// The fetch batch size comes from the connection configuration.
    ///
    /// # Errors
    ///
    /// Returns a server error if the statement is rejected, or a
    /// transport error.
    pub async fn declare_cursor(&mut self, name: &str, stmt: &str) -> Result<Cursor> {
        let mut state = CursorState {
            name: name.to_string(),
            ..CursorState::default()
        };

        let declare = CurDeclarePackage::read_only(name, stmt);
        self.cursor_round(Package::CurDeclare(declare), &mut state)
            .await?;

        // The batch size is set against the name; the id is not assigned
        // until the open.
        let mut set_rows = CurInfoPackage::set_rows(0, self.cursor_fetch_rows);
        set_rows.name = state.name.clone();
        self.cursor_round(Package::CurInfo(set_rows), &mut state)
            .await?;

        let open = CurOpenPackage {
            cursor_id: state.id,
            name: state.name.clone(),
            status: CursorStatus::empty(),
        };
        self.cursor_round(Package::CurOpen(open), &mut state).await?;

        if state.id == 0 {
            return Err(Error::Query(format!(
                "server did not assign an id to cursor {name}"
            )));
        }
        let formats = state.formats.ok_or_else(|| {
            Error::Query(format!("server did not report formats for cursor {name}"))
        })?;

        tracing::debug!(cursor = state.id, name = %state.name, "cursor opened");
        Ok(Cursor {
            id: state.id,
            name: state.name,
            formats,
            closed: state.closed,
            deallocated: state.deallocated,
        })
    }

    /// Fetch the next batch of rows.
    ///
    /// An empty batch means the cursor is exhausted. Most servers close
    /// the cursor along with the last batch; once it is closed further
    /// fetches return an empty batch without a round trip.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] on a deallocated cursor, a server
    /// error or a transport error.
    pub async fn fetch_cursor(&mut self, cursor: &mut Cursor) -> Result<Vec<Row>> {
        if cursor.deallocated {
            return Err(Error::InvalidState(format!(
                "cursor {} is deallocated",
                cursor.name
            )));
        }
        if cursor.closed {
            return Ok(Vec::new());
        }

        // Fetch responses carry no ROWFMT of their own.
        self.channel.set_row_formats(Arc::clone(&cursor.formats));

        let fetch = CurFetchPackage {
            cursor_id: cursor.id,
            name: cursor.name.clone(),
            fetch_type: CursorFetchType::Next,
            offset: 0,
        };
        self.channel.send_package(&Package::CurFetch(fetch)).await?;

        let mut rows = Vec::new();
        let mut eeds: Vec<EedPackage> = Vec::new();
        loop {
            match self.channel.next_package().await? {
                Package::Row(row) => {
                    rows.push(Row::new(row.values(), Arc::clone(&cursor.formats)));
                }
                Package::RowFmt(fmt) => cursor.formats = fmt.fields,
                Package::OrderBy(_) => {}
                Package::CurInfo(info) if info.command == CursorInfoCommand::Inform => {
                    if info.status.contains(CursorInfoStatus::CLOSED) {
                        cursor.closed = true;
                    }
                    if info.status.contains(CursorInfoStatus::DEALLOC) {
                        cursor.deallocated = true;
                    }
                }
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

        tracing::trace!(cursor = cursor.id, rows = rows.len(), "fetched batch");
        Ok(rows)
    }

    /// Close and deallocate a cursor.
    ///
    /// A cursor the server already closed is still deallocated; the
    /// server answers the dealloc in a separate response when the close
    /// part was a no-op.
    ///
    /// # Errors
    ///
    /// Returns a server error or a transport error.
    pub async fn close_cursor(&mut self, cursor: Cursor) -> Result<()> {
        if cursor.deallocated {
            return Ok(());
        }

        let mut state = CursorState {
            id: cursor.id,
            name: cursor.name.clone(),
            closed: cursor.closed,
            deallocated: cursor.deallocated,
            ..CursorState::default()
        };

        let close = CurClosePackage {
            cursor_id: cursor.id,
            name: cursor.name.clone(),
            options: CursorCloseOption::DEALLOC,
        };
        self.cursor_round(Package::CurClose(close), &mut state)
            .await?;

        // Some servers answer close and dealloc separately.
        if !state.deallocated {
            self.drain_cursor_response(&mut state).await?;
        }

        if !state.deallocated {
            return Err(Error::Query(format!(
                "server did not deallocate cursor {}",
                cursor.name
            )));
        }
        tracing::debug!(cursor = cursor.id, "cursor closed");
        Ok(())
    }

    /// Send a cursor request and walk its response to the final
    /// completion, folding state notifications into `state`.
    async fn cursor_round(&mut self, request: Package, state: &mut CursorState) -> Result<()> {
        self.channel.send_package(&request).await?;
        self.drain_cursor_response(state).await
    }

    async fn drain_cursor_response(&mut self, state: &mut CursorState) -> Result<()> {
        let mut eeds: Vec<EedPackage> = Vec::new();
        loop {
            match self.channel.next_package().await? {
                Package::CurInfo(info) if info.command == CursorInfoCommand::Inform => {
                    state.apply_info(&info);
                }
                Package::RowFmt(fmt) => state.formats = Some(fmt.fields),
                Package::ParamFmt(_) | Package::OrderBy(_) => {}
                Package::Eed(eed) => eeds.push(eed),
                Package::Done(done) | Package::DoneProc(done) | Package::DoneInProc(done) => {
                    if done.status.contains(DoneStatus::ERROR) {
                        eeds.extend(self.channel.take_eeds());
                        return Err(self.fail_response(eeds).await);
                    }
                    if done.status.is_empty() {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }
}
