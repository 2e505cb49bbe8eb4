//! Cursor packages: declare, open, fetch, info and close.
//!
//! Before a cursor is opened the server has not assigned an id yet, so
//! the declare carries only the name; every later package carries the id
//! and repeats the name for diagnostics.

use bitflags::bitflags;
use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::wire::{self, Reader};

bitflags! {
    /// Options of a cursor declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CursorOption: u8 {
        /// The cursor is read only.
        const READ_ONLY = 0x1;
        /// The cursor allows updates.
        const UPDATABLE = 0x2;
        /// The cursor is sensitive to concurrent changes.
        const SENSITIVE = 0x4;
        /// The cursor is scrollable.
        const SCROLLABLE = 0x8;
    }
}

bitflags! {
    /// Status bits of cursor commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CursorStatus: u8 {
        /// A PARAMFMT/PARAMS pair follows.
        const HAS_ARGS = 0x1;
    }
}

/// CURDECLARE, declaring a named cursor over a statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurDeclarePackage {
    /// Cursor name.
    pub name: String,
    /// Declaration options.
    pub options: CursorOption,
    /// Command status.
    pub status: CursorStatus,
    /// The statement the cursor iterates.
    pub stmt: String,
    /// Columns listed in a `for update of` clause.
    pub update_columns: Vec<String>,
}

impl CurDeclarePackage {
    /// Declare a read only cursor.
    #[must_use]
    pub fn read_only(name: impl Into<String>, stmt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: CursorOption::READ_ONLY,
            status: CursorStatus::empty(),
            stmt: stmt.into(),
            update_columns: Vec::new(),
        }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let name = reader.u8_string("cursor name")?;
        let options = CursorOption::from_bits_truncate(reader.u8()?);
        let status = CursorStatus::from_bits_truncate(reader.u8()?);
        let stmt = reader.u16_string("cursor statement")?;

        let column_count = reader.u8()? as usize;
        let mut update_columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            update_columns.push(reader.u8_string("cursor update column")?);
        }

        let consumed = reader.position() - start;
        if consumed != length {
            return Err(ProtocolError::LengthMismatch {
                context: "cursor declare package",
                declared: length,
                consumed,
            });
        }

        Ok(Self {
            name,
            options,
            status,
            stmt,
            update_columns,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for over-long names.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let columns_len: usize = self.update_columns.iter().map(|c| 1 + c.len()).sum();
        let length = 1 + self.name.len() + 2 + 2 + self.stmt.len() + 1 + columns_len;
        buf.put_u16_le(length as u16);

        wire::put_u8_string(buf, &self.name, "cursor name")?;
        buf.put_u8(self.options.bits());
        buf.put_u8(self.status.bits());
        wire::put_u16_string(buf, &self.stmt, "cursor statement")?;
        buf.put_u8(self.update_columns.len() as u8);
        for column in &self.update_columns {
            wire::put_u8_string(buf, column, "cursor update column")?;
        }
        Ok(())
    }
}

/// CUROPEN, opening a declared cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurOpenPackage {
    /// Server-assigned cursor id; zero before the first open.
    pub cursor_id: i32,
    /// Cursor name, used when the id is still zero.
    pub name: String,
    /// Command status.
    pub status: CursorStatus,
}

impl CurOpenPackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let pkg = Self {
            cursor_id: reader.i32_le()?,
            name: reader.u8_string("cursor name")?,
            status: CursorStatus::from_bits_truncate(reader.u8()?),
        };

        check_length(reader, start, length, "cursor open package")?;
        Ok(pkg)
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for an over-long name.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u16_le((4 + 1 + self.name.len() + 1) as u16);
        buf.put_i32_le(self.cursor_id);
        wire::put_u8_string(buf, &self.name, "cursor name")?;
        buf.put_u8(self.status.bits());
        Ok(())
    }
}

/// Fetch direction of a CURFETCH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CursorFetchType {
    /// The next row.
    #[default]
    Next = 1,
    /// The previous row.
    Prev = 2,
    /// The first row.
    First = 3,
    /// The last row.
    Last = 4,
    /// An absolute position.
    Absolute = 5,
    /// A position relative to the current row.
    Relative = 6,
}

impl TryFrom<u8> for CursorFetchType {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Self::Next),
            2 => Ok(Self::Prev),
            3 => Ok(Self::First),
            4 => Ok(Self::Last),
            5 => Ok(Self::Absolute),
            6 => Ok(Self::Relative),
            other => Err(ProtocolError::InvalidLogin(format!(
                "unknown cursor fetch type {other}"
            ))),
        }
    }
}

/// CURFETCH, fetching rows from an open cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurFetchPackage {
    /// Cursor id.
    pub cursor_id: i32,
    /// Cursor name.
    pub name: String,
    /// Fetch direction.
    pub fetch_type: CursorFetchType,
    /// Offset for absolute and relative fetches.
    pub offset: i32,
}

impl CurFetchPackage {
    fn has_offset(fetch_type: CursorFetchType) -> bool {
        matches!(
            fetch_type,
            CursorFetchType::Absolute | CursorFetchType::Relative
        )
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let cursor_id = reader.i32_le()?;
        let name = reader.u8_string("cursor name")?;
        let fetch_type = CursorFetchType::try_from(reader.u8()?)?;
        let offset = if Self::has_offset(fetch_type) {
            reader.i32_le()?
        } else {
            0
        };

        check_length(reader, start, length, "cursor fetch package")?;
        Ok(Self {
            cursor_id,
            name,
            fetch_type,
            offset,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for an over-long name.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut length = 4 + 1 + self.name.len() + 1;
        if Self::has_offset(self.fetch_type) {
            length += 4;
        }
        buf.put_u16_le(length as u16);

        buf.put_i32_le(self.cursor_id);
        wire::put_u8_string(buf, &self.name, "cursor name")?;
        buf.put_u8(self.fetch_type as u8);
        if Self::has_offset(self.fetch_type) {
            buf.put_i32_le(self.offset);
        }
        Ok(())
    }
}

bitflags! {
    /// Options of a CURCLOSE.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CursorCloseOption: u8 {
        /// Deallocate the cursor along with closing it.
        const DEALLOC = 0x1;
    }
}

/// CURCLOSE, closing and optionally deallocating a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurClosePackage {
    /// Cursor id.
    pub cursor_id: i32,
    /// Cursor name.
    pub name: String,
    /// Close options.
    pub options: CursorCloseOption,
}

impl CurClosePackage {
    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let pkg = Self {
            cursor_id: reader.i32_le()?,
            name: reader.u8_string("cursor name")?,
            options: CursorCloseOption::from_bits_truncate(reader.u8()?),
        };

        check_length(reader, start, length, "cursor close package")?;
        Ok(pkg)
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for an over-long name.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        buf.put_u16_le((4 + 1 + self.name.len() + 1) as u16);
        buf.put_i32_le(self.cursor_id);
        wire::put_u8_string(buf, &self.name, "cursor name")?;
        buf.put_u8(self.options.bits());
        Ok(())
    }
}

/// Command of a CURINFO package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CursorInfoCommand {
    /// Set the fetch batch size.
    #[default]
    SetRows = 1,
    /// Ask for the state of a cursor.
    Inquire = 2,
    /// Server notification of cursor state.
    Inform = 3,
    /// List all cursors of the connection.
    ListAll = 4,
}

impl TryFrom<u8> for CursorInfoCommand {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            1 => Ok(Self::SetRows),
            2 => Ok(Self::Inquire),
            3 => Ok(Self::Inform),
            4 => Ok(Self::ListAll),
            other => Err(ProtocolError::InvalidLogin(format!(
                "unknown cursor info command {other}"
            ))),
        }
    }
}

bitflags! {
    /// Cursor state bits carried by CURINFO.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CursorInfoStatus: u32 {
        /// The cursor is declared.
        const DECLARED = 0x1;
        /// The cursor is open.
        const OPEN = 0x2;
        /// The cursor is closed.
        const CLOSED = 0x4;
        /// The cursor is read only.
        const READ_ONLY = 0x8;
        /// The cursor allows updates.
        const UPDATABLE = 0x10;
        /// The row count field is valid.
        const ROW_COUNT = 0x20;
        /// The cursor has been deallocated.
        const DEALLOC = 0x40;
    }
}

/// CURINFO, cursor state and the fetch batch size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CurInfoPackage {
    /// Cursor id.
    pub cursor_id: i32,
    /// Cursor name.
    pub name: String,
    /// What this package does.
    pub command: CursorInfoCommand,
    /// State bits.
    pub status: CursorInfoStatus,
    /// Rows per fetch, valid with [`CursorInfoStatus::ROW_COUNT`].
    pub row_count: i32,
}

impl CurInfoPackage {
    /// Ask the server to return `rows` rows per fetch.
    #[must_use]
    pub fn set_rows(cursor_id: i32, rows: i32) -> Self {
        Self {
            cursor_id,
            name: String::new(),
            command: CursorInfoCommand::SetRows,
            status: CursorInfoStatus::ROW_COUNT,
            row_count: rows,
        }
    }

    /// Read the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or a length mismatch.
    pub fn read_from(reader: &mut Reader<'_>) -> Result<Self, ProtocolError> {
        let length = reader.u16_le()? as usize;
        let start = reader.position();

        let cursor_id = reader.i32_le()?;
        let name = reader.u8_string("cursor name")?;
        let command = CursorInfoCommand::try_from(reader.u8()?)?;
        let status = CursorInfoStatus::from_bits_truncate(reader.u32_le()?);
        let row_count = if status.contains(CursorInfoStatus::ROW_COUNT) {
            reader.i32_le()?
        } else {
            0
        };

        check_length(reader, start, length, "cursor info package")?;
        Ok(Self {
            cursor_id,
            name,
            command,
            status,
            row_count,
        })
    }

    /// Write the body following the token byte.
    ///
    /// # Errors
    ///
    /// Returns an error for an over-long name.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        let mut length = 4 + 1 + self.name.len() + 1 + 4;
        if self.status.contains(CursorInfoStatus::ROW_COUNT) {
            length += 4;
        }
        buf.put_u16_le(length as u16);

        buf.put_i32_le(self.cursor_id);
        wire::put_u8_string(buf, &self.name, "cursor name")?;
        buf.put_u8(self.command as u8);
        buf.put_u32_le(self.status.bits());
        if self.status.contains(CursorInfoStatus::ROW_COUNT) {
            buf.put_i32_le(self.row_count);
        }
        Ok(())
    }
}

fn check_length(
    reader: &Reader<'_>,
    start: usize,
    declared: usize,
    context: &'static str,
) -> Result<(), ProtocolError> {
    let consumed = reader.position() - start;
    if consumed != declared {
        return Err(ProtocolError::LengthMismatch {
            context,
            declared,
            consumed,
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_round_trip() {
        let mut pkg = CurDeclarePackage::read_only("c1", "select au_id from authors");
        pkg.update_columns = vec!["au_lname".into()];
        pkg.options = CursorOption::UPDATABLE;

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(CurDeclarePackage::read_from(&mut reader).unwrap(), pkg);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_open_round_trip() {
        let pkg = CurOpenPackage {
            cursor_id: 0,
            name: "c1".into(),
            status: CursorStatus::empty(),
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(CurOpenPackage::read_from(&mut reader).unwrap(), pkg);
    }

    #[test]
    fn test_fetch_offset_only_for_positioned() {
        let next = CurFetchPackage {
            cursor_id: 3,
            name: "c1".into(),
            fetch_type: CursorFetchType::Next,
            offset: 0,
        };
        let abs = CurFetchPackage {
            fetch_type: CursorFetchType::Absolute,
            offset: 10,
            ..next.clone()
        };

        let mut buf_next = BytesMut::new();
        next.write_to(&mut buf_next).unwrap();
        let mut buf_abs = BytesMut::new();
        abs.write_to(&mut buf_abs).unwrap();
        assert_eq!(buf_abs.len(), buf_next.len() + 4);

        let mut reader = Reader::new(&buf_abs);
        assert_eq!(CurFetchPackage::read_from(&mut reader).unwrap(), abs);
    }

    #[test]
    fn test_close_with_dealloc() {
        let pkg = CurClosePackage {
            cursor_id: 3,
            name: "c1".into(),
            options: CursorCloseOption::DEALLOC,
        };

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        assert_eq!(CurClosePackage::read_from(&mut reader).unwrap(), pkg);
    }

    #[test]
    fn test_info_set_rows() {
        let pkg = CurInfoPackage::set_rows(3, 100);

        let mut buf = BytesMut::new();
        pkg.write_to(&mut buf).unwrap();

        let mut reader = Reader::new(&buf);
        let back = CurInfoPackage::read_from(&mut reader).unwrap();
        assert_eq!(back.row_count, 100);
        assert_eq!(back.command, CursorInfoCommand::SetRows);
    }
}
