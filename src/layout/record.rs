//! Fixed-size record codec.
//!
//! A record is one stored tuple: an `i32` id and three fixed-width string
//! fields, each NUL-terminated inside its field. Records never change size,
//! which is what lets a bucket block hold a plain array of them.

use crate::error::{Error, Result};
use crate::layout::{CITY_LEN, NAME_LEN, RECORD_SIZE, SURNAME_LEN};
use bytes::{Buf, BufMut};
use std::fmt;

/// One stored tuple. Duplicate ids are permitted; the index never enforces
/// uniqueness.
#[derive(Clone, PartialEq, Eq)]
pub struct Record {
    /// The hash key.
    pub id: i32,
    name: [u8; NAME_LEN],
    surname: [u8; SURNAME_LEN],
    city: [u8; CITY_LEN],
}

impl Record {
    /// Creates a record, validating that every string fits its field with
    /// room for the NUL terminator and is valid UTF-8 by construction.
    pub fn new(id: i32, name: &str, surname: &str, city: &str) -> Result<Self> {
        Ok(Self {
            id,
            name: fixed_field(name, "name")?,
            surname: fixed_field(surname, "surname")?,
            city: fixed_field(city, "city")?,
        })
    }

    /// The record's name field.
    pub fn name(&self) -> &str {
        field_str(&self.name)
    }

    /// The record's surname field.
    pub fn surname(&self) -> &str {
        field_str(&self.surname)
    }

    /// The record's city field.
    pub fn city(&self) -> &str {
        field_str(&self.city)
    }

    /// Appends the encoded record to `buf`.
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.id);
        buf.put_slice(&self.name);
        buf.put_slice(&self.surname);
        buf.put_slice(&self.city);
    }

    /// Decodes one record from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_SIZE {
            return Err(Error::corruption(format!(
                "record truncated: {} bytes, need {}",
                data.len(),
                RECORD_SIZE
            )));
        }

        let mut buf = data;
        let id = buf.get_i32_le();

        let mut name = [0u8; NAME_LEN];
        buf.copy_to_slice(&mut name);
        let mut surname = [0u8; SURNAME_LEN];
        buf.copy_to_slice(&mut surname);
        let mut city = [0u8; CITY_LEN];
        buf.copy_to_slice(&mut city);

        validate_field(&name, "name")?;
        validate_field(&surname, "surname")?;
        validate_field(&city, "city")?;

        Ok(Self { id, name, surname, city })
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("surname", &self.surname())
            .field("city", &self.city())
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id {}: {} {}, {}",
            self.id,
            self.name(),
            self.surname(),
            self.city()
        )
    }
}

/// Copies `value` into a zero-filled fixed field, rejecting strings that
/// would not leave room for the NUL terminator.
fn fixed_field<const N: usize>(value: &str, what: &str) -> Result<[u8; N]> {
    let bytes = value.as_bytes();
    if bytes.len() >= N {
        return Err(Error::invalid_argument(format!(
            "{} is {} bytes, limit is {}",
            what,
            bytes.len(),
            N - 1
        )));
    }
    let mut field = [0u8; N];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// The string content of a field: everything before the first NUL.
fn field_str(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("")
}

/// Checks the on-disk layout invariants of one string field.
fn validate_field(field: &[u8], what: &str) -> Result<()> {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::corruption(format!("record {} field is not NUL-terminated", what)))?;
    std::str::from_utf8(&field[..end])
        .map_err(|_| Error::corruption(format!("record {} field is not valid UTF-8", what)))?;
    Ok(())
}
