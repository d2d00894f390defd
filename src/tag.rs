// Copyright 2019 Petar Dambovaliev. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Tag data model (§3): the unit `read_area`/`write_area` operate on.

use crate::address::Address;
use crate::types::{S7Type, Value};

/// A named operand with its address, declared datatype, wire size and the
/// value carried after a read (or supplied before a write).
///
/// `error` carries a per-item return-code failure (§7): a batch read/write
/// that partially fails does not abort, it reports the failure on the
/// individual [`Tag`] instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub address: Address,
    pub datatype: S7Type,
    pub value: Option<Value>,
    pub size: usize,
    pub error: Option<String>,
}

impl Tag {
    /// Builds a tag from an address string, per [`crate::address::parse`].
    pub fn new(name: impl Into<String>, addr: &str, datatype: S7Type) -> Result<Tag, crate::error::Error> {
        let address = crate::address::parse(addr)?;
        let size = datatype.wire_size(None);
        Ok(Tag {
            name: name.into(),
            address,
            datatype,
            value: None,
            size,
            error: None,
        })
    }

    /// Attaches a value to write, refreshing `size` to the value's actual
    /// wire size (relevant for STRING).
    pub fn with_value(mut self, value: Value) -> Tag {
        self.size = self.datatype.wire_size(Some(&value));
        self.value = Some(value);
        self
    }

    pub(crate) fn set_error(&mut self, text: String) {
        self.error = Some(text);
        self.value = None;
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_computes_default_size() {
        let t = Tag::new("motor_running", "I0.0", S7Type::Bit).unwrap();
        assert_eq!(t.size, 1);
        assert!(t.is_ok());
    }

    #[test]
    fn with_value_refreshes_string_size() {
        let t = Tag::new("name", "DB1.DBX0.0", S7Type::Str { max_len: 254 })
            .unwrap()
            .with_value(Value::Str("hi".to_string()));
        assert_eq!(t.size, 4);
    }

    #[test]
    fn set_error_clears_value() {
        let mut t = Tag::new("x", "M0.0", S7Type::Bit)
            .unwrap()
            .with_value(Value::Bit(true));
        t.set_error("invalid address".to_string());
        assert!(t.value.is_none());
        assert!(!t.is_ok());
    }
}
