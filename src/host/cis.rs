//! Card information structure tuple walker.
//!
//! The CIS is a linked list of tuples `{code, link, body[link]}` terminated
//! by a 0xff code byte. The walker operates over the window cached during
//! initialization and yields each tuple as a slice of that window, so no
//! copies are made.

use crate::{DataError, SdioError};

/// Tuple code terminating the chain.
pub const TUPLE_END: u8 = 0xff;
/// Function extension tuple carrying, among other things, the maximum block
/// size of a function.
pub const TUPLE_FUNCE: u8 = 0x22;
/// Run-on guard: a tuple longer than this means the CIS is corrupt.
pub const TUPLE_MAX_LEN: usize = 100;

/// Iterator over the tuples of a CIS window.
///
/// Yields `code + link + body` slices. Iteration stops at the END tuple, at
/// the end of the window (an incomplete trailing tuple is dropped), or after
/// the first structural error.
#[derive(Debug, Clone)]
pub struct CisTuples<'a> {
    data: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> CisTuples<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        CisTuples {
            data,
            pos: 0,
            done: false,
        }
    }
}

impl<'a> Iterator for CisTuples<'a> {
    type Item = Result<&'a [u8], SdioError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let code = *self.data.get(self.pos)?;
        if code == TUPLE_END {
            self.done = true;
            return None;
        }
        let Some(&link) = self.data.get(self.pos + 1) else {
            self.done = true;
            return None;
        };
        if link == 0 {
            self.done = true;
            return Some(Err(DataError::TupleLinkZero.into()));
        }
        let total = 2 + link as usize;
        if total > TUPLE_MAX_LEN {
            self.done = true;
            return Some(Err(DataError::TupleTooLong { len: total }.into()));
        }
        let end = self.pos + total;
        if end > self.data.len() {
            self.done = true;
            return None;
        }
        let tuple = &self.data[self.pos..end];
        self.pos = end;
        Some(Ok(tuple))
    }
}
