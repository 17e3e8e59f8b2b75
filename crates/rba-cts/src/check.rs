use rba_gl::{enums, Gl};

use crate::CtsError;

/// Polls the error flag right after `call` was issued.
pub fn expect_no_error(gl: &dyn Gl, call: &'static str) -> Result<(), CtsError> {
    expect_code(gl.get_error(), call)
}

/// Like [`expect_no_error`] for an error code that was polled earlier.
pub fn expect_code(code: u32, call: &'static str) -> Result<(), CtsError> {
    match code {
        enums::NO_ERROR => Ok(()),
        code => Err(CtsError::Gl { call, code }),
    }
}

/// Fails with [`CtsError::InvalidId`] when a creation call returned the wrapper's sentinel.
pub(crate) fn expect_valid_id(id: u32, invalid: u32, call: &'static str) -> Result<u32, CtsError> {
    if id == invalid {
        Err(CtsError::InvalidId { call })
    } else {
        Ok(id)
    }
}
