//! Claims carried by the bearer tokens that identify an account.

use crate::Id;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AccountClaims {
    /// The account the token was issued for
    pub(crate) id: Id,
    pub(crate) exp: usize,
}
