//! Security identification aggregates.

use serde::Serialize;

use crate::error::Result;
use crate::meta::{impl_aggregate, RegistryBuilder};

/// Security identifier (`SECID`): a CUSIP, ISIN, or similar together with
/// its namespace.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SecurityId {
    pub unique_id: Option<String>,
    pub unique_id_type: Option<String>,
}

impl_aggregate!(SecurityId);

pub(crate) fn register(builder: &mut RegistryBuilder) -> Result<()> {
    builder
        .aggregate::<SecurityId>("SECID")?
        .string(
            "UNIQUEID",
            10,
            true,
            |s| s.unique_id.clone(),
            |s, v| s.unique_id = Some(v),
        )
        .string(
            "UNIQUEIDTYPE",
            20,
            true,
            |s| s.unique_id_type.clone(),
            |s, v| s.unique_id_type = Some(v),
        );
    Ok(())
}
