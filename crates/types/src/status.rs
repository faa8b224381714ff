use std::fmt;

use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};

/// Error returned when a status column holds a code no status enum maps to.
#[derive(Debug, thiserror::Error)]
#[error("unrecognized status code {0}")]
pub struct InvalidStatusCode(pub i32);

/// Invoice lifecycle status.
///
/// Codes follow a single status family, no parallel numbering.
/// `UploadingToIpfs` is the claim-intermediate status so a crash between
/// claim and pin cannot strand an invoice as `IpfsStored` without a CID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum InvoiceStatus {
    Uploaded = 1,
    IpfsStored = 2,
    Batched = 3,
    UploadingToIpfs = 4,
    BlockchainPending = 5,
    BlockchainConfirmed = 6,
    Finalized = 8,
    IpfsFailed = 101,
    BlockchainFailed = 102,
}

impl InvoiceStatus {
    /// Position along the forward spine (`Uploaded → … → Finalized`), used to
    /// check monotonicity (P1). Terminal failure statuses have no rank: they
    /// are branches off the spine, not points on it.
    pub fn spine_rank(self) -> Option<u8> {
        match self {
            InvoiceStatus::Uploaded => Some(0),
            InvoiceStatus::UploadingToIpfs => Some(1),
            InvoiceStatus::IpfsStored => Some(2),
            InvoiceStatus::Batched => Some(3),
            InvoiceStatus::BlockchainPending => Some(4),
            InvoiceStatus::BlockchainConfirmed => Some(5),
            InvoiceStatus::Finalized => Some(6),
            InvoiceStatus::IpfsFailed | InvoiceStatus::BlockchainFailed => None,
        }
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            InvoiceStatus::IpfsFailed | InvoiceStatus::BlockchainFailed
        )
    }

    /// True if `self` may legally be followed by `next` in a single
    /// transition (either one step forward on the spine, or a branch from a
    /// spine status into its corresponding failure status).
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        if next.is_terminal_failure() {
            return !self.is_terminal_failure();
        }
        match (self.spine_rank(), next.spine_rank()) {
            (Some(a), Some(b)) => b == a + 1,
            _ => false,
        }
    }
}

impl TryFrom<i32> for InvoiceStatus {
    type Error = InvalidStatusCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => InvoiceStatus::Uploaded,
            2 => InvoiceStatus::IpfsStored,
            3 => InvoiceStatus::Batched,
            4 => InvoiceStatus::UploadingToIpfs,
            5 => InvoiceStatus::BlockchainPending,
            6 => InvoiceStatus::BlockchainConfirmed,
            8 => InvoiceStatus::Finalized,
            101 => InvoiceStatus::IpfsFailed,
            102 => InvoiceStatus::BlockchainFailed,
            other => return Err(InvalidStatusCode(other)),
        })
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InvoiceStatus::Uploaded => "Uploaded",
            InvoiceStatus::IpfsStored => "IpfsStored",
            InvoiceStatus::Batched => "Batched",
            InvoiceStatus::UploadingToIpfs => "UploadingToIpfs",
            InvoiceStatus::BlockchainPending => "BlockchainPending",
            InvoiceStatus::BlockchainConfirmed => "BlockchainConfirmed",
            InvoiceStatus::Finalized => "Finalized",
            InvoiceStatus::IpfsFailed => "IpfsFailed",
            InvoiceStatus::BlockchainFailed => "BlockchainFailed",
        };
        f.write_str(label)
    }
}

/// Batch lifecycle status. `Processing` covers the "Initial/Processing"
/// label — one name, not two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BatchStatus {
    Processing = 1,
    ReadyToSend = 2,
    BlockchainPending = 3,
    BlockchainConfirmed = 4,
    BlockchainFailed = 5,
}

impl TryFrom<i32> for BatchStatus {
    type Error = InvalidStatusCode;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => BatchStatus::Processing,
            2 => BatchStatus::ReadyToSend,
            3 => BatchStatus::BlockchainPending,
            4 => BatchStatus::BlockchainConfirmed,
            5 => BatchStatus::BlockchainFailed,
            other => return Err(InvalidStatusCode(other)),
        })
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BatchStatus::Processing => "Processing",
            BatchStatus::ReadyToSend => "ReadyToSend",
            BatchStatus::BlockchainPending => "BlockchainPending",
            BatchStatus::BlockchainConfirmed => "BlockchainConfirmed",
            BatchStatus::BlockchainFailed => "BlockchainFailed",
        };
        f.write_str(label)
    }
}

// Both enums are persisted as a plain `INTEGER` column; we hand-roll the
// sqlx impls against `i32` rather than relying on a Postgres native enum
// type, so a migration never needs an `ALTER TYPE ... ADD VALUE`.
macro_rules! impl_pg_int_status {
    ($ty:ty) => {
        impl Type<Postgres> for $ty {
            fn type_info() -> PgTypeInfo {
                <i32 as Type<Postgres>>::type_info()
            }

            fn compatible(ty: &PgTypeInfo) -> bool {
                <i32 as Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $ty {
            fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
                let code = <i32 as Decode<Postgres>>::decode(value)?;
                Ok(<$ty>::try_from(code)?)
            }
        }

        impl<'q> Encode<'q, Postgres> for $ty {
            fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
                <i32 as Encode<Postgres>>::encode_by_ref(&(*self as i32), buf)
            }
        }
    };
}

impl_pg_int_status!(InvoiceStatus);
impl_pg_int_status!(BatchStatus);
